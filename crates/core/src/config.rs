use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{OutputFormat, TableKind};
use crate::upload::UploadRules;

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_DATA_DIR: &str = "KPTDASH_DATA_DIR";
pub const ENV_SERVER_URL: &str = "KPTDASH_SERVER_URL";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub polling: PollingConfig,
    pub upload: UploadRules,
    pub processing: ProcessingDefaults,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    pub statistics_interval_secs: u64,
    pub table_interval_secs: u64,
}

/// Default values for the upload form; CLI flags override them per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessingDefaults {
    pub format: OutputFormat,
    pub force_add: bool,
    pub merge_objects: bool,
    pub skip_empty_geom: bool,
    pub remove_empty_attrs: bool,
    pub convert_additional_data: bool,
    pub save_default_crs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    pub table: TableKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub retention_files: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            polling: PollingConfig::default(),
            upload: UploadRules::default(),
            processing: ProcessingDefaults::default(),
            dashboard: DashboardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            statistics_interval_secs: 8,
            table_interval_secs: 5,
        }
    }
}

impl Default for ProcessingDefaults {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            force_add: false,
            merge_objects: false,
            skip_empty_geom: false,
            remove_empty_attrs: false,
            convert_additional_data: false,
            save_default_crs: true,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            table: TableKind::Tasks,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            retention_files: crate::logging::DEFAULT_LOG_RETENTION_FILES,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl PollingConfig {
    pub fn statistics_interval(&self) -> Duration {
        Duration::from_secs(self.statistics_interval_secs.max(1))
    }

    pub fn table_interval(&self) -> Duration {
        Duration::from_secs(self.table_interval_secs.max(1))
    }
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config TOML: {}", path.display()))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .context("config path does not have a parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;

        let encoded = toml::to_string_pretty(self).context("failed to serialize config TOML")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Server URL with precedence: CLI flag, then `KPTDASH_SERVER_URL`, then
    /// the config file.
    pub fn resolve_server_url(&self, cli_override: Option<&str>) -> String {
        if let Some(url) = cli_override {
            return url.to_string();
        }

        env::var(ENV_SERVER_URL)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.server.base_url.clone())
    }
}

/// Resolve the data directory with 3-tier priority:
/// 1. CLI override if provided
/// 2. KPTDASH_DATA_DIR environment variable
/// 3. Default: ./data
pub fn data_dir(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(env_dir) = env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(env_dir);
    }

    PathBuf::from("data")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Create the data directory and write a default config.toml on first run.
/// An existing config file is never touched.
pub fn initialize_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
    }

    let cfg_path = config_path(data_dir);
    if !cfg_path.exists() {
        AppConfig::default().save_to_path(&cfg_path)?;
    }

    Ok(())
}
