use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::config::{ProcessingDefaults, ServerConfig};
use crate::models::{
    DownloadKind, EntityKind, ErrorBody, Group, MessageResponse, OutputFormat, ProcessingStatus,
    RunResponse, Statistics, Task,
};
use crate::upload::UploadFile;

pub const UNKNOWN_ERROR: &str = "unknown error";

const DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const DOWNLOAD_RETRY_BACKOFF_MS: u64 = 250;
const ZIP_MIME: &str = "application/zip";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build request for {context}: {source}")]
    Build {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {detail}")]
    Rejected {
        endpoint: String,
        status: u16,
        detail: String,
    },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no files selected")]
    NothingToUpload,

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The backend's own explanation, when the request reached it.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { detail, .. } => Some(detail.as_str()),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { source, .. } => is_retryable_reqwest_error(source),
            ClientError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).is_ok_and(is_retryable_status)
            }
            _ => false,
        }
    }
}

/// Form fields of `POST /processing/run` besides the files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessingOptions {
    pub name: Option<String>,
    pub force_add: bool,
    pub format: OutputFormat,
    pub merge_objects: bool,
    pub skip_empty_geom: bool,
    pub remove_empty_attrs: bool,
    pub convert_additional_data: bool,
    pub save_default_crs: bool,
}

impl ProcessingOptions {
    pub fn from_defaults(defaults: &ProcessingDefaults) -> Self {
        Self {
            name: None,
            force_add: defaults.force_add,
            format: defaults.format,
            merge_objects: defaults.merge_objects,
            skip_empty_geom: defaults.skip_empty_geom,
            remove_empty_attrs: defaults.remove_empty_attrs,
            convert_additional_data: defaults.convert_additional_data,
            save_default_crs: defaults.save_default_crs,
        }
    }

    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(8);
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            fields.push(("name", name.to_string()));
        }
        fields.push(("force_add", self.force_add.to_string()));
        fields.push(("format", self.format.wire_value().to_string()));
        fields.push(("merge_objects", self.merge_objects.to_string()));
        fields.push(("skip_empty_geom", self.skip_empty_geom.to_string()));
        fields.push(("remove_empty_attrs", self.remove_empty_attrs.to_string()));
        fields.push((
            "convert_additional_data",
            self.convert_additional_data.to_string(),
        ));
        fields.push(("save_default_crs", self.save_default_crs.to_string()));
        fields
    }
}

/// Client for the processing service REST API.
#[derive(Debug, Clone)]
pub struct ProcessingClient {
    base_url: Url,
    client: reqwest::Client,
}

impl ProcessingClient {
    pub fn new(base_url: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|source| ClientError::InvalidBaseUrl {
            url: crate::logging::redact_sensitive_text(base_url),
            source,
        })?;

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|source| ClientError::Build {
                context: "HTTP client".to_string(),
                source,
            })?;

        Ok(Self { base_url, client })
    }

    pub fn from_config(base_url: &str, server: &ServerConfig) -> Result<Self, ClientError> {
        Self::new(base_url, server.connect_timeout(), server.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{path}"));
        url
    }

    /// `GET /data/statistics`
    pub async fn statistics(&self) -> Result<Statistics, ClientError> {
        self.get_json("/data/statistics").await
    }

    /// `GET /data/tasks`
    pub async fn tasks(&self) -> Result<Vec<Task>, ClientError> {
        self.get_json("/data/tasks").await
    }

    /// `GET /data/tasks/{id}`
    pub async fn task(&self, id: i64) -> Result<Task, ClientError> {
        self.get_json(&format!("/data/tasks/{id}")).await
    }

    /// `GET /data/groups`
    pub async fn groups(&self) -> Result<Vec<Group>, ClientError> {
        self.get_json("/data/groups").await
    }

    /// `GET /data/groups/{id}`
    pub async fn group(&self, id: i64) -> Result<Group, ClientError> {
        self.get_json(&format!("/data/groups/{id}")).await
    }

    /// `DELETE /data/{tasks|groups}/{id}`; returns the backend's message.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> Result<Option<String>, ClientError> {
        let path = format!("/data/{}/{id}", kind.path_segment());
        let endpoint = format!("DELETE {path}");
        let response = self
            .send(&endpoint, self.client.delete(self.url(&path)))
            .await?;
        let body: MessageResponse = decode(&endpoint, response).await?;
        Ok(body.message)
    }

    /// `GET /processing/{tasks|groups}/{id}/restart`
    pub async fn restart(&self, kind: EntityKind, id: i64) -> Result<Option<String>, ClientError> {
        let body: MessageResponse = self
            .get_json(&format!("/processing/{}/{id}/restart", kind.path_segment()))
            .await?;
        Ok(body.message)
    }

    /// `GET /processing/status`
    pub async fn processing_status(&self) -> Result<ProcessingStatus, ClientError> {
        self.get_json("/processing/status").await
    }

    /// `GET /processing/toggle`
    pub async fn toggle_processing(&self) -> Result<ProcessingStatus, ClientError> {
        self.get_json("/processing/toggle").await
    }

    /// `POST /processing/run` with every given file under the `files` field.
    pub async fn run(
        &self,
        files: &[&UploadFile],
        options: &ProcessingOptions,
    ) -> Result<RunResponse, ClientError> {
        if files.is_empty() {
            return Err(ClientError::NothingToUpload);
        }

        let mut form = Form::new();
        for (field, value) in options.form_fields() {
            form = form.text(field, value);
        }

        for file in files {
            let bytes = tokio::fs::read(&file.path)
                .await
                .map_err(|source| ClientError::ReadFile {
                    path: file.path.clone(),
                    source,
                })?;
            let part = Part::bytes(bytes)
                .file_name(file.name.clone())
                .mime_str(ZIP_MIME)
                .map_err(|source| ClientError::Build {
                    context: format!("upload part {}", file.name),
                    source,
                })?;
            form = form.part("files", part);
        }

        let endpoint = "POST /processing/run";
        debug!(files = files.len(), format = %options.format, "submitting upload");
        let response = self
            .send(
                endpoint,
                self.client.post(self.url("/processing/run")).multipart(form),
            )
            .await?;
        decode(endpoint, response).await
    }

    /// `GET /data/{tasks|source|groups}/{id}/download` into `destination`.
    ///
    /// The body is streamed into `<destination>.part` and renamed on success;
    /// the partial file never survives a failed attempt.
    pub async fn download(
        &self,
        kind: DownloadKind,
        id: i64,
        destination: &Path,
    ) -> Result<PathBuf, ClientError> {
        let path = format!("/data/{}/{id}/download", kind.path_segment());
        let endpoint = format!("GET {path}");

        let mut attempt = 1;
        loop {
            match self.download_once(&endpoint, &path, destination).await {
                Ok(written) => return Ok(written),
                Err(error) if error.is_retryable() && attempt < DOWNLOAD_MAX_ATTEMPTS => {
                    debug!(
                        endpoint = %endpoint,
                        attempt,
                        max_attempts = DOWNLOAD_MAX_ATTEMPTS,
                        error = %error,
                        "download attempt failed; retrying"
                    );
                    let backoff_ms = DOWNLOAD_RETRY_BACKOFF_MS.saturating_mul(attempt as u64);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn download_once(
        &self,
        endpoint: &str,
        path: &str,
        destination: &Path,
    ) -> Result<PathBuf, ClientError> {
        let mut response = self.send(endpoint, self.client.get(self.url(path))).await?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ClientError::WriteFile {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let tmp_path = partial_path(destination);
        let write_err = |source| ClientError::WriteFile {
            path: tmp_path.clone(),
            source,
        };

        let mut tmp_file = tokio::fs::File::create(&tmp_path).await.map_err(write_err)?;
        let mut tmp_guard = PartialFileGuard::new(&tmp_path);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?
        {
            tmp_file.write_all(&chunk).await.map_err(write_err)?;
        }

        tmp_file.flush().await.map_err(write_err)?;
        tmp_file.sync_all().await.map_err(write_err)?;
        drop(tmp_file);

        tokio::fs::rename(&tmp_path, destination)
            .await
            .map_err(|source| ClientError::WriteFile {
                path: destination.to_path_buf(),
                source,
            })?;

        tmp_guard.disarm();
        Ok(destination.to_path_buf())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let endpoint = format!("GET {path}");
        let response = self.send(&endpoint, self.client.get(self.url(path))).await?;
        decode(&endpoint, response).await
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, ClientError> {
        debug!(endpoint, "sending request");
        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "received response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            detail: describe_error_body(&body),
        })
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, ClientError> {
    response
        .json::<T>()
        .await
        .map_err(|source| ClientError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
}

/// Extract the `{detail}` explanation of a rejected request body.
pub fn describe_error_body(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.detail)
        .map(|detail| detail.describe())
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn is_retryable_reqwest_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body()
}

struct PartialFileGuard<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> PartialFileGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, keep: false }
    }

    fn disarm(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFileGuard<'_> {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(self.path);
        }
    }
}
