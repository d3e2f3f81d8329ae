use std::collections::VecDeque;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;

use kptdash_core::client::{ProcessingClient, ProcessingOptions};
use kptdash_core::config::{config_path, data_dir, initialize_data_dir, AppConfig, ProcessingDefaults};
use kptdash_core::dashboard::{Dashboard, DashboardEvent, PollIntervals};
use kptdash_core::logging::{
    self, FileSinkPlan, LoggingInitOptions, PanicHookInstallPlan, RuntimeLogMode,
    DEFAULT_LOG_FILTER,
};
use kptdash_core::models::{DownloadKind, EntityKind, OutputFormat, TableKind};
use kptdash_core::panel::Alert;
use kptdash_core::table::StatusFilter;
use kptdash_core::upload::UploadSelection;

mod render;

/// Alerts kept on screen by `watch`, newest last.
const ALERT_HISTORY: usize = 5;

#[derive(Parser)]
#[command(
    name = "kptdash",
    version,
    about = "Operator dashboard for the KPT conversion service"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(
        long,
        value_name = "DIR",
        global = true,
        help = "Directory holding config.toml and logs (default: KPTDASH_DATA_DIR or ./data)"
    )]
    data_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "URL",
        global = true,
        help = "Backend base URL (overrides KPTDASH_SERVER_URL and the config file)"
    )]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the statistics panel and the processing state
    Stats,
    /// List tasks in table order
    Tasks(TasksArgs),
    /// List groups in table order
    Groups,
    /// Show whether the backend is processing or paused
    Status,
    /// Pause or resume processing
    Toggle,
    /// Delete a task or a whole group
    Delete(EntityArgs),
    /// Queue a task or group for processing again
    Restart(EntityArgs),
    /// Download a result or source archive
    Download(DownloadArgs),
    /// Collect ZIP archives and submit them as one group
    Upload(UploadArgs),
    /// Live view of the panel and table, refreshed by polling
    Watch(WatchArgs),
}

#[derive(Args)]
struct TasksArgs {
    #[arg(
        short,
        long,
        default_value_t = StatusFilter::All,
        help = "all, in-progress, completed, failed or remaining"
    )]
    filter: StatusFilter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EntityArg {
    Task,
    Group,
}

impl From<EntityArg> for EntityKind {
    fn from(arg: EntityArg) -> Self {
        match arg {
            EntityArg::Task => EntityKind::Task,
            EntityArg::Group => EntityKind::Group,
        }
    }
}

#[derive(Args)]
struct EntityArgs {
    kind: EntityArg,
    id: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DownloadArg {
    /// Conversion results of a task
    Tasks,
    /// The archive originally uploaded for a task
    Source,
    /// Results of every task in a group
    Groups,
}

impl From<DownloadArg> for DownloadKind {
    fn from(arg: DownloadArg) -> Self {
        match arg {
            DownloadArg::Tasks => DownloadKind::Tasks,
            DownloadArg::Source => DownloadKind::Source,
            DownloadArg::Groups => DownloadKind::Groups,
        }
    }
}

#[derive(Args)]
struct DownloadArgs {
    kind: DownloadArg,
    id: i64,
    #[arg(short, long, value_name = "DIR", help = "Target directory (default: current)")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct UploadArgs {
    #[arg(required = true, value_name = "PATH", help = "ZIP files or directories to walk")]
    paths: Vec<PathBuf>,
    #[arg(long, help = "Group name (default: chosen by the backend)")]
    name: Option<String>,
    #[arg(short, long, help = "geojson, mapinfo, shapefile or gpkg")]
    format: Option<OutputFormat>,
    #[arg(long, help = "Process archives that were already converted")]
    force_add: bool,
    #[arg(long)]
    merge_objects: bool,
    #[arg(long)]
    skip_empty_geom: bool,
    #[arg(long)]
    remove_empty_attrs: bool,
    #[arg(long)]
    convert_additional_data: bool,
    #[arg(long, help = "Do not write the default coordinate system")]
    no_default_crs: bool,
    #[arg(long, value_name = "PATH", help = "Accept a file the size/extension check rejected")]
    include: Vec<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Drop a file or directory from the selection")]
    exclude: Vec<PathBuf>,
    #[arg(long, help = "Show the selection without uploading")]
    dry_run: bool,
}

impl UploadArgs {
    /// Config defaults, with every flag given on the command line switched on.
    fn processing_options(&self, defaults: &ProcessingDefaults) -> ProcessingOptions {
        let mut options = ProcessingOptions::from_defaults(defaults);
        options.name = self.name.clone();
        if let Some(format) = self.format {
            options.format = format;
        }
        options.force_add |= self.force_add;
        options.merge_objects |= self.merge_objects;
        options.skip_empty_geom |= self.skip_empty_geom;
        options.remove_empty_attrs |= self.remove_empty_attrs;
        options.convert_additional_data |= self.convert_additional_data;
        if self.no_default_crs {
            options.save_default_crs = false;
        }
        options
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TableArg {
    Tasks,
    Groups,
}

impl From<TableArg> for TableKind {
    fn from(arg: TableArg) -> Self {
        match arg {
            TableArg::Tasks => TableKind::Tasks,
            TableArg::Groups => TableKind::Groups,
        }
    }
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long, help = "Table to show; remembered for the next run")]
    table: Option<TableArg>,
    #[arg(short, long, help = "all, in-progress, completed, failed or remaining")]
    filter: Option<StatusFilter>,
}

struct CommandContext {
    config: AppConfig,
    config_path: PathBuf,
    /// False when the file on disk could not be read; it must not be overwritten then.
    config_writable: bool,
    client: ProcessingClient,
}

impl CommandContext {
    fn dashboard(&self, table: TableKind) -> Dashboard {
        Dashboard::new(
            self.client.clone(),
            PollIntervals::from(&self.config.polling),
            table,
        )
    }
}

pub async fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let mode = match cli.command {
        Commands::Watch(_) => RuntimeLogMode::Watch,
        _ => RuntimeLogMode::Command,
    };
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());
    let (config, config_issues) = load_config(&resolved_data_dir);

    init_logging(
        mode,
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
        config.logging.retention_files,
    );
    for issue in &config_issues {
        warn!(error = %format!("{issue:#}"), "Config problem; continuing with defaults");
    }

    let server_url = config.resolve_server_url(cli.server.as_deref());
    log_startup_metadata(mode, &resolved_data_dir, &server_url);

    let client = ProcessingClient::from_config(&server_url, &config.server)
        .context("failed to create backend client")?;
    let ctx = CommandContext {
        config,
        config_path: config_path(&resolved_data_dir),
        config_writable: config_issues.is_empty(),
        client,
    };

    match cli.command {
        Commands::Stats => show_stats(&ctx).await,
        Commands::Tasks(args) => list_tasks(&ctx, args.filter).await,
        Commands::Groups => list_groups(&ctx).await,
        Commands::Status => show_status(&ctx).await,
        Commands::Toggle => toggle(&ctx).await,
        Commands::Delete(args) => delete(&ctx, args).await,
        Commands::Restart(args) => restart(&ctx, args).await,
        Commands::Download(args) => download(&ctx, args).await,
        Commands::Upload(args) => upload(&ctx, args).await,
        Commands::Watch(args) => watch(ctx, args).await,
    }
}

/// Config problems never stop a command; they are reported once logging is up.
fn load_config(data_dir: &Path) -> (AppConfig, Vec<anyhow::Error>) {
    let mut issues = Vec::new();
    if let Err(error) = initialize_data_dir(data_dir) {
        issues.push(error.context("failed to initialize data directory"));
    }

    let config = match AppConfig::load_from_path(&config_path(data_dir)) {
        Ok(config) => config,
        Err(error) => {
            issues.push(error);
            AppConfig::default()
        }
    };
    (config, issues)
}

fn init_logging(
    mode: RuntimeLogMode,
    data_dir: Option<&Path>,
    verbose: u8,
    cli_log_filter: Option<&str>,
    retention_files: usize,
) {
    let panic_hook_plan = logging::install_panic_hook(data_dir);
    if let PanicHookInstallPlan::Fallback {
        attempted_crash_dir,
        reason,
    } = &panic_hook_plan
    {
        let attempted_crash_dir = attempted_crash_dir
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<none>".to_string());
        eprintln!(
            "Warning: crash report hook unavailable (path: {attempted_crash_dir}; reason: {reason})."
        );
    }

    let init_options = LoggingInitOptions {
        mode,
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        retention_files,
        ..Default::default()
    };
    let init_plan = logging::compose_logging_init_plan(&init_options);
    let console_env_filter =
        parse_env_filter_with_fallback(&init_plan.filters.console_filter, "console");

    match init_plan.file_sink {
        FileSinkPlan::Ready(ready) => {
            let file_env_filter =
                parse_env_filter_with_fallback(&init_plan.filters.file_filter, "file");
            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(console_env_filter),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(logging::redacting_make_writer(ready.appender))
                        .with_filter(file_env_filter),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!("Failed to initialize tracing subscriber: {error}.");
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(console_env_filter),
            );
            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!("Failed to initialize tracing subscriber: {error}.");
                return;
            }

            warn!(
                attempted_log_dir = ?fallback.attempted_log_dir,
                reason = %fallback.reason,
                "Log files unavailable; logging to the console only"
            );
        }
    }

    if let PanicHookInstallPlan::Fallback {
        attempted_crash_dir,
        reason,
    } = panic_hook_plan
    {
        warn!(
            attempted_crash_dir = ?attempted_crash_dir,
            reason = %reason,
            "Crash report hook unavailable"
        );
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn log_startup_metadata(mode: RuntimeLogMode, data_dir: &Path, server_url: &str) {
    info!(
        mode = mode.name(),
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        data_dir = %data_dir.display(),
        config_path = %config_path(data_dir).display(),
        server = %logging::redact_sensitive_text(server_url),
        "Startup"
    );
}

/// Print the alerts an action published; everything else is dropped.
fn print_alerts(events: &mut broadcast::Receiver<DashboardEvent>) {
    loop {
        match events.try_recv() {
            Ok(DashboardEvent::Alert(alert)) => println!("{}", render::alert(&alert)),
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

async fn show_stats(ctx: &CommandContext) -> Result<()> {
    let dashboard = ctx.dashboard(TableKind::Tasks);
    let mut events = dashboard.subscribe();

    dashboard
        .refresh_statistics()
        .await
        .context("failed to fetch statistics")?;
    if let Err(error) = dashboard.refresh_processing().await {
        warn!(error = %error, "failed to fetch processing state");
    }

    let state = dashboard.state().await;
    println!("{}", render::processing(state.panel.processing));
    println!("{}", render::panel(&state.panel, state.filter));
    print_alerts(&mut events);
    Ok(())
}

async fn list_tasks(ctx: &CommandContext, filter: StatusFilter) -> Result<()> {
    let dashboard = ctx.dashboard(TableKind::Tasks);
    dashboard.set_filter(filter).await;
    dashboard
        .refresh_table()
        .await
        .context("failed to fetch tasks")?;

    let state = dashboard.state().await;
    println!("{}", render::task_table(&state.tasks.visible_rows(filter), &Local));
    Ok(())
}

async fn list_groups(ctx: &CommandContext) -> Result<()> {
    let dashboard = ctx.dashboard(TableKind::Groups);
    dashboard
        .refresh_table()
        .await
        .context("failed to fetch groups")?;

    let state = dashboard.state().await;
    println!("{}", render::group_table(&state.groups.visible_rows(), &Local));
    Ok(())
}

async fn show_status(ctx: &CommandContext) -> Result<()> {
    let status = ctx
        .client
        .processing_status()
        .await
        .context("failed to fetch processing state")?;
    println!("{}", render::processing(Some(status.status)));
    if let Some(message) = status.message.filter(|m| !m.trim().is_empty()) {
        println!("{message}");
    }
    Ok(())
}

async fn toggle(ctx: &CommandContext) -> Result<()> {
    let dashboard = ctx.dashboard(TableKind::Tasks);
    let mut events = dashboard.subscribe();
    let result = dashboard.toggle_processing().await;
    print_alerts(&mut events);
    result.context("failed to toggle processing")?;
    Ok(())
}

async fn delete(ctx: &CommandContext, args: EntityArgs) -> Result<()> {
    let kind = EntityKind::from(args.kind);
    let dashboard = ctx.dashboard(table_for(kind));
    let mut events = dashboard.subscribe();
    let result = dashboard.delete(kind, args.id).await;
    print_alerts(&mut events);
    result.with_context(|| format!("failed to delete {kind} {}", args.id))?;
    Ok(())
}

async fn restart(ctx: &CommandContext, args: EntityArgs) -> Result<()> {
    let kind = EntityKind::from(args.kind);
    let dashboard = ctx.dashboard(table_for(kind));
    let mut events = dashboard.subscribe();
    let result = dashboard.restart(kind, args.id).await;
    print_alerts(&mut events);
    result.with_context(|| format!("failed to restart {kind} {}", args.id))?;
    Ok(())
}

fn table_for(kind: EntityKind) -> TableKind {
    match kind {
        EntityKind::Task => TableKind::Tasks,
        EntityKind::Group => TableKind::Groups,
    }
}

async fn download(ctx: &CommandContext, args: DownloadArgs) -> Result<()> {
    let kind = DownloadKind::from(args.kind);
    let output_dir = args.output.unwrap_or_else(|| PathBuf::from("."));
    let table = match kind {
        DownloadKind::Groups => TableKind::Groups,
        DownloadKind::Tasks | DownloadKind::Source => TableKind::Tasks,
    };

    let dashboard = ctx.dashboard(table);
    let mut events = dashboard.subscribe();
    let result = dashboard.download(kind, args.id, &output_dir).await;
    print_alerts(&mut events);
    result.with_context(|| format!("failed to download {} archive {}", kind.path_segment(), args.id))?;
    Ok(())
}

/// `--exclude` drops entries, then `--include` overrides the rule check.
fn apply_overrides(
    selection: &mut UploadSelection,
    include: &[PathBuf],
    exclude: &[PathBuf],
) -> Result<()> {
    for path in exclude {
        if !(selection.remove_directory(path) || selection.remove_file(path)) {
            bail!("--exclude {}: not part of the selection", path.display());
        }
    }
    for path in include {
        if !selection.set_accepted(path, true) {
            bail!("--include {}: not part of the selection", path.display());
        }
    }
    Ok(())
}

async fn upload(ctx: &CommandContext, args: UploadArgs) -> Result<()> {
    let mut selection = UploadSelection::collect(&args.paths, &ctx.config.upload)
        .context("failed to collect upload files")?;
    apply_overrides(&mut selection, &args.include, &args.exclude)?;

    println!("{}", render::upload_selection(&selection));
    if args.dry_run {
        return Ok(());
    }

    let options = args.processing_options(&ctx.config.processing);
    let dashboard = ctx.dashboard(TableKind::Tasks);
    let mut events = dashboard.subscribe();
    let result = dashboard.upload(&selection, &options).await;
    print_alerts(&mut events);

    let response = result.context("upload failed")?;
    info!(
        group_id = ?response.group_id,
        tasks = response.task_ids.len(),
        "upload accepted"
    );
    if let Some(group_id) = response.group_id {
        println!("Group {group_id}: {} task(s) queued", response.task_ids.len());
    }
    Ok(())
}

fn push_alert(alerts: &mut VecDeque<Alert>, alert: Alert) {
    if alerts.len() == ALERT_HISTORY {
        alerts.pop_front();
    }
    alerts.push_back(alert);
}

async fn redraw(dashboard: &Dashboard, alerts: &[Alert]) -> Result<()> {
    let state = dashboard.state().await;
    let view = render::dashboard_view(&state, alerts, &Local, Utc::now());

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(view.as_bytes())
        .and_then(|()| stdout.flush())
        .context("failed to draw dashboard")
}

/// Pick the table for `watch` and persist an explicit choice when the config
/// file was loaded cleanly.
fn remember_table(
    config: &AppConfig,
    config_path: &Path,
    config_writable: bool,
    requested: Option<TableKind>,
) -> TableKind {
    let Some(kind) = requested else {
        return config.dashboard.table;
    };
    if kind == config.dashboard.table {
        return kind;
    }
    if !config_writable {
        warn!(
            table = %kind,
            path = %config_path.display(),
            "Config file has problems; table choice not saved"
        );
        return kind;
    }

    let mut updated = config.clone();
    updated.dashboard.table = kind;
    match updated.save_to_path(config_path) {
        Ok(()) => info!(table = %kind, "Saved table choice"),
        Err(error) => warn!(error = %format!("{error:#}"), "Failed to save table choice"),
    }
    kind
}

async fn watch(ctx: CommandContext, args: WatchArgs) -> Result<()> {
    let table = remember_table(
        &ctx.config,
        &ctx.config_path,
        ctx.config_writable,
        args.table.map(TableKind::from),
    );

    let dashboard = ctx.dashboard(table);
    if let Some(filter) = args.filter {
        dashboard.set_filter(filter).await;
    }

    let mut events = dashboard.subscribe();
    let cancel = CancellationToken::new();
    let poller = dashboard.spawn(cancel.clone());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut alerts = VecDeque::with_capacity(ALERT_HISTORY);
    redraw(&dashboard, &[]).await?;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(error) = result {
                    warn!(error = %error, "failed to listen for Ctrl+C");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(DashboardEvent::Alert(alert)) => push_alert(&mut alerts, alert),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "view fell behind dashboard events");
                }
                Err(RecvError::Closed) => break,
            },
        }
        redraw(&dashboard, alerts.make_contiguous()).await?;
    }

    cancel.cancel();
    poller.await.context("dashboard polling task failed")?;
    info!("Watch stopped");
    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kptdash").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = parse(&["tasks", "-vv", "--server", "http://kpt.local:8000", "--filter", "failed"]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.server.as_deref(), Some("http://kpt.local:8000"));
        match cli.command {
            Commands::Tasks(args) => assert_eq!(args.filter, StatusFilter::Failed),
            _ => panic!("expected tasks command"),
        }
    }

    #[test]
    fn tasks_filter_defaults_to_all() {
        match parse(&["tasks"]).command {
            Commands::Tasks(args) => assert_eq!(args.filter, StatusFilter::All),
            _ => panic!("expected tasks command"),
        }
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let result = Cli::try_parse_from(["kptdash", "tasks", "--filter", "pending"]);
        assert!(result.is_err());
    }

    #[test]
    fn entity_commands_take_kind_and_id() {
        match parse(&["restart", "group", "42"]).command {
            Commands::Restart(args) => {
                assert_eq!(EntityKind::from(args.kind), EntityKind::Group);
                assert_eq!(args.id, 42);
            }
            _ => panic!("expected restart command"),
        }
    }

    #[test]
    fn download_accepts_output_directory() {
        match parse(&["download", "source", "7", "-o", "out"]).command {
            Commands::Download(args) => {
                assert_eq!(DownloadKind::from(args.kind), DownloadKind::Source);
                assert_eq!(args.output, Some(PathBuf::from("out")));
            }
            _ => panic!("expected download command"),
        }
    }

    #[test]
    fn upload_requires_a_path() {
        assert!(Cli::try_parse_from(["kptdash", "upload"]).is_err());
    }

    #[test]
    fn watch_parses_table_and_filter() {
        match parse(&["watch", "--table", "groups", "-f", "in-progress"]).command {
            Commands::Watch(args) => {
                assert_eq!(args.table.map(TableKind::from), Some(TableKind::Groups));
                assert_eq!(args.filter, Some(StatusFilter::InProgress));
            }
            _ => panic!("expected watch command"),
        }
    }
}


#[cfg(test)]
mod selection_override_tests {
    use kptdash_core::upload::UploadRules;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn include_forces_rejected_file_and_exclude_drops_entries() {
        let root = tempdir().unwrap();
        let nested = root.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let small = root.path().join("small.zip");
        std::fs::write(&small, vec![0u8; 1024]).unwrap();
        std::fs::write(root.path().join("big.zip"), vec![0u8; 60 * 1024]).unwrap();
        std::fs::write(nested.join("deep.zip"), vec![0u8; 60 * 1024]).unwrap();

        let mut selection =
            UploadSelection::collect(&[root.path()], &UploadRules::default()).unwrap();
        assert_eq!(selection.accepted_count(), 2);

        apply_overrides(&mut selection, &[small.clone()], &[nested.clone()]).unwrap();

        let accepted: Vec<&str> = selection
            .accepted_files()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(accepted, vec!["big.zip", "small.zip"]);
        assert_eq!(selection.directory_count(), 1);
    }

    #[test]
    fn unknown_override_path_is_an_error() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("big.zip"), vec![0u8; 60 * 1024]).unwrap();
        let mut selection =
            UploadSelection::collect(&[root.path()], &UploadRules::default()).unwrap();

        let error = apply_overrides(&mut selection, &[root.path().join("missing.zip")], &[])
            .unwrap_err();
        assert!(error.to_string().contains("not part of the selection"));
    }
}
