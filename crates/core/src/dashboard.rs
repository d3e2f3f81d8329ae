//! Polling synchronization between the statistics panel, the task/group
//! table and operator actions.
//!
//! Two loops poll the backend: statistics on a slow interval and the active
//! table on a faster one. Operator actions (delete, restart, download) hold a
//! [`TablePause`] while they run so a periodic refresh never races them, and
//! refresh the table themselves once the backend has answered. Every state
//! change is published as a [`DashboardEvent`] for whoever renders it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientError, ProcessingClient, ProcessingOptions};
use crate::config::PollingConfig;
use crate::models::{
    DownloadKind, EntityKind, ProcessingState, RunResponse, Statistics, TableKind,
};
use crate::panel::{toggle_alert, Alert, StatisticsPanel};
use crate::table::{GroupTable, StatusFilter, TaskTable};
use crate::upload::UploadSelection;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub statistics: Duration,
    pub table: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollIntervals {
    fn from(config: &PollingConfig) -> Self {
        Self {
            statistics: config.statistics_interval(),
            table: config.table_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub panel: StatisticsPanel,
    pub table: TableKind,
    pub filter: StatusFilter,
    pub tasks: TaskTable,
    pub groups: GroupTable,
    pub table_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Statistics(Statistics),
    Processing(ProcessingState),
    /// The given table has new rows or a new filter.
    Table(TableKind),
    Alert(Alert),
}

#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<DashboardInner>,
}

struct DashboardInner {
    client: ProcessingClient,
    intervals: PollIntervals,
    state: RwLock<DashboardState>,
    events: broadcast::Sender<DashboardEvent>,
    table_pauses: AtomicUsize,
}

/// Suspends periodic table refreshes until dropped.
pub struct TablePause<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for TablePause<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Dashboard {
    pub fn new(client: ProcessingClient, intervals: PollIntervals, table: TableKind) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = DashboardState {
            table,
            ..DashboardState::default()
        };

        Self {
            inner: Arc::new(DashboardInner {
                client,
                intervals,
                state: RwLock::new(state),
                events,
                table_pauses: AtomicUsize::new(0),
            }),
        }
    }

    pub fn client(&self) -> &ProcessingClient {
        &self.inner.client
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> DashboardState {
        self.inner.state.read().await.clone()
    }

    pub fn pause_table(&self) -> TablePause<'_> {
        self.inner.table_pauses.fetch_add(1, Ordering::AcqRel);
        TablePause {
            counter: &self.inner.table_pauses,
        }
    }

    pub fn is_table_paused(&self) -> bool {
        self.inner.table_pauses.load(Ordering::Acquire) > 0
    }

    fn emit(&self, event: DashboardEvent) {
        // No subscribers is fine: one-shot commands never listen.
        let _ = self.inner.events.send(event);
    }

    fn alert(&self, alert: Alert) {
        debug!(level = ?alert.level, message = %alert.message, "dashboard alert");
        self.emit(DashboardEvent::Alert(alert));
    }

    pub async fn refresh_statistics(&self) -> Result<Statistics, ClientError> {
        let stats = self.inner.client.statistics().await?;
        self.inner.state.write().await.panel.statistics = Some(stats);
        self.emit(DashboardEvent::Statistics(stats));
        Ok(stats)
    }

    /// Fetch the processing switch; a paused service raises a warning.
    pub async fn refresh_processing(&self) -> Result<ProcessingState, ClientError> {
        let status = self.inner.client.processing_status().await?;
        self.inner.state.write().await.panel.processing = Some(status.status);
        self.emit(DashboardEvent::Processing(status.status));
        if status.status == ProcessingState::Paused {
            self.alert(Alert::warning("Processing paused"));
        }
        Ok(status.status)
    }

    /// Reload the rows of the active table. Rows fetched for a table that
    /// was switched away from in the meantime are discarded.
    pub async fn refresh_table(&self) -> Result<(), ClientError> {
        let kind = self.inner.state.read().await.table;

        match kind {
            TableKind::Tasks => {
                let rows = self.inner.client.tasks().await?;
                let mut state = self.inner.state.write().await;
                if state.table != kind {
                    return Ok(());
                }
                state.tasks.replace(rows);
                state.table_refreshed_at = Some(Utc::now());
            }
            TableKind::Groups => {
                let rows = self.inner.client.groups().await?;
                let mut state = self.inner.state.write().await;
                if state.table != kind {
                    return Ok(());
                }
                state.groups.replace(rows);
                state.table_refreshed_at = Some(Utc::now());
            }
        }

        self.emit(DashboardEvent::Table(kind));
        Ok(())
    }

    pub async fn switch_table(&self, kind: TableKind) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.write().await;
            if state.table == kind {
                drop(state);
                return self.refresh_table().await;
            }
            state.table = kind;
            state.table_refreshed_at = None;
        }
        info!(table = %kind, "switched dashboard table");
        self.refresh_table().await
    }

    pub async fn set_filter(&self, filter: StatusFilter) {
        let kind = {
            let mut state = self.inner.state.write().await;
            state.filter = filter;
            state.table
        };
        if kind == TableKind::Groups && filter != StatusFilter::All {
            debug!(%filter, "status filter only applies to the task table");
        }
        self.emit(DashboardEvent::Table(kind));
    }

    pub async fn toggle_processing(&self) -> Result<ProcessingState, ClientError> {
        match self.inner.client.toggle_processing().await {
            Ok(status) => {
                self.inner.state.write().await.panel.processing = Some(status.status);
                self.emit(DashboardEvent::Processing(status.status));
                self.alert(toggle_alert(status.status));
                Ok(status.status)
            }
            Err(error) => {
                self.alert(Alert::danger(format!("Request failed: {error}")));
                Err(error)
            }
        }
    }

    pub async fn delete(&self, kind: EntityKind, id: i64) -> Result<Option<String>, ClientError> {
        let result = {
            let _pause = self.pause_table();
            self.inner.client.delete(kind, id).await
        };
        self.finish_action(result, || format!("{} {id} deleted", capitalized(kind)))
            .await
    }

    pub async fn restart(&self, kind: EntityKind, id: i64) -> Result<Option<String>, ClientError> {
        let result = {
            let _pause = self.pause_table();
            self.inner.client.restart(kind, id).await
        };
        self.finish_action(result, || format!("{} {id} restarted", capitalized(kind)))
            .await
    }

    async fn finish_action(
        &self,
        result: Result<Option<String>, ClientError>,
        fallback_message: impl FnOnce() -> String,
    ) -> Result<Option<String>, ClientError> {
        match &result {
            Ok(message) => {
                let text = message.clone().unwrap_or_else(fallback_message);
                self.alert(Alert::success(text));
            }
            Err(error) => self.alert(Alert::danger(format!("Request failed: {error}"))),
        }

        if let Err(error) = self.refresh_table().await {
            warn!(error = %error, "failed to refresh table after action");
        }
        result
    }

    /// Download an archive as `<output_dir>/<name>.zip`, where the name comes
    /// from the task or group being downloaded.
    pub async fn download(
        &self,
        kind: DownloadKind,
        id: i64,
        output_dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let _pause = self.pause_table();

        let result = async {
            let name = self.archive_name(kind, id).await?;
            let destination = output_dir.join(archive_file_name(&name));
            self.inner.client.download(kind, id, &destination).await
        }
        .await;

        match &result {
            Ok(path) => {
                info!(path = %path.display(), "archive downloaded");
                self.alert(Alert::success(format!("Saved {}", path.display())));
            }
            Err(error) => self.alert(Alert::danger(format!("Download failed: {error}"))),
        }
        result
    }

    async fn archive_name(&self, kind: DownloadKind, id: i64) -> Result<String, ClientError> {
        {
            let state = self.inner.state.read().await;
            let cached = match kind {
                DownloadKind::Tasks | DownloadKind::Source => {
                    state.tasks.find(id).map(|task| task.name.clone())
                }
                DownloadKind::Groups => state.groups.find(id).map(|group| group.name.clone()),
            };
            if let Some(name) = cached {
                return Ok(name);
            }
        }

        match kind {
            DownloadKind::Tasks | DownloadKind::Source => {
                Ok(self.inner.client.task(id).await?.name)
            }
            DownloadKind::Groups => Ok(self.inner.client.group(id).await?.name),
        }
    }

    /// Submit every accepted file of `selection` as one group.
    pub async fn upload(
        &self,
        selection: &UploadSelection,
        options: &ProcessingOptions,
    ) -> Result<RunResponse, ClientError> {
        let files = selection.accepted_files();
        if files.is_empty() {
            self.alert(Alert::warning("No files selected!"));
            return Err(ClientError::NothingToUpload);
        }

        info!(files = files.len(), "uploading archives");
        match self.inner.client.run(&files, options).await {
            Ok(response) => {
                self.alert(Alert::success("Files uploaded successfully"));
                if let Err(error) = self.refresh_table().await {
                    warn!(error = %error, "failed to refresh table after upload");
                }
                Ok(response)
            }
            Err(error) => {
                let message = error
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                self.alert(Alert::danger(message));
                Err(error)
            }
        }
    }

    /// Poll until `cancel` fires. Both loops refresh immediately on start.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(error) = self.refresh_processing().await {
            warn!(error = %error, "failed to read processing status");
        }

        tokio::join!(
            self.statistics_loop(cancel.clone()),
            self.table_loop(cancel.clone())
        );
        debug!("dashboard polling stopped");
    }

    pub fn spawn(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let dashboard = self.clone();
        tokio::spawn(async move { dashboard.run(cancel).await })
    }

    async fn statistics_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.intervals.statistics);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(error) = self.refresh_statistics().await {
                        warn!(error = %error, "failed to refresh statistics");
                    }
                }
            }
        }
    }

    async fn table_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.intervals.table);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.is_table_paused() {
                        debug!("table refresh skipped while an action is running");
                        continue;
                    }
                    if let Err(error) = self.refresh_table().await {
                        warn!(error = %error, "failed to refresh table");
                    }
                }
            }
        }
    }
}

fn capitalized(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Task => "Task",
        EntityKind::Group => "Group",
    }
}

/// `<name>.zip` with path separators replaced.
pub fn archive_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();
    let stem = if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "archive".to_string()
    } else {
        cleaned
    };
    format!("{stem}.zip")
}
