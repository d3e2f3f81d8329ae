//! Wire types of the processing service REST contract.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Counters returned by `GET /data/statistics` and embedded in every group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub loaded: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Accepted,
    Parsing,
    Converting,
    Postprocessing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Accepted,
        TaskStatus::Parsing,
        TaskStatus::Converting,
        TaskStatus::Postprocessing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Sort key of the status column: active stages first, queued work last.
    pub fn priority(self) -> u8 {
        match self {
            TaskStatus::Parsing => 1,
            TaskStatus::Converting => 2,
            TaskStatus::Postprocessing => 3,
            TaskStatus::Failed => 4,
            TaskStatus::Completed => 5,
            TaskStatus::Accepted => 6,
            TaskStatus::Unknown => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Accepted => "Accepted",
            TaskStatus::Parsing => "Preparing XML",
            TaskStatus::Converting => "Converting XML",
            TaskStatus::Postprocessing => "Post-processing",
            TaskStatus::Completed => "Done",
            TaskStatus::Failed => "Error",
            TaskStatus::Unknown => "",
        }
    }

    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            TaskStatus::Parsing | TaskStatus::Converting | TaskStatus::Postprocessing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Accepted => "accepted",
            TaskStatus::Parsing => "parsing",
            TaskStatus::Converting => "converting",
            TaskStatus::Postprocessing => "postprocessing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `GET /data/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(with = "backend_time")]
    pub created_at: DateTime<Utc>,
}

/// One row of `GET /data/groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(with = "backend_time")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub statistics: Statistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Running,
    Paused,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingState::Running => f.write_str("running"),
            ProcessingState::Paused => f.write_str("paused"),
        }
    }
}

/// Body of `GET /processing/status` and `GET /processing/toggle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub status: ProcessingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `{message}` acknowledgement returned by delete and restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of a successful `POST /processing/run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub task_ids: Vec<i64>,
}

/// `{detail}` carried by rejected requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Validation(Vec<ValidationIssue>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationIssue {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
}

impl ErrorDetail {
    /// Human-readable rendering: validation issues become
    /// `body > files: field required` lines.
    pub fn describe(&self) -> String {
        match self {
            ErrorDetail::Text(text) => text.clone(),
            ErrorDetail::Validation(issues) => issues
                .iter()
                .map(ValidationIssue::describe)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl ValidationIssue {
    pub fn describe(&self) -> String {
        let location = self
            .loc
            .iter()
            .map(|part| match part {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" > ");
        format!("{location}: {}", self.msg)
    }
}

/// Target format of the conversion, sent as the `format` form field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "GeoJSON")]
    GeoJson,
    #[serde(rename = "MapInfo File")]
    MapInfo,
    #[default]
    #[serde(rename = "ESRI Shapefile")]
    EsriShapefile,
    #[serde(rename = "GPKG")]
    GeoPackage,
}

impl OutputFormat {
    pub fn wire_value(self) -> &'static str {
        match self {
            OutputFormat::GeoJson => "GeoJSON",
            OutputFormat::MapInfo => "MapInfo File",
            OutputFormat::EsriShapefile => "ESRI Shapefile",
            OutputFormat::GeoPackage => "GPKG",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_value())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "geojson" => Ok(OutputFormat::GeoJson),
            "mapinfo" | "mapinfo file" | "tab" => Ok(OutputFormat::MapInfo),
            "shapefile" | "esri shapefile" | "shp" => Ok(OutputFormat::EsriShapefile),
            "gpkg" | "geopackage" => Ok(OutputFormat::GeoPackage),
            other => Err(format!(
                "unknown output format '{other}' (expected geojson, mapinfo, shapefile or gpkg)"
            )),
        }
    }
}

/// Which listing the dashboard table shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    #[default]
    Tasks,
    Groups,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Tasks => f.write_str("tasks"),
            TableKind::Groups => f.write_str("groups"),
        }
    }
}

/// Entity addressed by delete and restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Task,
    Group,
}

impl EntityKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Group => "groups",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Task => f.write_str("task"),
            EntityKind::Group => f.write_str("group"),
        }
    }
}

/// Archive served by `GET /data/{kind}/{id}/download`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// Conversion results of a task.
    Tasks,
    /// The archive originally uploaded for a task.
    Source,
    /// Results of every task in a group.
    Groups,
}

impl DownloadKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            DownloadKind::Tasks => "tasks",
            DownloadKind::Source => "source",
            DownloadKind::Groups => "groups",
        }
    }
}

/// Format a timestamp like `3 March 2024, 14:05` in the given zone.
pub fn format_timestamp<Tz>(ts: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    ts.with_timezone(tz).format("%-d %B %Y, %H:%M").to_string()
}

/// The backend stores naive UTC timestamps; explicit offsets are accepted too.
pub mod backend_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Some(with_offset.with_timezone(&Utc));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    #[test]
    fn deserialize_task_with_naive_timestamp() {
        let json = r#"{
            "id": 17,
            "name": "kpt_77_01_0004012",
            "group_id": 3,
            "status": "converting",
            "error": null,
            "created_at": "2024-03-03T11:05:09.512334",
            "updated_at": "2024-03-03T11:06:00"
        }"#;

        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, 17);
        assert_eq!(task.status, TaskStatus::Converting);
        assert!(task.error.is_none());
        assert_eq!(
            task.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-03-03 11:05:09"
        );
    }

    #[test]
    fn unknown_status_does_not_fail_decode() {
        let json = r#"{"id": 1, "name": "x", "status": "archived", "created_at": "2024-01-01T00:00:00"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::Unknown);
        assert_eq!(task.status.priority(), 0);
        assert_eq!(task.status.label(), "");
    }

    #[test]
    fn deserialize_group_with_offset_timestamp() {
        let json = r#"{
            "id": 4,
            "name": "March batch",
            "created_at": "2024-03-03T11:05:09+03:00",
            "statistics": {"loaded": 10, "in_progress": 2, "completed": 5, "failed": 1, "remaining": 4}
        }"#;

        let group: Group = serde_json::from_str(json).unwrap();
        assert_eq!(group.statistics.loaded, 10);
        assert_eq!(group.statistics.remaining, 4);
        assert_eq!(
            group.created_at.format("%H:%M").to_string(),
            "08:05",
            "offset must be normalized to UTC"
        );
    }

    #[test]
    fn invalid_timestamp_is_a_decode_error() {
        let json = r#"{"id": 1, "name": "x", "status": "failed", "created_at": "yesterday"}"#;
        let err = serde_json::from_str::<Task>(json).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));
    }

    #[test]
    fn status_priorities_match_table_order() {
        let mut statuses = TaskStatus::ALL.to_vec();
        statuses.sort_by_key(|s| s.priority());
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Parsing,
                TaskStatus::Converting,
                TaskStatus::Postprocessing,
                TaskStatus::Failed,
                TaskStatus::Completed,
                TaskStatus::Accepted,
            ]
        );
    }

    #[test]
    fn in_progress_covers_active_stages_only() {
        let active: Vec<_> = TaskStatus::ALL
            .into_iter()
            .filter(|s| s.is_in_progress())
            .collect();
        assert_eq!(
            active,
            vec![
                TaskStatus::Parsing,
                TaskStatus::Converting,
                TaskStatus::Postprocessing
            ]
        );
    }

    #[test]
    fn text_detail_is_described_verbatim() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail": "archive is corrupted"}"#).unwrap();
        assert_eq!(body.detail.unwrap().describe(), "archive is corrupted");
    }

    #[test]
    fn validation_detail_joins_locations() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"detail": [
                {"loc": ["body", "files"], "msg": "field required", "type": "missing"},
                {"loc": ["body", "files", 0], "msg": "expected UploadFile"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            body.detail.unwrap().describe(),
            "body > files: field required\nbody > files > 0: expected UploadFile"
        );
    }

    #[test]
    fn missing_detail_is_none() {
        let body: ErrorBody = serde_json::from_str(r#"{"message": "nope"}"#).unwrap();
        assert!(body.detail.is_none());
    }

    #[test]
    fn output_format_parses_cli_and_wire_names() {
        assert_eq!("geojson".parse::<OutputFormat>(), Ok(OutputFormat::GeoJson));
        assert_eq!("MapInfo File".parse::<OutputFormat>(), Ok(OutputFormat::MapInfo));
        assert_eq!("SHAPEFILE".parse::<OutputFormat>(), Ok(OutputFormat::EsriShapefile));
        assert_eq!("gpkg".parse::<OutputFormat>(), Ok(OutputFormat::GeoPackage));
        assert!("kml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().wire_value(), "ESRI Shapefile");
    }

    #[test]
    fn processing_status_decodes_toggle_body() {
        let status: ProcessingStatus =
            serde_json::from_str(r#"{"message": "Processing paused", "status": "paused"}"#).unwrap();
        assert_eq!(status.status, ProcessingState::Paused);
        assert_eq!(status.message.as_deref(), Some("Processing paused"));
    }

    #[test]
    fn format_timestamp_uses_requested_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 3, 11, 5, 0).unwrap();
        let moscow = FixedOffset::east_opt(3 * 3600).unwrap();
        assert_eq!(format_timestamp(&ts, &moscow), "3 March 2024, 14:05");
        assert_eq!(format_timestamp(&ts, &Utc), "3 March 2024, 11:05");
    }
}
