use crate::models::{ProcessingState, Statistics};
use crate::table::StatusFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Success,
    Warning,
    Danger,
}

/// Transient notification shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Warning,
            message: message.into(),
        }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self {
            level: AlertLevel::Danger,
            message: message.into(),
        }
    }
}

/// One counter of the panel together with the table filter it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub value: u64,
    pub filter: StatusFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsPanel {
    pub statistics: Option<Statistics>,
    pub processing: Option<ProcessingState>,
}

impl StatisticsPanel {
    pub fn badges(&self) -> [Badge; 5] {
        badges(&self.statistics.unwrap_or_default())
    }
}

pub fn badges(stats: &Statistics) -> [Badge; 5] {
    [
        Badge {
            label: "Loaded",
            value: stats.loaded,
            filter: StatusFilter::All,
        },
        Badge {
            label: "In progress",
            value: stats.in_progress,
            filter: StatusFilter::InProgress,
        },
        Badge {
            label: "Done",
            value: stats.completed,
            filter: StatusFilter::Completed,
        },
        Badge {
            label: "Error",
            value: stats.failed,
            filter: StatusFilter::Failed,
        },
        Badge {
            label: "Remaining",
            value: stats.remaining,
            filter: StatusFilter::Remaining,
        },
    ]
}

/// Alert raised after the operator toggled processing.
pub fn toggle_alert(state: ProcessingState) -> Alert {
    match state {
        ProcessingState::Running => Alert::success("Processing resumed"),
        ProcessingState::Paused => Alert::warning("Processing paused"),
    }
}
