use std::fmt;
use std::str::FromStr;

use crate::models::{Group, TaskStatus, Task};

/// Status subsets selectable from the statistics panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    InProgress,
    Completed,
    Failed,
    Remaining,
}

impl StatusFilter {
    pub fn statuses(self) -> &'static [TaskStatus] {
        match self {
            StatusFilter::All => &[],
            StatusFilter::InProgress => &[
                TaskStatus::Parsing,
                TaskStatus::Converting,
                TaskStatus::Postprocessing,
            ],
            StatusFilter::Completed => &[TaskStatus::Completed],
            StatusFilter::Failed => &[TaskStatus::Failed],
            StatusFilter::Remaining => &[
                TaskStatus::Accepted,
                TaskStatus::Parsing,
                TaskStatus::Converting,
                TaskStatus::Postprocessing,
            ],
        }
    }

    pub fn matches(self, status: TaskStatus) -> bool {
        let statuses = self.statuses();
        statuses.is_empty() || statuses.contains(&status)
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusFilter::All => "all",
            StatusFilter::InProgress => "in-progress",
            StatusFilter::Completed => "completed",
            StatusFilter::Failed => "failed",
            StatusFilter::Remaining => "remaining",
        };
        f.write_str(name)
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "all" | "loaded" => Ok(StatusFilter::All),
            "in-progress" | "working" => Ok(StatusFilter::InProgress),
            "completed" | "done" => Ok(StatusFilter::Completed),
            "failed" | "error" => Ok(StatusFilter::Failed),
            "remaining" => Ok(StatusFilter::Remaining),
            other => Err(format!(
                "unknown status filter '{other}' (expected all, in-progress, completed, failed or remaining)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskTable {
    rows: Vec<Task>,
}

impl TaskTable {
    pub fn replace(&mut self, rows: Vec<Task>) {
        self.rows = rows;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn find(&self, id: i64) -> Option<&Task> {
        self.rows.iter().find(|task| task.id == id)
    }

    /// Rows passing `filter`, ordered by status priority. Ties keep the
    /// backend's order.
    pub fn visible_rows(&self, filter: StatusFilter) -> Vec<&Task> {
        let mut rows: Vec<&Task> = self
            .rows
            .iter()
            .filter(|task| filter.matches(task.status))
            .collect();
        rows.sort_by_key(|task| task.status.priority());
        rows
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupTable {
    rows: Vec<Group>,
}

impl GroupTable {
    pub fn replace(&mut self, rows: Vec<Group>) {
        self.rows = rows;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn find(&self, id: i64) -> Option<&Group> {
        self.rows.iter().find(|group| group.id == id)
    }

    /// Groups ordered by how much work they still have in flight.
    pub fn visible_rows(&self) -> Vec<&Group> {
        let mut rows: Vec<&Group> = self.rows.iter().collect();
        rows.sort_by_key(|group| group.statistics.in_progress);
        rows
    }
}
