//! Plain-text rendering of dashboard state for the terminal.

use std::fmt::{self, Write as _};

use chrono::{DateTime, TimeZone, Utc};
use kptdash_core::dashboard::DashboardState;
use kptdash_core::models::{format_timestamp, Group, ProcessingState, TableKind, Task};
use kptdash_core::panel::{Alert, AlertLevel, StatisticsPanel};
use kptdash_core::table::StatusFilter;
use kptdash_core::upload::{UploadFile, UploadSelection};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub fn alert(alert: &Alert) -> String {
    let tag = match alert.level {
        AlertLevel::Success => "ok",
        AlertLevel::Warning => "warn",
        AlertLevel::Danger => "error",
    };
    format!("[{tag}] {}", alert.message)
}

pub fn processing(state: Option<ProcessingState>) -> String {
    match state {
        Some(ProcessingState::Running) => "Processing: running".to_string(),
        Some(ProcessingState::Paused) => "Processing: paused".to_string(),
        None => "Processing: unknown".to_string(),
    }
}

/// One line of counters; the badge of the active filter is bracketed.
pub fn panel(panel: &StatisticsPanel, active: StatusFilter) -> String {
    panel
        .badges()
        .iter()
        .map(|badge| {
            let text = format!("{}: {}", badge.label, badge.value);
            if badge.filter == active {
                format!("[{text}]")
            } else {
                text
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn task_table<Tz>(rows: &[&Task], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if rows.is_empty() {
        return "No tasks.".to_string();
    }

    let body = rows
        .iter()
        .map(|task| {
            vec![
                task.id.to_string(),
                task.name.clone(),
                task.status.label().to_string(),
                format_timestamp(&task.created_at, tz),
                task.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    text_table(&["ID", "NAME", "STATUS", "CREATED", "ERROR"], body)
}

pub fn group_table<Tz>(rows: &[&Group], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if rows.is_empty() {
        return "No groups.".to_string();
    }

    let body = rows
        .iter()
        .map(|group| {
            let stats = group.statistics;
            vec![
                group.id.to_string(),
                group.name.clone(),
                format_timestamp(&group.created_at, tz),
                stats.loaded.to_string(),
                stats.in_progress.to_string(),
                stats.completed.to_string(),
                stats.failed.to_string(),
                stats.remaining.to_string(),
            ]
        })
        .collect();
    text_table(
        &[
            "ID",
            "NAME",
            "CREATED",
            "LOADED",
            "IN PROGRESS",
            "DONE",
            "ERROR",
            "REMAINING",
        ],
        body,
    )
}

fn upload_file_line(out: &mut String, file: &UploadFile, indent: &str) {
    let mark = if file.accepted { "x" } else { " " };
    let _ = write!(out, "{indent}[{mark}] {}  {}", file.name, file.size_label());
    if let Some(reason) = &file.rejection {
        if file.accepted {
            let _ = write!(out, "  (forced; {reason})");
        } else {
            let _ = write!(out, "  ({reason})");
        }
    }
    out.push('\n');
}

/// Tree of the collected files with their accept marks and a summary line.
pub fn upload_selection(selection: &UploadSelection) -> String {
    let mut out = String::new();

    if !selection.files.is_empty() {
        out.push_str("Files:\n");
        for file in &selection.files {
            upload_file_line(&mut out, file, "  ");
        }
    }

    for dir in &selection.directories {
        let _ = writeln!(
            out,
            "{}/ ({} of {} accepted)",
            dir.path.display(),
            dir.accepted_count(),
            dir.files.len()
        );
        for file in &dir.files {
            upload_file_line(&mut out, file, "  ");
        }
    }

    let _ = write!(
        out,
        "Selected {} of {} files",
        selection.accepted_count(),
        selection.total_count()
    );
    match selection.directory_count() {
        0 => {}
        1 => out.push_str(" in 1 directory"),
        n => {
            let _ = write!(out, " in {n} directories");
        }
    }
    out
}

/// Full screen of the live view.
pub fn dashboard_view<Tz>(
    state: &DashboardState,
    alerts: &[Alert],
    tz: &Tz,
    now: DateTime<Utc>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut out = String::from(CLEAR_SCREEN);

    let _ = writeln!(out, "KPT processing  {}", format_timestamp(&now, tz));
    let _ = writeln!(out, "{}", processing(state.panel.processing));
    let _ = writeln!(out, "{}", panel(&state.panel, state.filter));
    out.push('\n');

    match state.table {
        TableKind::Tasks => {
            let rows = state.tasks.visible_rows(state.filter);
            let _ = writeln!(
                out,
                "Tasks ({}, {} of {} shown)",
                state.filter,
                rows.len(),
                state.tasks.len()
            );
            let _ = writeln!(out, "{}", task_table(&rows, tz));
        }
        TableKind::Groups => {
            let rows = state.groups.visible_rows();
            let _ = writeln!(out, "Groups ({})", rows.len());
            let _ = writeln!(out, "{}", group_table(&rows, tz));
        }
    }

    if let Some(refreshed) = state.table_refreshed_at {
        let _ = writeln!(out, "Updated {}", format_timestamp(&refreshed, tz));
    }

    if !alerts.is_empty() {
        out.push('\n');
        for item in alerts {
            let _ = writeln!(out, "{}", alert(item));
        }
    }

    out.push_str("\nCtrl+C to quit\n");
    out
}

fn text_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(line(headers.to_vec()));
    for row in &rows {
        lines.push(line(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}
