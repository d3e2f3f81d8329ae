//! In-process stand-in for the processing service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

pub const ARCHIVE_BYTES: &[u8] = b"PK\x03\x04 converted archive";
pub const SOURCE_BYTES: &[u8] = b"PK\x03\x04 source archive";

#[derive(Debug, Clone)]
pub struct MockTask {
    pub id: i64,
    pub name: String,
    pub status: &'static str,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MockGroup {
    pub id: i64,
    pub name: String,
    pub in_progress: u64,
}

#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub len: usize,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub tasks: Vec<MockTask>,
    pub groups: Vec<MockGroup>,
    pub paused: bool,
    pub run_fields: Vec<(String, String)>,
    pub run_files: Vec<ReceivedFile>,
    /// Remaining 503 answers per download path before it succeeds.
    pub flaky_downloads: HashMap<String, usize>,
    /// Remaining 500 answers of `/data/statistics` before it succeeds.
    pub failing_statistics: usize,
    /// `detail` sent with a 422 from `/processing/run` instead of accepting.
    pub run_rejection: Option<Value>,
    pub hits: HashMap<String, usize>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn seeded() -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.lock().unwrap();
            state.tasks = vec![
                task(1, "kpt-01", "accepted"),
                task(2, "kpt-02", "completed"),
                task(3, "kpt-03", "parsing"),
                MockTask {
                    error: Some("broken XML".to_string()),
                    ..task(4, "kpt-04", "failed")
                },
            ];
            state.groups = vec![
                MockGroup {
                    id: 10,
                    name: "March batch".to_string(),
                    in_progress: 2,
                },
                MockGroup {
                    id: 11,
                    name: "April batch".to_string(),
                    in_progress: 0,
                },
            ];
        }
        backend
    }

    pub fn hits(&self, route: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(route)
            .copied()
            .unwrap_or(0)
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Serve on an ephemeral port and return the base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

fn task(id: i64, name: &str, status: &'static str) -> MockTask {
    MockTask {
        id,
        name: name.to_string(),
        status,
        error: None,
    }
}

fn record(backend: &MockBackend, route: &str) {
    *backend
        .state
        .lock()
        .unwrap()
        .hits
        .entry(route.to_string())
        .or_insert(0) += 1;
}

fn task_json(task: &MockTask) -> Value {
    json!({
        "id": task.id,
        "name": task.name,
        "status": task.status,
        "error": task.error,
        "created_at": "2024-03-03T14:05:00.123456",
    })
}

fn group_json(group: &MockGroup) -> Value {
    json!({
        "id": group.id,
        "name": group.name,
        "created_at": "2024-03-01T09:00:00",
        "statistics": {
            "loaded": 4,
            "in_progress": group.in_progress,
            "completed": 1,
            "failed": 1,
            "remaining": group.in_progress,
        },
    })
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": format!("{what} not found") })),
    )
        .into_response()
}

fn router(backend: MockBackend) -> Router {
    Router::new()
        .route("/data/statistics", get(statistics))
        .route("/data/tasks", get(tasks))
        .route("/data/tasks/{id}", get(task_by_id).delete(delete_task))
        .route("/data/groups", get(groups))
        .route("/data/groups/{id}", get(group_by_id).delete(delete_group))
        .route("/data/tasks/{id}/download", get(download_task))
        .route("/data/source/{id}/download", get(download_source))
        .route("/data/groups/{id}/download", get(download_group))
        .route("/processing/tasks/{id}/restart", get(restart_task))
        .route("/processing/groups/{id}/restart", get(restart_group))
        .route("/processing/status", get(processing_status))
        .route("/processing/toggle", get(toggle))
        .route("/processing/run", axum::routing::post(run))
        .with_state(backend)
}

async fn statistics(State(backend): State<MockBackend>) -> Response {
    record(&backend, "statistics");
    let mut state = backend.state.lock().unwrap();
    if state.failing_statistics > 0 {
        state.failing_statistics -= 1;
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "database unavailable" })),
        )
            .into_response();
    }
    let count = |status: &str| state.tasks.iter().filter(|t| t.status == status).count();
    let in_progress = count("parsing") + count("converting") + count("postprocessing");
    Json(json!({
        "loaded": state.tasks.len(),
        "in_progress": in_progress,
        "completed": count("completed"),
        "failed": count("failed"),
        "remaining": in_progress + count("accepted"),
    }))
    .into_response()
}

async fn tasks(State(backend): State<MockBackend>) -> Json<Value> {
    record(&backend, "tasks");
    let state = backend.state.lock().unwrap();
    Json(Value::Array(state.tasks.iter().map(task_json).collect()))
}

async fn task_by_id(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    record(&backend, "task");
    let state = backend.state.lock().unwrap();
    match state.tasks.iter().find(|t| t.id == id) {
        Some(task) => Json(task_json(task)).into_response(),
        None => not_found("Task"),
    }
}

async fn groups(State(backend): State<MockBackend>) -> Json<Value> {
    record(&backend, "groups");
    let state = backend.state.lock().unwrap();
    Json(Value::Array(state.groups.iter().map(group_json).collect()))
}

async fn group_by_id(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    record(&backend, "group");
    let state = backend.state.lock().unwrap();
    match state.groups.iter().find(|g| g.id == id) {
        Some(group) => Json(group_json(group)).into_response(),
        None => not_found("Group"),
    }
}

async fn delete_task(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    record(&backend, "delete_task");
    let mut state = backend.state.lock().unwrap();
    let before = state.tasks.len();
    state.tasks.retain(|t| t.id != id);
    if state.tasks.len() == before {
        return not_found("Task");
    }
    Json(json!({ "message": format!("Task {id} deleted") })).into_response()
}

async fn delete_group(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    record(&backend, "delete_group");
    let mut state = backend.state.lock().unwrap();
    let before = state.groups.len();
    state.groups.retain(|g| g.id != id);
    if state.groups.len() == before {
        return not_found("Group");
    }
    // No message: clients fall back to their own wording.
    Json(json!({})).into_response()
}

async fn restart_task(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    record(&backend, "restart_task");
    let mut state = backend.state.lock().unwrap();
    match state.tasks.iter_mut().find(|t| t.id == id) {
        Some(task) => {
            task.status = "accepted";
            task.error = None;
            Json(json!({ "message": format!("Task {id} queued again") })).into_response()
        }
        None => not_found("Task"),
    }
}

async fn restart_group(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    record(&backend, "restart_group");
    let state = backend.state.lock().unwrap();
    if state.groups.iter().any(|g| g.id == id) {
        Json(json!({ "message": format!("Group {id} queued again") })).into_response()
    } else {
        not_found("Group")
    }
}

fn processing_json(paused: bool) -> Json<Value> {
    if paused {
        Json(json!({ "status": "paused", "message": "Processing paused" }))
    } else {
        Json(json!({ "status": "running" }))
    }
}

async fn processing_status(State(backend): State<MockBackend>) -> Json<Value> {
    record(&backend, "processing_status");
    processing_json(backend.state.lock().unwrap().paused)
}

async fn toggle(State(backend): State<MockBackend>) -> Json<Value> {
    record(&backend, "toggle");
    let mut state = backend.state.lock().unwrap();
    state.paused = !state.paused;
    processing_json(state.paused)
}

async fn run(State(backend): State<MockBackend>, mut multipart: Multipart) -> Response {
    record(&backend, "run");
    let mut fields = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "files" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let len = field.bytes().await.unwrap().len();
            files.push(ReceivedFile {
                file_name,
                content_type,
                len,
            });
        } else {
            let value = field.text().await.unwrap();
            fields.push((name, value));
        }
    }

    let mut state = backend.state.lock().unwrap();
    if let Some(detail) = state.run_rejection.clone() {
        state.run_fields = fields;
        state.run_files = files;
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": detail })),
        )
            .into_response();
    }
    let first_id = state.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
    let mut task_ids = Vec::new();
    for (offset, file) in files.iter().enumerate() {
        let id = first_id + offset as i64;
        let name = file.file_name.trim_end_matches(".zip");
        state.tasks.push(task(id, name, "accepted"));
        task_ids.push(id);
    }
    state.run_fields = fields;
    state.run_files = files;

    Json(json!({ "group_id": 12, "task_ids": task_ids })).into_response()
}

fn serve_archive(backend: &MockBackend, route: &str, exists: bool, body: &'static [u8]) -> Response {
    record(backend, route);
    let mut state = backend.state.lock().unwrap();
    if let Some(remaining) = state.flaky_downloads.get_mut(route) {
        if *remaining > 0 {
            *remaining -= 1;
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "storage busy" })),
            )
                .into_response();
        }
    }
    if !exists {
        return not_found("Archive");
    }
    ([("content-type", "application/zip")], body).into_response()
}

async fn download_task(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    let exists = backend.with_state(|s| s.tasks.iter().any(|t| t.id == id && t.status == "completed"));
    serve_archive(&backend, &format!("download/tasks/{id}"), exists, ARCHIVE_BYTES)
}

async fn download_source(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    let exists = backend.with_state(|s| s.tasks.iter().any(|t| t.id == id));
    serve_archive(&backend, &format!("download/source/{id}"), exists, SOURCE_BYTES)
}

async fn download_group(State(backend): State<MockBackend>, Path(id): Path<i64>) -> Response {
    let exists = backend.with_state(|s| s.groups.iter().any(|g| g.id == id));
    serve_archive(&backend, &format!("download/groups/{id}"), exists, ARCHIVE_BYTES)
}
