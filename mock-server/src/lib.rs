//! In-memory TestRail stand-in for tests and local runs.
//!
//! TestRail routes API calls through the query string
//! (`/index.php?/api/v2/add_run/1`), so a single `/index.php` route receives
//! everything and dispatches on the raw query.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    pub description: String,
    pub milestone_id: Option<u64>,
    pub suite_id: Option<u64>,
    pub include_all: bool,
    pub case_ids: Vec<u64>,
    pub is_completed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub id: u64,
    pub run_id: u64,
    pub case_id: u64,
    pub status_id: u32,
    pub comment: String,
    pub elapsed: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub id: u64,
    pub result_id: u64,
    pub filename: String,
    pub size: usize,
}

/// Everything the server has accepted so far.
#[derive(Debug, Default)]
pub struct Store {
    pub runs: HashMap<u64, RunRecord>,
    pub results: Vec<ResultRecord>,
    pub attachments: Vec<AttachmentRecord>,
    next_id: u64,
}

impl Store {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Accepted credentials and the projects that exist.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub username: String,
    pub password: String,
    pub projects: HashSet<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            username: "ci@example.com".to_string(),
            password: "secret".to_string(),
            projects: HashSet::from([1]),
        }
    }
}

#[derive(Clone)]
struct AppState {
    db: Db,
    authorization: String,
    projects: Arc<HashSet<u64>>,
}

#[derive(Deserialize)]
struct AddRunBody {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default = "default_true")]
    include_all: bool,
    #[serde(default)]
    case_ids: Vec<u64>,
    milestone_id: Option<u64>,
    suite_id: Option<u64>,
}

#[derive(Deserialize)]
struct UpdateRunBody {
    include_all: Option<bool>,
    case_ids: Option<Vec<u64>>,
}

#[derive(Deserialize)]
struct AddResultsBody {
    results: Vec<ResultBody>,
}

#[derive(Deserialize)]
struct ResultBody {
    case_id: u64,
    status_id: u32,
    #[serde(default)]
    comment: String,
    elapsed: Option<String>,
}

fn default_true() -> bool {
    true
}

type Reply = (StatusCode, Json<Value>);

pub fn app(config: MockConfig) -> Router {
    app_with_db(config, Db::default())
}

/// Like `app`, sharing `db` so callers can inspect what was recorded.
pub fn app_with_db(config: MockConfig, db: Db) -> Router {
    let credentials = STANDARD.encode(format!("{}:{}", config.username, config.password));
    let state = AppState {
        db,
        authorization: format!("Basic {credentials}"),
        projects: Arc::new(config.projects),
    };
    Router::new()
        .route("/index.php", post(dispatch))
        .with_state(state)
}

pub async fn run(listener: TcpListener, config: MockConfig, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(config, db)).await
}

async fn dispatch(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == state.authorization);
    if !authorized {
        return error(
            StatusCode::UNAUTHORIZED,
            "Authentication failed: invalid or missing user/password or session cookie.",
        );
    }

    let query = query.unwrap_or_default();
    let Some(method) = query.strip_prefix("/api/v2/") else {
        return error(StatusCode::NOT_FOUND, "Unknown API path");
    };
    let (name, id) = match method.split_once('/') {
        Some((name, id)) => (name, id.parse::<u64>().ok()),
        None => (method, None),
    };
    debug!(method = name, ?id, "mock TestRail request");

    let Some(id) = id else {
        return error(StatusCode::BAD_REQUEST, &format!("Unknown method '{name}'"));
    };
    match name {
        "add_run" => add_run(&state, id, &body).await,
        "update_run" => update_run(&state, id, &body).await,
        "close_run" => close_run(&state, id).await,
        "add_results_for_cases" => add_results_for_cases(&state, id, &body).await,
        "add_attachment_to_result" => add_attachment(&state, id, &headers, &body).await,
        other => error(StatusCode::BAD_REQUEST, &format!("Unknown method '{other}'")),
    }
}

async fn add_run(state: &AppState, project_id: u64, body: &[u8]) -> Reply {
    if !state.projects.contains(&project_id) {
        return error(
            StatusCode::BAD_REQUEST,
            "Field :project_id is not a valid or accessible project.",
        );
    }
    let input: AddRunBody = match serde_json::from_slice(body) {
        Ok(input) => input,
        Err(e) => return error(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")),
    };
    let Some(name) = input.name.filter(|name| !name.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "Field :name is a required field.");
    };

    let mut db = state.db.write().await;
    let run = RunRecord {
        id: db.next_id(),
        project_id,
        name,
        description: input.description,
        milestone_id: input.milestone_id,
        suite_id: input.suite_id,
        include_all: input.include_all,
        case_ids: input.case_ids,
        is_completed: false,
    };
    db.runs.insert(run.id, run.clone());
    ok(json!(run))
}

async fn update_run(state: &AppState, run_id: u64, body: &[u8]) -> Reply {
    let input: UpdateRunBody = match serde_json::from_slice(body) {
        Ok(input) => input,
        Err(e) => return error(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")),
    };
    let mut db = state.db.write().await;
    let Some(run) = db.runs.get_mut(&run_id) else {
        return error(StatusCode::BAD_REQUEST, "Field :run_id is not a valid test run.");
    };
    if run.is_completed {
        return error(StatusCode::BAD_REQUEST, "This test run is already completed.");
    }
    if let Some(include_all) = input.include_all {
        run.include_all = include_all;
    }
    if let Some(case_ids) = input.case_ids {
        run.case_ids = case_ids;
    }
    ok(json!(run))
}

async fn close_run(state: &AppState, run_id: u64) -> Reply {
    let mut db = state.db.write().await;
    let Some(run) = db.runs.get_mut(&run_id) else {
        return error(StatusCode::BAD_REQUEST, "Field :run_id is not a valid test run.");
    };
    if run.is_completed {
        return error(StatusCode::BAD_REQUEST, "This test run is already completed.");
    }
    run.is_completed = true;
    ok(json!(run))
}

async fn add_results_for_cases(state: &AppState, run_id: u64, body: &[u8]) -> Reply {
    let input: AddResultsBody = match serde_json::from_slice(body) {
        Ok(input) => input,
        Err(e) => return error(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")),
    };
    let mut db = state.db.write().await;
    let Some(run) = db.runs.get(&run_id) else {
        return error(StatusCode::BAD_REQUEST, "Field :run_id is not a valid test run.");
    };
    if run.is_completed {
        return error(StatusCode::BAD_REQUEST, "This test run is already completed.");
    }
    for result in &input.results {
        if result.elapsed.as_deref().is_some_and(|elapsed| elapsed.trim() == "0s") {
            return error(
                StatusCode::BAD_REQUEST,
                "Field :results.elapsed is not in a valid time span format.",
            );
        }
        if !run.include_all && !run.case_ids.contains(&result.case_id) {
            return error(
                StatusCode::BAD_REQUEST,
                &format!(
                    "Field :results cannot be added: case C{} is not part of run R{run_id}.",
                    result.case_id
                ),
            );
        }
    }

    let mut added = Vec::with_capacity(input.results.len());
    for result in input.results {
        let record = ResultRecord {
            id: db.next_id(),
            run_id,
            case_id: result.case_id,
            status_id: result.status_id,
            comment: result.comment,
            elapsed: result.elapsed,
        };
        added.push(json!({
            "id": record.id,
            "test_id": record.case_id,
            "status_id": record.status_id,
            "comment": record.comment,
            "elapsed": record.elapsed,
        }));
        db.results.push(record);
    }
    ok(Value::Array(added))
}

async fn add_attachment(state: &AppState, result_id: u64, headers: &HeaderMap, body: &[u8]) -> Reply {
    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));
    if !is_multipart {
        return error(StatusCode::BAD_REQUEST, "Content-Type must be multipart/form-data.");
    }
    let text = String::from_utf8_lossy(body);
    if !text.contains("name=\"attachment\"") {
        return error(StatusCode::BAD_REQUEST, "Field :attachment is a required field.");
    }
    let filename = text
        .split("filename=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or("attachment")
        .to_string();

    let mut db = state.db.write().await;
    if !db.results.iter().any(|result| result.id == result_id) {
        return error(StatusCode::BAD_REQUEST, "Field :result_id is not a valid result.");
    }
    let record = AttachmentRecord {
        id: db.next_id(),
        result_id,
        filename,
        size: body.len(),
    };
    let attachment_id = record.id;
    db.attachments.push(record);
    ok(json!({ "attachment_id": attachment_id }))
}

fn ok(body: Value) -> Reply {
    (StatusCode::OK, Json(body))
}

fn error(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "error": message })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_run_body_defaults_include_all() {
        let input: AddRunBody = serde_json::from_str(r#"{"name":"Run"}"#).unwrap();
        assert!(input.include_all);
        assert!(input.case_ids.is_empty());
        assert!(input.milestone_id.is_none());
    }

    #[test]
    fn update_run_body_all_fields_optional() {
        let input: UpdateRunBody = serde_json::from_str("{}").unwrap();
        assert!(input.include_all.is_none());
        assert!(input.case_ids.is_none());
    }

    #[test]
    fn result_body_requires_case_and_status() {
        assert!(serde_json::from_str::<ResultBody>(r#"{"status_id":1}"#).is_err());
        let input: ResultBody = serde_json::from_str(r#"{"case_id":3,"status_id":1}"#).unwrap();
        assert_eq!(input.comment, "");
        assert!(input.elapsed.is_none());
    }

    #[test]
    fn ids_are_shared_across_records() {
        let mut store = Store::default();
        assert_eq!(store.next_id(), 1);
        assert_eq!(store.next_id(), 2);
    }
}
