//! HTTP surface for jiralink
//!
//! # Routes
//!
//! - `GET /health` - Liveness check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /oauth/authorize` - Provider URL for the caller (`{"url": "..."}`)
//! - `GET /oauth/callback?code&state` - Provider callback; redirects to the app
//! - `POST /api/jira` - Proxy action surface (body: `{"action": "...", ...params}`)
//! - `GET /api/connection` - The caller's connection
//! - `DELETE /api/connection` - Disconnect
//! - `GET /api/projects` - Tracked projects
//! - `POST /api/projects` - Track a project
//! - `DELETE /api/projects/{id}` - Stop tracking a project
//! - `GET /api/mappings` - Task mappings (optional `?projectId=`)
//! - `POST /api/import` - Import issues of a tracked project
//! - `POST /api/sync` - Pull remote status changes
//! - `POST /api/push` - Push a local status change
//!
//! Every `/api` and `/oauth/authorize` route needs `Authorization: Bearer <token>`
//! issued by [`SessionStore::issue`](crate::storage::SessionStore::issue).

use crate::jira::{JiraAction, RemoteIssue};
use crate::session::{AppContext, JiraSession};
use crate::JiraLinkError;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tasks::{TaskId, TaskStatus, TaskStore};
use tokio::net::TcpListener;

/// Shared server state
struct AppState {
    ctx: AppContext,
    tasks: Option<Arc<dyn TaskStore>>,
}

/// HTTP server exposing the OAuth flow and the sync operations
pub struct JiraLinkServer {
    state: Arc<AppState>,
}

impl JiraLinkServer {
    /// Create a server; the task store comes from the `tasks:` config section
    pub fn new(ctx: AppContext) -> Self {
        let tasks = match ctx.task_store() {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "No task store configured, import and sync are disabled");
                None
            }
        };
        Self {
            state: Arc::new(AppState { ctx, tasks }),
        }
    }

    /// Create a server with an explicit task store
    pub fn with_task_store(ctx: AppContext, tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            state: Arc::new(AppState {
                ctx,
                tasks: Some(tasks),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/oauth/authorize", get(authorize))
            .route("/oauth/callback", get(callback))
            .route("/api/jira", post(proxy))
            .route(
                "/api/connection",
                get(get_connection).delete(disconnect),
            )
            .route("/api/projects", get(list_projects).post(add_project))
            .route("/api/projects/{id}", delete(remove_project))
            .route("/api/mappings", get(list_mappings))
            .route("/api/import", post(import))
            .route("/api/sync", post(sync))
            .route("/api/push", post(push))
            .with_state(self.state.clone())
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> crate::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = addr, "jiralink server listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Set when the user has to reconnect Jira
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reconnect: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            reconnect: false,
        }),
    )
}

fn status_for(e: &JiraLinkError) -> StatusCode {
    match e {
        JiraLinkError::NotFound(_) | JiraLinkError::ConnectionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        JiraLinkError::DuplicateMapping { .. } | JiraLinkError::NoTransition { .. } => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<JiraLinkError> for ErrorResponse {
    fn from(e: JiraLinkError) -> Self {
        Self {
            reconnect: e.is_auth_failure(),
            error: e.to_string(),
        }
    }
}

fn from_error(e: JiraLinkError) -> ApiError {
    let status = status_for(&e);
    if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
    }
    (status, Json(e.into()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddProjectRequest {
    pub project_key: String,
    pub remote_project_id: Option<String>,
    pub project_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingsQuery {
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub project_id: String,
    /// Issues to import; all open assigned issues of the project when absent
    #[serde(default)]
    pub issues: Option<Vec<RemoteIssue>>,
    /// Remote issue id to the day its task lands on
    #[serde(default)]
    pub target_dates: HashMap<String, NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub task_id: String,
    pub status: TaskStatus,
}

// ============================================================================
// Helpers
// ============================================================================

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Session of the user behind the bearer credential
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<JiraSession, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Missing bearer token"))?;
    let user_id = state
        .ctx
        .sessions()
        .resolve(token)
        .map_err(from_error)?
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Invalid bearer token"))?;
    Ok(state.ctx.session(user_id))
}

fn task_store(state: &AppState) -> Result<Arc<dyn TaskStore>, ApiError> {
    state.tasks.clone().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "No task store configured (tasks.base_url)",
        )
    })
}

fn app_redirect(base: &str, param: &str, value: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}",
        base,
        separator,
        param,
        urlencoding::encode(value)
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let body = crate::metrics::encode_metrics().map_err(from_error)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let url = state
        .ctx
        .begin_authorization(session.user_id())
        .map_err(from_error)?;
    Ok(Json(serde_json::json!({ "url": url })))
}

async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let base = &state.ctx.config().server.app_redirect_url;
    match state
        .ctx
        .complete_authorization(params.code.as_deref(), params.state.as_deref())
        .await
    {
        Ok(_) => Redirect::to(&app_redirect(base, "jira", "connected")),
        Err(e) => {
            tracing::warn!(error = %e, flag = e.as_flag(), "OAuth callback failed");
            Redirect::to(&app_redirect(base, "jira_error", e.as_flag()))
        }
    }
}

async fn proxy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    if session.connection().map_err(from_error)?.is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, "No Jira connection"));
    }

    let action: JiraAction = serde_json::from_slice(&body).map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, format!("Unknown or malformed action: {}", e))
    })?;

    match session.gateway().call(&action).await {
        Ok(value) => Ok(Json(value)),
        Err(JiraLinkError::ConnectionNotFound(_)) => {
            Err(api_error(StatusCode::NOT_FOUND, "No Jira connection"))
        }
        Err(e) => {
            tracing::warn!(action = action.name(), error = %e, "Jira proxy call failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(e.into())))
        }
    }
}

async fn get_connection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let connection = session
        .connection()
        .map_err(from_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No Jira connection"))?;
    Ok(Json(connection))
}

async fn disconnect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let removed = session.disconnect().map_err(from_error)?;
    Ok(Json(serde_json::json!({ "disconnected": removed })))
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let projects = session.projects().list().map_err(from_error)?;
    Ok(Json(projects))
}

async fn add_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AddProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let project = match (req.remote_project_id, req.project_name) {
        (Some(remote_id), Some(name)) => session.track_project(&remote_id, &req.project_key, &name),
        _ => session.track_project_by_key(&req.project_key).await,
    }
    .map_err(from_error)?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn remove_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    if session.projects().remove(&id).map_err(from_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(StatusCode::NOT_FOUND, format!("Project not found: {}", id)))
    }
}

async fn list_mappings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MappingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let ledger = session.ledger();
    let mappings = match query.project_id {
        Some(project_id) => ledger.list_by_project(&project_id),
        None => ledger.list_for_user(),
    }
    .map_err(from_error)?;
    Ok(Json(mappings))
}

async fn import(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let tasks = task_store(&state)?;
    let project = session.projects().require(&req.project_id).map_err(from_error)?;

    let issues = match req.issues {
        Some(issues) => issues,
        None => session
            .remote_issues(&project.project_key)
            .await
            .map_err(from_error)?,
    };

    let result = session
        .importer(tasks)
        .import_issues(&issues, &req.target_dates, &project.id)
        .await
        .map_err(from_error)?;
    Ok(Json(result))
}

async fn sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let tasks = task_store(&state)?;
    let req: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid sync request: {}", e)))?
    };

    let engine = session.status_sync(tasks);
    let report = match req.project_id {
        Some(project_id) => engine.pull_project(&project_id).await,
        None => engine.pull_all().await,
    }
    .map_err(from_error)?;
    Ok(Json(report))
}

async fn push(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PushRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = authenticate(&state, &headers)?;
    let tasks = task_store(&state)?;
    let outcome = session
        .status_sync(tasks)
        .push(&TaskId::new(req.task_id), req.status)
        .await
        .map_err(from_error)?;
    Ok(Json(outcome))
}
