use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use qwatch_model::{MessageScope, Outcome, SessionId, TaskId, TaskInfo, TaskRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ApiError, handler::ApiHandler};

/// Upper bound on a single outcome wait.
const MAX_WAIT_MS: u64 = 60_000;
const DEFAULT_WAIT_MS: u64 = 30_000;

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    /// Create new HTTP API with the given handler.
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST   /api/v1/sessions - Open session
    /// - DELETE /api/v1/sessions/{sid} - Close session, cancelling its tasks
    /// - POST   /api/v1/sessions/{sid}/tasks - Start task
    /// - GET    /api/v1/sessions/{sid}/tasks - List tasks
    /// - GET    /api/v1/sessions/{sid}/tasks/{tid} - Get task
    /// - POST   /api/v1/sessions/{sid}/tasks/{tid}/cancel - Request cancellation
    /// - GET    /api/v1/sessions/{sid}/tasks/{tid}/outcome?timeout_ms= - Wait for outcome
    /// - GET    /api/v1/sessions/{sid}/messages?scope= - Drain session messages
    /// - POST   /api/v1/sessions/{sid}/admin/tasks/{tid}/cancel - Cancel any task (superuser)
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/sessions", post(open_session::<H>))
            .route("/api/v1/sessions/{sid}", axum::routing::delete(close_session::<H>))
            .route(
                "/api/v1/sessions/{sid}/tasks",
                post(start_task::<H>).get(list_tasks::<H>),
            )
            .route("/api/v1/sessions/{sid}/tasks/{tid}", get(get_task::<H>))
            .route("/api/v1/sessions/{sid}/tasks/{tid}/cancel", post(cancel_task::<H>))
            .route("/api/v1/sessions/{sid}/tasks/{tid}/outcome", get(wait_for_outcome::<H>))
            .route("/api/v1/sessions/{sid}/messages", get(drain_messages::<H>))
            .route(
                "/api/v1/sessions/{sid}/admin/tasks/{tid}/cancel",
                post(admin_cancel::<H>),
            )
            .with_state(self.handler)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct OpenSessionRequest {
    #[serde(default)]
    superuser: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenSessionResponse {
    session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StartTaskResponse {
    task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetTaskResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<TaskInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ListTasksResponse {
    tasks: Vec<TaskInfo>,
}

#[derive(Debug, Deserialize)]
struct OutcomeParams {
    /// Max wait in milliseconds (default 30000, max 60000)
    timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OutcomeResponse {
    /// Absent while the task is still running.
    outcome: Option<Outcome>,
}

#[derive(Debug, Deserialize)]
struct MessagesParams {
    /// `errors` or `messages` (default `errors`)
    scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessagesResponse {
    messages: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/sessions
async fn open_session<H>(
    State(handler): State<Arc<H>>,
    body: Option<Json<OpenSessionRequest>>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let session_id = handler.open_session(req.superuser).await?;

    let response = OpenSessionResponse {
        session_id: session_id.to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /api/v1/sessions/:sid
async fn close_session<H>(
    State(handler): State<Arc<H>>,
    Path(sid): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    handler.close_session(&session_id(sid)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:sid/tasks
async fn start_task<H>(
    State(handler): State<Arc<H>>,
    Path(sid): Path<String>,
    Json(req): Json<TaskRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    if req.kind.trim().is_empty() {
        return Err(ApiError::InvalidRequest("kind cannot be empty".into()));
    }
    let sid = session_id(sid)?;
    debug!(session = %sid, kind = %req.kind, "starting task");
    let task_id = handler.start_task(&sid, req).await?;

    let response = StartTaskResponse {
        task_id: task_id.to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/sessions/:sid/tasks
async fn list_tasks<H>(
    State(handler): State<Arc<H>>,
    Path(sid): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let tasks = handler.list_tasks(&session_id(sid)?).await?;
    debug!(count = tasks.len(), "tasks listed");
    Ok(Json(ListTasksResponse { tasks }))
}

/// GET /api/v1/sessions/:sid/tasks/:tid
async fn get_task<H>(
    State(handler): State<Arc<H>>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let (sid, tid) = ids(sid, tid)?;
    let info = handler.get_task(&sid, &tid).await?;
    Ok(Json(GetTaskResponse { info }))
}

/// POST /api/v1/sessions/:sid/tasks/:tid/cancel
async fn cancel_task<H>(
    State(handler): State<Arc<H>>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let (sid, tid) = ids(sid, tid)?;
    handler.cancel_task(&sid, &tid).await?;
    debug!(session = %sid, task = %tid, "task cancellation requested");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sessions/:sid/tasks/:tid/outcome
///
/// Responds 200 with the outcome, or 202 with `outcome: null` if the wait timed out.
async fn wait_for_outcome<H>(
    State(handler): State<Arc<H>>,
    Path((sid, tid)): Path<(String, String)>,
    Query(params): Query<OutcomeParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let (sid, tid) = ids(sid, tid)?;
    let timeout_ms = params.timeout_ms.unwrap_or(DEFAULT_WAIT_MS).min(MAX_WAIT_MS);
    let outcome = handler
        .wait_for_outcome(&sid, &tid, Duration::from_millis(timeout_ms))
        .await?;

    let status = match outcome {
        Some(_) => StatusCode::OK,
        None => StatusCode::ACCEPTED,
    };
    Ok((status, Json(OutcomeResponse { outcome })))
}

/// GET /api/v1/sessions/:sid/messages
async fn drain_messages<H>(
    State(handler): State<Arc<H>>,
    Path(sid): Path<String>,
    Query(params): Query<MessagesParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let scope = match params.scope {
        Some(raw) => raw.parse::<MessageScope>()?,
        None => MessageScope::Errors,
    };
    let messages = handler.drain_messages(&session_id(sid)?, scope).await?;
    Ok(Json(MessagesResponse { messages }))
}

/// POST /api/v1/sessions/:sid/admin/tasks/:tid/cancel
async fn admin_cancel<H>(
    State(handler): State<Arc<H>>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let (sid, tid) = ids(sid, tid)?;
    let owner = handler.admin_cancel(&sid, &tid).await?;
    debug!(session = %sid, task = %tid, owner = %owner, "administrative cancellation requested");

    Ok(StatusCode::NO_CONTENT)
}

fn session_id(raw: String) -> Result<SessionId, ApiError> {
    if raw.trim().is_empty() {
        return Err(ApiError::InvalidRequest("session_id cannot be empty".into()));
    }
    Ok(SessionId::from(raw))
}

fn ids(sid: String, tid: String) -> Result<(SessionId, TaskId), ApiError> {
    if tid.trim().is_empty() {
        return Err(ApiError::InvalidRequest("task_id cannot be empty".into()));
    }
    Ok((session_id(sid)?, TaskId::from(tid)))
}
