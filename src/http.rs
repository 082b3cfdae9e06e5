//! HTTP surface: task submission and result retrieval.
//!
//! Routes:
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `POST` | `/queue` | 202 `{"status": "queued", "task_id": ...}` |
//! | `GET` | `/result/{id}` | 200 task record, or 404 |
//! | `DELETE` | `/result/{id}` | 204 always (idempotent) |
//! | `GET` | `/result/{id}/exists` | 200 `{"exists": true\|false}` |
//!
//! Every endpoint requires a bearer API key (`Authorization: Bearer
//! <key>`); a missing or mismatched key yields 401. Backend unavailability
//! yields 503 with a JSON error body; the retrieval endpoints never block
//! waiting for a result -- polling is the client's responsibility.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::{Task, TaskSpec, TaskStatus};
use crate::error::{BackendError, SubmitError};
use crate::store::ResultStore;
use crate::submit::Submitter;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct ApiState {
    /// Submission handle pushing onto the deployment's queue.
    pub submitter: Submitter,
    /// Result store serving the retrieval endpoints.
    pub store: Arc<dyn ResultStore>,
    /// Bearer key required on every request.
    pub api_key: String,
}

/// Builds the service router with bearer-key authentication applied to
/// every route.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/queue", post(enqueue_task))
        .route("/result/{id}", get(get_result).delete(delete_result))
        .route("/result/{id}/exists", get(result_exists))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .with_state(state)
}

// ---- Authentication ----

async fn require_api_key(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;
    if token != state.api_key {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

// ---- Error mapping ----

/// API-boundary error, rendered as a JSON body with the matching status.
#[derive(Debug)]
enum ApiError {
    /// No live result record for the requested id.
    NotFound,
    /// The request was structurally valid JSON but semantically rejected.
    InvalidRequest(String),
    /// A backend transport is down.
    Unavailable(String),
    /// A record could not be encoded or decoded.
    Internal(String),
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { message, .. } => Self::Unavailable(message),
            BackendError::Encoding { message } => Self::Internal(message),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::EmptyKind => Self::InvalidRequest(err.to_string()),
            SubmitError::Backend(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "result not found or expired".to_string()),
            Self::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unavailable(message) => {
                tracing::error!(error = %message, "backend unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            Self::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ---- Response bodies ----

/// Wire form of a result record.
///
/// Mirrors the task record minus the payload -- clients supplied the
/// payload, so it is not echoed back.
#[derive(Debug, Serialize)]
struct ResultBody {
    id: String,
    kind: String,
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    submitted_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<i64>,
}

impl From<Task> for ResultBody {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            kind: task.kind,
            status: task.status,
            result: task.result,
            error: task.error,
            submitted_at: task.submitted_at,
            started_at: task.started_at,
            finished_at: task.finished_at,
        }
    }
}

// ---- Handlers ----

async fn enqueue_task(
    State(state): State<ApiState>,
    Json(spec): Json<TaskSpec>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let task_id = state.submitter.submit(spec).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "task_id": task_id })),
    ))
}

async fn get_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ResultBody>, ApiError> {
    match state.store.get(&id).await? {
        Some(task) => Ok(Json(task.into())),
        None => Err(ApiError::NotFound),
    }
}

async fn delete_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn result_exists(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let exists = state.store.exists(&id).await?;
    Ok(Json(json!({ "exists": exists })))
}
