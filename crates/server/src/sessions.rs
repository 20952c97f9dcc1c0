//! Conversation endpoints.
//!
//! - `POST   /v1/sessions/{id}/messages` runs one dialogue turn
//! - `GET    /v1/sessions/{id}` returns the session snapshot
//! - `PUT    /v1/sessions/{id}` restores a session from a snapshot
//! - `DELETE /v1/sessions/{id}` ends the session

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use flightdesk_agent::AgentRuntime;
use flightdesk_core::domain::session::{SessionId, SessionSnapshot};
use flightdesk_core::errors::InterfaceError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub session_id: String,
    pub reply: String,
    pub ended: bool,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/v1/sessions/{id}/messages", post(post_message))
        .route(
            "/v1/sessions/{id}",
            get(get_session).put(restore_session).delete(delete_session),
        )
        .with_state(SessionState { runtime })
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = status_for(&error);
    warn!(
        event_name = "http.request.rejected",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "request rejected"
    );
    (
        status,
        Json(ApiError {
            error: error.user_message().to_string(),
            detail: error.to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

fn parse_session_id(raw: &str, correlation_id: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|message| {
        reject(InterfaceError::BadRequest { message, correlation_id: correlation_id.to_string() })
    })
}

async fn post_message(
    Path(id): Path<String>,
    State(state): State<SessionState>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session_id(&id, &correlation_id)?;

    let turn = state
        .runtime
        .handle_user_message(&session_id, &request.text)
        .await
        .map_err(|error| reject(error.into_interface(correlation_id.as_str())))?;

    Ok(Json(MessageResponse {
        session_id: turn.session_id.to_string(),
        reply: turn.reply,
        ended: turn.ended,
        snapshot: turn.snapshot,
    }))
}

async fn get_session(
    Path(id): Path<String>,
    State(state): State<SessionState>,
) -> ApiResult<Json<SessionSnapshot>> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session_id(&id, &correlation_id)?;

    let snapshot = state
        .runtime
        .snapshot(&session_id)
        .await
        .map_err(|error| reject(error.into_interface(correlation_id.as_str())))?;
    Ok(Json(snapshot))
}

async fn restore_session(
    Path(id): Path<String>,
    State(state): State<SessionState>,
    Json(snapshot): Json<SessionSnapshot>,
) -> ApiResult<Json<SessionSnapshot>> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session_id(&id, &correlation_id)?;
    if snapshot.session_id != session_id {
        return Err(reject(InterfaceError::BadRequest {
            message: format!(
                "snapshot belongs to session `{}`, not `{session_id}`",
                snapshot.session_id
            ),
            correlation_id,
        }));
    }

    let restored = state.runtime.restore(snapshot).await;
    info!(
        event_name = "session.restored",
        correlation_id = %correlation_id,
        session_id = %session_id,
        dispatch_state = ?restored.dispatch_state,
        "session restored from snapshot"
    );
    Ok(Json(restored))
}

async fn delete_session(
    Path(id): Path<String>,
    State(state): State<SessionState>,
) -> ApiResult<StatusCode> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = parse_session_id(&id, &correlation_id)?;

    state
        .runtime
        .end_session(&session_id)
        .await
        .map_err(|error| reject(error.into_interface(correlation_id.as_str())))?;
    Ok(StatusCode::NO_CONTENT)
}
