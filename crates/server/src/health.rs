use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use flightdesk_agent::AgentRuntime;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub search: HealthCheck,
    pub extractor: HealthCheck,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let runtime = &state.runtime;
    let coordinator = runtime.coordinator();

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "flightdesk-server runtime initialized".to_string(),
        },
        search: HealthCheck {
            status: "ready",
            detail: format!(
                "provider `{}`, {} search(es) in flight",
                coordinator.provider_name(),
                coordinator.in_flight()
            ),
        },
        extractor: HealthCheck {
            status: "ready",
            detail: format!("extractor `{}`", runtime.extractor_name()),
        },
        active_sessions: runtime.sessions().len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
