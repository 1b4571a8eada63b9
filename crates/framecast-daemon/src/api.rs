//! REST API handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::session::Readiness;
use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Readiness poll response
#[derive(Serialize)]
pub struct ReadyResponse {
    ready: bool,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Liveness probe
pub async fn hello() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Server is alive!" }))
}

/// Whether the frame source has finished building; never waits on it
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.session.readiness();
    Json(ReadyResponse {
        ready: readiness.is_ready(),
        state: readiness.name(),
        error: match readiness {
            Readiness::Failed { error } => Some(error),
            _ => None,
        },
    })
}

/// Session status
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.session.status().await)
}

/// Current camera pose
pub async fn camera(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.session.readiness() == Readiness::Terminated {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new("Session has been torn down")),
        )
            .into_response();
    }
    Json(state.session.pose().await).into_response()
}
