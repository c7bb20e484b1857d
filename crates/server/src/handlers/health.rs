//! Readiness probe.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health - `ready` once the backend is connected, `starting` before.
pub async fn health_check(State(state): State<AppState>) -> Response {
    if state.engine.is_ready() {
        (StatusCode::OK, Json(HealthResponse { status: "ready" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            [(RETRY_AFTER, "1")],
            Json(HealthResponse { status: "starting" }),
        )
            .into_response()
    }
}
