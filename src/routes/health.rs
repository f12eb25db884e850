// src/routes/health.rs
//! Liveness check for the alert engine.
//!
//! Reports whether the ingest worker still accepts readings and how many are
//! waiting. The database and SMS gateway are not contacted.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ingest_backlog: usize,
}

/// Handle `GET /health`: `200` while ingest is open, `503` after shutdown
/// has closed the queue.
async fn health(State((_, ingest)): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // ---
    let (code, status) = if ingest.is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "stopping")
    } else {
        (StatusCode::OK, "ok")
    };

    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        ingest_backlog: ingest.backlog(),
    };
    (code, Json(body))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
