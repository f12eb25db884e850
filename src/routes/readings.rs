use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde_json::json;
use tracing::debug;

use super::{error_response, AppState};
use crate::models::RawReading;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/readings", post(handler))
}

/// Handle `POST /readings`.
///
/// Validates and queues the reading, answering `202 Accepted` without
/// waiting for the pipeline. Malformed readings get `422`, a saturated
/// queue `503`.
async fn handler(
    State((_engine, ingest)): State<AppState>,
    Json(raw): Json<RawReading>,
) -> impl IntoResponse {
    // ---
    debug!(
        "POST /readings - {}/{} = {}",
        raw.equipment_id, raw.sensor_type, raw.value
    );

    match ingest.ingest_reading(raw) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response(),
        Err(e) => error_response(e),
    }
}
