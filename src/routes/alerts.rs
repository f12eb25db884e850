use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{error_response, AppState};
use crate::models::{AlertStatus, CooldownKey, Severity};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/alerts/{id}/status", put(update_status))
        .route(
            "/cooldowns/{equipment_id}/{sensor_type}/{severity}",
            get(cooldown_state),
        )
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: AlertStatus,
}

/// Handle `PUT /alerts/{id}/status` with body `{"status": "in_progress"}`.
///
/// `404` for an unknown alert, `409` for a backward move or any change to a
/// `done` alert.
async fn update_status(
    State((engine, _)): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> impl IntoResponse {
    // ---
    info!("PUT /alerts/{}/status -> {}", id, update.status);

    match engine.transition_alert(id, update.status).await {
        Ok(alert) => (StatusCode::OK, Json(alert)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Handle `GET /cooldowns/{equipment_id}/{sensor_type}/{severity}`.
async fn cooldown_state(
    State((engine, _)): State<AppState>,
    Path((equipment_id, sensor_type, severity)): Path<(String, String, String)>,
) -> impl IntoResponse {
    // ---
    let severity: Severity = match severity.parse() {
        Ok(severity) => severity,
        Err(e) => return error_response(e),
    };

    let key = CooldownKey::new(&equipment_id, &sensor_type, severity);
    match engine.get_cooldown_state(&key) {
        Some(entry) => (StatusCode::OK, Json(json!({ "key": key, "entry": entry }))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no cooldown state for {}", key) })),
        )
            .into_response(),
    }
}
