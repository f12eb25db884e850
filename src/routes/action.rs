//! One-time action links sent in alert SMS bodies.
//!
//! Visiting `/action/{token}` takes the alert into `in_progress`. A token
//! works once; unknown, expired or used tokens get `410 Gone`. The token is
//! only used up after the status change succeeds, so a failed update leaves
//! the link valid for another try.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use super::{error_response, AppState};
use crate::models::AlertStatus;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/action/{token}", get(handler))
}

fn gone() -> Response {
    (
        StatusCode::GONE,
        Json(json!({ "error": "link is invalid, expired or already used" })),
    )
        .into_response()
}

async fn handler(
    State((engine, _)): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    // ---
    let storage = engine.storage();

    let alert_id = match storage.find_action_link(&token, Utc::now()).await {
        Ok(Some(alert_id)) => alert_id,
        Ok(None) => return gone(),
        Err(e) => return error_response(e),
    };

    let alert = match engine.transition_alert(alert_id, AlertStatus::InProgress).await {
        Ok(alert) => alert,
        Err(e) => return error_response(e),
    };

    match storage.consume_action_link(&token, Utc::now()).await {
        Ok(Some(_)) => info!("Action link used for alert {}", alert_id),
        // A concurrent visit used it first; the alert is already in progress.
        Ok(None) => debug!("Action link for alert {} was used concurrently", alert_id),
        Err(e) => return error_response(e),
    }

    (StatusCode::OK, Json(alert)).into_response()
}
