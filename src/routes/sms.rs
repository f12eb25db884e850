use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::{error_response, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/sms/delivery", post(delivery_callback))
}

#[derive(Debug, Deserialize)]
struct DeliveryReport {
    record_id: i64,
}

/// Handle `POST /sms/delivery`, the gateway's delivery confirmation.
async fn delivery_callback(
    State((engine, _)): State<AppState>,
    Json(report): Json<DeliveryReport>,
) -> impl IntoResponse {
    // ---
    match engine.storage().mark_dispatch_delivered(report.record_id).await {
        Ok(record) => {
            info!(
                "SMS {} for alert {} delivered to {}",
                record.id, record.alert_id, record.phone_number
            );
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(e) => error_response(e),
    }
}
