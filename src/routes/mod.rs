//! HTTP gateway for the alert engine (EMBP).
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! attaches the shared state so `main.rs` never sees individual endpoints.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde_json::json;

use crate::{Engine, Error, IngestHandle};

mod action;
mod alerts;
mod health;
mod readings;
mod sms;

/// State shared by every route.
pub type AppState = (Arc<Engine>, IngestHandle);

// ---

pub fn router(engine: Arc<Engine>, ingest: IngestHandle) -> Router {
    // ---
    Router::new()
        .merge(readings::router())
        .merge(alerts::router())
        .merge(action::router())
        .merge(sms::router())
        .merge(health::router())
        .with_state((engine, ingest))
}

/// Map an engine error onto an HTTP status with a JSON `{ "error": ... }` body.
pub(crate) fn error_response(err: Error) -> Response {
    // ---
    let status = match &err {
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        Error::QueueFull | Error::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        Error::Transport(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected: {}", err);
    }

    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
