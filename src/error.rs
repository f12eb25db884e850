//! Error taxonomy for the alert engine.
//!
//! Library code returns [`Result<T>`]; the binary wraps these in `anyhow` at
//! the edges. Per-recipient transport failures are recorded rather than
//! propagated, so [`Error::Transport`] rarely escapes the dispatch loop.

use thiserror::Error;

use crate::models::AlertStatus;

/// Top-level error type for the `alertflow` library.
#[derive(Debug, Error)]
pub enum Error {
    // ---
    /// Malformed reading rejected at ingest.
    #[error("Invalid reading: {0}")]
    Validation(String),

    /// Notification send failed (non-2xx response, connection error or timeout).
    #[error("Notification transport failed: {0}")]
    Transport(String),

    /// Illegal alert status change.
    #[error("Invalid alert status transition: {from} -> {to}")]
    InvalidStateTransition { from: AlertStatus, to: AlertStatus },

    /// A storage lookup by id found nothing.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Storage collaborator read/write failure.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The ingest queue is at capacity.
    #[error("Ingest queue is full")]
    QueueFull,

    /// The ingest worker has shut down.
    #[error("Ingest queue is closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    // ---
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
