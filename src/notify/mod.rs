//! Outbound collaborators used by the dispatch coordinator: the SMS
//! transport and the action-link issuer.

use async_trait::async_trait;

use crate::error::Result;

mod link;
mod sms;

pub use link::StoredLinkIssuer;
pub use sms::{HttpSmsTransport, SmsSettings};

// ---

/// Gateway acknowledgement for one accepted message. Actual handset delivery
/// is confirmed later through the delivery callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryResult {
    pub message_id: Option<String>,
}

#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Fails with `Error::Transport` on a non-2xx response, connection
    /// failure, or timeout.
    async fn send(&self, phone_number: &str, message: &str) -> Result<DeliveryResult>;
}

#[async_trait]
pub trait LinkIssuer: Send + Sync {
    /// One-time URL that moves `alert_id` to `in_progress` when visited.
    async fn create_link(&self, alert_id: i64) -> Result<String>;
}
