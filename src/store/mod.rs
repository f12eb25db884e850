//! Storage collaborator.
//!
//! The engine owns `Alert`, `DispatchRecord` and action-link rows and only
//! reads assignments, subscriptions and contacts. Retry policy for failed
//! writes is left to the implementation or the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Alert, AlertStatus, Assignment, Contact, DispatchRecord, NewAlert, NewDispatchRecord,
    Severity, Subscription,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

#[async_trait]
pub trait Storage: Send + Sync {
    // ---
    async fn create_alert(&self, alert: NewAlert) -> Result<Alert>;

    /// Fails with `NotFound` for an unknown id.
    async fn get_alert(&self, id: i64) -> Result<Alert>;

    /// Overwrites the status. Transition rules are checked by the caller.
    /// Fails with `NotFound` for an unknown id.
    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> Result<Alert>;

    /// Assignments for one equipment unit in creation order.
    async fn get_assignments(&self, equipment_id: &str) -> Result<Vec<Assignment>>;

    /// Active subscriptions for `severity`. `Some` filters narrow by
    /// null-or-equal on that column; `None` leaves the column unconstrained.
    async fn get_subscriptions(
        &self,
        severity: Severity,
        equipment_id: Option<&str>,
        sensor_type: Option<&str>,
    ) -> Result<Vec<Subscription>>;

    async fn get_contact(&self, user_id: i64) -> Result<Option<Contact>>;

    async fn find_dispatch_record(
        &self,
        alert_id: i64,
        user_id: i64,
    ) -> Result<Option<DispatchRecord>>;

    async fn create_dispatch_record(&self, record: NewDispatchRecord) -> Result<DispatchRecord>;

    /// Delivery callback. Fails with `NotFound` for an unknown id.
    async fn mark_dispatch_delivered(&self, id: i64) -> Result<DispatchRecord>;

    async fn create_action_link(
        &self,
        token: &str,
        alert_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Alert id of a link that is still usable, without using it up.
    async fn find_action_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>>;

    /// Mark a link used and return its alert id. `None` when the token is
    /// unknown, expired, or already used.
    async fn consume_action_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>>;
}
