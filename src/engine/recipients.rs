//! Recipient resolution: who gets an SMS for an alert, and in what order.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{
    Assignment, AssignmentRole, Recipient, Severity, PRIMARY_LABEL, SUBSCRIBER_LABEL,
};
use crate::store::Storage;

// ---

pub struct RecipientResolver {
    storage: Arc<dyn Storage>,
}

impl RecipientResolver {
    // ---
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        RecipientResolver { storage }
    }

    /// Ordered, de-duplicated recipients for an alert:
    ///
    /// 1. the primary assignee,
    /// 2. the other assignees in creation order,
    /// 3. matching subscribers in subscription order.
    ///
    /// A user who appears more than once keeps their first position and
    /// label. Users without an active contact are skipped.
    pub async fn resolve(
        &self,
        equipment_id: &str,
        sensor_type: &str,
        severity: Severity,
    ) -> Result<Vec<Recipient>> {
        // ---
        let assignments = self.storage.get_assignments(equipment_id).await?;
        let subscriptions = self
            .storage
            .get_subscriptions(severity, Some(equipment_id), Some(sensor_type))
            .await?;

        let primary = assignments.iter().filter(|a| a.is_primary);
        let others = assignments.iter().filter(|a| !a.is_primary);

        let candidates = primary
            .chain(others)
            .map(|a| (a.user_id, assignment_label(a)))
            .chain(
                subscriptions
                    .iter()
                    .filter(|s| s.matches(equipment_id, sensor_type, severity))
                    .map(|s| (s.user_id, SUBSCRIBER_LABEL)),
            );

        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        for (user_id, role_label) in candidates {
            if !seen.insert(user_id) {
                continue;
            }

            match self.storage.get_contact(user_id).await? {
                Some(contact) if contact.is_active => recipients.push(Recipient {
                    user_id,
                    phone_number: contact.phone_number,
                    role_label,
                }),
                Some(_) => debug!("Skipping inactive user {} for {}", user_id, equipment_id),
                None => warn!(
                    "User {} is assigned or subscribed to {} but has no contact record",
                    user_id, equipment_id
                ),
            }
        }

        debug!(
            "Resolved {} recipient(s) for {}/{} {} ({} assignments, {} subscriptions)",
            recipients.len(),
            equipment_id,
            sensor_type,
            severity,
            assignments.len(),
            subscriptions.len()
        );

        Ok(recipients)
    }
}

/// The `is_primary` flag decides the primary label, whatever the role column
/// says; a `primary` role without the flag reads as a general assignee.
fn assignment_label(assignment: &Assignment) -> &'static str {
    // ---
    match (assignment.is_primary, assignment.role) {
        (true, _) => PRIMARY_LABEL,
        (false, AssignmentRole::Primary) => AssignmentRole::General.label(),
        (false, role) => role.label(),
    }
}
