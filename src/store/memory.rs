//! In-process storage used by tests and local runs without PostgreSQL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Storage;
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertStatus, Assignment, AssignmentRole, Contact, DispatchRecord, DispatchStatus,
    NewAlert, NewDispatchRecord, Severity, Subscription,
};

// ---

#[derive(Debug)]
struct ActionLink {
    alert_id: i64,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Debug, Default)]
struct Tables {
    alerts: Vec<Alert>,
    assignments: Vec<Assignment>,
    subscriptions: Vec<Subscription>,
    contacts: HashMap<i64, Contact>,
    dispatches: Vec<DispatchRecord>,
    links: HashMap<String, ActionLink>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a user the resolver can reach.
    pub fn add_contact(&self, user_id: i64, name: &str, phone_number: &str) {
        // ---
        self.tables().contacts.insert(
            user_id,
            Contact {
                user_id,
                name: name.to_string(),
                phone_number: phone_number.to_string(),
                is_active: true,
            },
        );
    }

    pub fn deactivate_contact(&self, user_id: i64) {
        if let Some(contact) = self.tables().contacts.get_mut(&user_id) {
            contact.is_active = false;
        }
    }

    /// Assign a user to equipment. A new primary demotes the previous one to
    /// `general`, keeping a single primary per equipment.
    pub fn assign(&self, equipment_id: &str, user_id: i64, role: AssignmentRole) {
        // ---
        let mut tables = self.tables();
        let is_primary = role == AssignmentRole::Primary;

        if is_primary {
            for existing in tables
                .assignments
                .iter_mut()
                .filter(|a| a.equipment_id == equipment_id && a.is_primary)
            {
                existing.is_primary = false;
                existing.role = AssignmentRole::General;
            }
        }

        tables.assignments.push(Assignment {
            equipment_id: equipment_id.to_string(),
            user_id,
            role,
            is_primary,
            created_at: Utc::now(),
        });
    }

    /// Store an assignment row as-is, without the single-primary bookkeeping
    /// of [`MemoryStore::assign`].
    pub fn add_assignment(&self, assignment: Assignment) {
        self.tables().assignments.push(assignment);
    }

    pub fn subscribe(&self, subscription: Subscription) {
        self.tables().subscriptions.push(subscription);
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.tables().alerts.clone()
    }

    pub fn dispatch_records(&self) -> Vec<DispatchRecord> {
        self.tables().dispatches.clone()
    }

    /// Number of action links issued so far, used or not.
    pub fn action_link_count(&self) -> usize {
        self.tables().links.len()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    // ---
    async fn create_alert(&self, alert: NewAlert) -> Result<Alert> {
        // ---
        let mut tables = self.tables();
        let id = tables.alerts.len() as i64 + 1;
        let alert = Alert::from_new(id, alert);
        tables.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn get_alert(&self, id: i64) -> Result<Alert> {
        self.tables()
            .alerts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("alert", id))
    }

    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> Result<Alert> {
        // ---
        let mut tables = self.tables();
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found("alert", id))?;
        alert.status = status;
        Ok(alert.clone())
    }

    async fn get_assignments(&self, equipment_id: &str) -> Result<Vec<Assignment>> {
        Ok(self
            .tables()
            .assignments
            .iter()
            .filter(|a| a.equipment_id == equipment_id)
            .cloned()
            .collect())
    }

    async fn get_subscriptions(
        &self,
        severity: Severity,
        equipment_id: Option<&str>,
        sensor_type: Option<&str>,
    ) -> Result<Vec<Subscription>> {
        // ---
        let narrows = |column: &Option<String>, filter: Option<&str>| match (column, filter) {
            (Some(column), Some(filter)) => column == filter,
            _ => true,
        };

        Ok(self
            .tables()
            .subscriptions
            .iter()
            .filter(|s| s.severity == severity)
            .filter(|s| narrows(&s.equipment_id, equipment_id))
            .filter(|s| narrows(&s.sensor_type, sensor_type))
            .cloned()
            .collect())
    }

    async fn get_contact(&self, user_id: i64) -> Result<Option<Contact>> {
        Ok(self.tables().contacts.get(&user_id).cloned())
    }

    async fn find_dispatch_record(
        &self,
        alert_id: i64,
        user_id: i64,
    ) -> Result<Option<DispatchRecord>> {
        Ok(self
            .tables()
            .dispatches
            .iter()
            .find(|d| d.alert_id == alert_id && d.user_id == user_id)
            .cloned())
    }

    async fn create_dispatch_record(&self, record: NewDispatchRecord) -> Result<DispatchRecord> {
        // ---
        let mut tables = self.tables();
        let id = tables.dispatches.len() as i64 + 1;
        let record = DispatchRecord::from_new(id, record);
        tables.dispatches.push(record.clone());
        Ok(record)
    }

    async fn mark_dispatch_delivered(&self, id: i64) -> Result<DispatchRecord> {
        // ---
        let mut tables = self.tables();
        let record = tables
            .dispatches
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::not_found("dispatch record", id))?;
        record.status = DispatchStatus::Delivered;
        Ok(record.clone())
    }

    async fn create_action_link(
        &self,
        token: &str,
        alert_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        // ---
        self.tables().links.insert(
            token.to_string(),
            ActionLink {
                alert_id,
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn find_action_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        // ---
        let tables = self.tables();
        Ok(tables
            .links
            .get(token)
            .filter(|link| !link.used && link.expires_at > now)
            .map(|link| link.alert_id))
    }

    async fn consume_action_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        // ---
        let mut tables = self.tables();
        match tables.links.get_mut(token) {
            Some(link) if !link.used && link.expires_at > now => {
                link.used = true;
                Ok(Some(link.alert_id))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_single_primary_per_equipment() {
        // ---
        let store = MemoryStore::new();
        store.assign("press_001", 1, AssignmentRole::Primary);
        store.assign("press_001", 2, AssignmentRole::Primary);
        store.assign("press_002", 3, AssignmentRole::Primary);

        let assignments = store.get_assignments("press_001").await.unwrap();
        let primaries: Vec<_> = assignments.iter().filter(|a| a.is_primary).collect();

        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].user_id, 2);
        assert_eq!(assignments[0].role, AssignmentRole::General);
    }

    #[tokio::test]
    async fn test_update_unknown_alert_is_not_found() {
        // ---
        let store = MemoryStore::new();
        let err = store
            .update_alert_status(42, AlertStatus::Done)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { entity: "alert", .. }));
    }

    #[tokio::test]
    async fn test_action_link_is_single_use_and_expires() {
        // ---
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .create_action_link("fresh", 7, now + Duration::hours(24))
            .await
            .unwrap();
        store
            .create_action_link("stale", 8, now - Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(store.find_action_link("fresh", now).await.unwrap(), Some(7));
        assert_eq!(store.find_action_link("stale", now).await.unwrap(), None);
        assert_eq!(store.consume_action_link("fresh", now).await.unwrap(), Some(7));
        assert_eq!(store.find_action_link("fresh", now).await.unwrap(), None);
        assert_eq!(store.consume_action_link("fresh", now).await.unwrap(), None);
        assert_eq!(store.consume_action_link("stale", now).await.unwrap(), None);
        assert_eq!(store.consume_action_link("missing", now).await.unwrap(), None);
    }

    #[test]
    fn test_dispatch_record_lookup_and_delivery() {
        // ---
        let store = MemoryStore::new();

        let record = tokio_test::assert_ok!(tokio_test::block_on(store.create_dispatch_record(
            NewDispatchRecord {
                user_id: 1,
                alert_id: 5,
                phone_number: "010-1111-1111".to_string(),
                message: "press_001 H".to_string(),
                status: DispatchStatus::Sent,
                sent_at: Utc::now(),
            }
        )));
        assert_eq!(record.id, 1);

        let found = tokio_test::block_on(store.find_dispatch_record(5, 1)).unwrap();
        assert_eq!(found.as_ref().map(|r| r.id), Some(1));
        assert!(tokio_test::block_on(store.find_dispatch_record(5, 2))
            .unwrap()
            .is_none());

        let delivered = tokio_test::block_on(store.mark_dispatch_delivered(1)).unwrap();
        assert_eq!(delivered.status, DispatchStatus::Delivered);
        tokio_test::assert_err!(tokio_test::block_on(store.mark_dispatch_delivered(2)));
    }
}
