//! PostgreSQL storage backed by the `sqlx` pool created in `main.rs`.
//!
//! Tables are created by `schema::create_schema`. Enumerations are stored as
//! TEXT and converted through row structs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::Storage;
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertStatus, Assignment, Contact, DispatchRecord, NewAlert, NewDispatchRecord,
    Severity, Subscription,
};

// ---

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    // ---
    id: i64,
    equipment_id: String,
    sensor_type: String,
    value: f64,
    threshold: f64,
    severity: String,
    timestamp: DateTime<Utc>,
    message: String,
    status: String,
    no_recipients: bool,
}

impl TryFrom<AlertRow> for Alert {
    type Error = Error;

    fn try_from(row: AlertRow) -> Result<Self> {
        Ok(Alert {
            id: row.id,
            equipment_id: row.equipment_id,
            sensor_type: row.sensor_type,
            value: row.value,
            threshold: row.threshold,
            severity: row.severity.parse()?,
            timestamp: row.timestamp,
            message: row.message,
            status: row.status.parse()?,
            no_recipients: row.no_recipients,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    equipment_id: String,
    user_id: i64,
    role: String,
    is_primary: bool,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    user_id: i64,
    equipment_id: Option<String>,
    sensor_type: Option<String>,
    severity: String,
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: i64,
    name: String,
    phone_number: String,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct DispatchRow {
    // ---
    id: i64,
    user_id: i64,
    alert_id: i64,
    phone_number: String,
    message: String,
    status: String,
    sent_at: DateTime<Utc>,
}

impl TryFrom<DispatchRow> for DispatchRecord {
    type Error = Error;

    fn try_from(row: DispatchRow) -> Result<Self> {
        Ok(DispatchRecord {
            id: row.id,
            user_id: row.user_id,
            alert_id: row.alert_id,
            phone_number: row.phone_number,
            message: row.message,
            status: row.status.parse()?,
            sent_at: row.sent_at,
        })
    }
}

const ALERT_COLUMNS: &str = "id, equipment_id, sensor_type, value, threshold, severity, \
                             timestamp, message, status, no_recipients";

const DISPATCH_COLUMNS: &str = "id, user_id, alert_id, phone_number, message, status, sent_at";

#[async_trait]
impl Storage for PgStore {
    // ---
    async fn create_alert(&self, alert: NewAlert) -> Result<Alert> {
        // ---
        let row: AlertRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO alerts (
                equipment_id, sensor_type, value, threshold,
                severity, timestamp, message, status, no_recipients
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'unprocessed', $8)
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(&alert.equipment_id)
        .bind(&alert.sensor_type)
        .bind(alert.value)
        .bind(alert.threshold)
        .bind(alert.severity.as_str())
        .bind(alert.timestamp)
        .bind(&alert.message)
        .bind(alert.no_recipients)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_alert(&self, id: i64) -> Result<Alert> {
        // ---
        let row: Option<AlertRow> =
            sqlx::query_as(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::not_found("alert", id))?.try_into()
    }

    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> Result<Alert> {
        // ---
        let row: Option<AlertRow> = sqlx::query_as(&format!(
            "UPDATE alerts SET status = $2 WHERE id = $1 RETURNING {ALERT_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::not_found("alert", id))?.try_into()
    }

    async fn get_assignments(&self, equipment_id: &str) -> Result<Vec<Assignment>> {
        // ---
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            r#"
            SELECT equipment_id, user_id, role, is_primary, created_at
            FROM equipment_users
            WHERE equipment_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(equipment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Assignment> {
                Ok(Assignment {
                    equipment_id: row.equipment_id,
                    user_id: row.user_id,
                    role: row.role.parse()?,
                    is_primary: row.is_primary,
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    async fn get_subscriptions(
        &self,
        severity: Severity,
        equipment_id: Option<&str>,
        sensor_type: Option<&str>,
    ) -> Result<Vec<Subscription>> {
        // ---
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT user_id, equipment_id, sensor_type, severity
            FROM alert_subscriptions
            WHERE is_active
              AND severity = $1
              AND ($2::TEXT IS NULL OR equipment_id IS NULL OR equipment_id = $2)
              AND ($3::TEXT IS NULL OR sensor_type IS NULL OR sensor_type = $3)
            ORDER BY id ASC
            "#,
        )
        .bind(severity.as_str())
        .bind(equipment_id)
        .bind(sensor_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Subscription> {
                Ok(Subscription {
                    user_id: row.user_id,
                    equipment_id: row.equipment_id,
                    sensor_type: row.sensor_type,
                    severity: row.severity.parse()?,
                })
            })
            .collect()
    }

    async fn get_contact(&self, user_id: i64) -> Result<Option<Contact>> {
        // ---
        let row: Option<ContactRow> =
            sqlx::query_as("SELECT id, name, phone_number, is_active FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|row| Contact {
            user_id: row.id,
            name: row.name,
            phone_number: row.phone_number,
            is_active: row.is_active,
        }))
    }

    async fn find_dispatch_record(
        &self,
        alert_id: i64,
        user_id: i64,
    ) -> Result<Option<DispatchRecord>> {
        // ---
        let row: Option<DispatchRow> = sqlx::query_as(&format!(
            "SELECT {DISPATCH_COLUMNS} FROM sms_history WHERE alert_id = $1 AND user_id = $2"
        ))
        .bind(alert_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DispatchRecord::try_from).transpose()
    }

    async fn create_dispatch_record(&self, record: NewDispatchRecord) -> Result<DispatchRecord> {
        // ---
        let row: DispatchRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO sms_history (user_id, alert_id, phone_number, message, status, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DISPATCH_COLUMNS}
            "#
        ))
        .bind(record.user_id)
        .bind(record.alert_id)
        .bind(&record.phone_number)
        .bind(&record.message)
        .bind(record.status.as_str())
        .bind(record.sent_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn mark_dispatch_delivered(&self, id: i64) -> Result<DispatchRecord> {
        // ---
        let row: Option<DispatchRow> = sqlx::query_as(&format!(
            "UPDATE sms_history SET status = 'delivered' WHERE id = $1 RETURNING {DISPATCH_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::not_found("dispatch record", id))?
            .try_into()
    }

    async fn create_action_link(
        &self,
        token: &str,
        alert_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        // ---
        sqlx::query("INSERT INTO action_links (token, alert_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(alert_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_action_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        // ---
        let alert_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT alert_id FROM action_links
            WHERE token = $1 AND used_at IS NULL AND expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(alert_id)
    }

    async fn consume_action_link(&self, token: &str, now: DateTime<Utc>) -> Result<Option<i64>> {
        // ---
        let alert_id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE action_links
            SET used_at = $2
            WHERE token = $1 AND used_at IS NULL AND expires_at > $2
            RETURNING alert_id
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(alert_id)
    }
}
