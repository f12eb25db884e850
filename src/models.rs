//! Data models for the alert pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---

/// Sensor reading as pushed by the sensor source (simulator or live feed).
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    // ---
    pub equipment_id: String,
    pub sensor_type: String,
    pub value: f64,
    /// ISO-8601; a missing offset is taken as UTC.
    pub timestamp: String,
}

/// Validated reading flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub equipment_id: String,
    pub sensor_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawReading {
    // ---
    /// Validate and convert into a [`Reading`].
    ///
    /// Rejects empty identifiers, non-finite values and unparseable timestamps.
    pub fn validate(self) -> Result<Reading> {
        // ---
        let equipment_id = self.equipment_id.trim().to_string();
        let sensor_type = self.sensor_type.trim().to_string();

        if equipment_id.is_empty() {
            return Err(Error::Validation("equipment_id must not be empty".into()));
        }
        if sensor_type.is_empty() {
            return Err(Error::Validation("sensor_type must not be empty".into()));
        }
        if !self.value.is_finite() {
            return Err(Error::Validation(format!(
                "value must be a finite number, got {}",
                self.value
            )));
        }

        let timestamp = parse_timestamp(&self.timestamp)?;

        Ok(Reading {
            equipment_id,
            sensor_type,
            value: self.value,
            timestamp,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    // ---
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Validation(format!("invalid timestamp '{}': {}", raw, e)))
}

// ---

/// Ordinal alert urgency: `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Short code printed in SMS bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Severity::Error => "HH",
            Severity::Warning => "H",
            Severity::Info => "L",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(Error::Validation(format!("unknown severity '{}'", other))),
        }
    }
}

// ---

/// Operator-facing alert lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Unprocessed,
    InProgress,
    Done,
}

impl AlertStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Unprocessed => "unprocessed",
            AlertStatus::InProgress => "in_progress",
            AlertStatus::Done => "done",
        }
    }

    /// Validate a status change.
    ///
    /// Transitions only move forward. Re-applying the current status is a
    /// no-op, except from `Done`, which accepts nothing.
    pub fn transition(self, to: AlertStatus) -> Result<AlertStatus> {
        // ---
        match (self, to) {
            (AlertStatus::Done, _) => Err(Error::InvalidStateTransition { from: self, to }),
            (from, to) if to >= from => Ok(to),
            (from, to) => Err(Error::InvalidStateTransition { from, to }),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unprocessed" => Ok(AlertStatus::Unprocessed),
            "in_progress" => Ok(AlertStatus::InProgress),
            "done" => Ok(AlertStatus::Done),
            other => Err(Error::Validation(format!("unknown alert status '{}'", other))),
        }
    }
}

// ---

/// Alert content before storage assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    // ---
    pub equipment_id: String,
    pub sensor_type: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Set when recipient resolution came back empty.
    pub no_recipients: bool,
}

/// Persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    // ---
    pub id: i64,
    pub equipment_id: String,
    pub sensor_type: String,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub status: AlertStatus,
    pub no_recipients: bool,
}

impl Alert {
    // ---
    pub fn from_new(id: i64, new: NewAlert) -> Self {
        Alert {
            id,
            equipment_id: new.equipment_id,
            sensor_type: new.sensor_type,
            value: new.value,
            threshold: new.threshold,
            severity: new.severity,
            timestamp: new.timestamp,
            message: new.message,
            status: AlertStatus::Unprocessed,
            no_recipients: new.no_recipients,
        }
    }
}

// ---

/// Cooldown gate key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CooldownKey {
    // ---
    pub equipment_id: String,
    pub sensor_type: String,
    pub severity: Severity,
}

impl CooldownKey {
    pub fn new(equipment_id: &str, sensor_type: &str, severity: Severity) -> Self {
        CooldownKey {
            equipment_id: equipment_id.to_string(),
            sensor_type: sensor_type.to_string(),
            severity,
        }
    }
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.equipment_id, self.sensor_type, self.severity
        )
    }
}

/// Last allowed alert for a cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CooldownEntry {
    pub last_fired_at: DateTime<Utc>,
    pub last_value: f64,
}

// ---

/// Role of a user assigned to a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentRole {
    Primary,
    General,
    Manager,
    Observer,
}

impl AssignmentRole {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentRole::Primary => "primary",
            AssignmentRole::General => "general",
            AssignmentRole::Manager => "manager",
            AssignmentRole::Observer => "observer",
        }
    }

    /// Label shown to the recipient in the SMS body.
    pub fn label(&self) -> &'static str {
        match self {
            AssignmentRole::Primary => PRIMARY_LABEL,
            AssignmentRole::General => "일반",
            AssignmentRole::Manager => "관리자",
            AssignmentRole::Observer => "감시자",
        }
    }
}

impl FromStr for AssignmentRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(AssignmentRole::Primary),
            "general" => Ok(AssignmentRole::General),
            "manager" => Ok(AssignmentRole::Manager),
            "observer" => Ok(AssignmentRole::Observer),
            other => Err(Error::Validation(format!("unknown assignment role '{}'", other))),
        }
    }
}

/// Label for the primary assignee ("assignee").
pub const PRIMARY_LABEL: &str = "담당자";

/// Label for users reached through a subscription.
pub const SUBSCRIBER_LABEL: &str = "구독자";

/// Equipment-to-user assignment. At most one `is_primary` row per equipment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    // ---
    pub equipment_id: String,
    pub user_id: i64,
    pub role: AssignmentRole,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Alert subscription; `None` fields match anything.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    // ---
    pub user_id: i64,
    pub equipment_id: Option<String>,
    pub sensor_type: Option<String>,
    pub severity: Severity,
}

impl Subscription {
    // ---
    pub fn matches(&self, equipment_id: &str, sensor_type: &str, severity: Severity) -> bool {
        self.severity == severity
            && self.equipment_id.as_deref().map_or(true, |e| e == equipment_id)
            && self.sensor_type.as_deref().map_or(true, |s| s == sensor_type)
    }
}

/// How to reach a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    // ---
    pub user_id: i64,
    pub name: String,
    pub phone_number: String,
    pub is_active: bool,
}

/// Resolved notification target.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    // ---
    pub user_id: i64,
    pub phone_number: String,
    pub role_label: &'static str,
}

// ---

/// Outcome recorded for one (alert, recipient) attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Failed,
    Delivered,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Sent => "sent",
            DispatchStatus::Failed => "failed",
            DispatchStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for DispatchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sent" => Ok(DispatchStatus::Sent),
            "failed" => Ok(DispatchStatus::Failed),
            "delivered" => Ok(DispatchStatus::Delivered),
            other => Err(Error::Validation(format!("unknown dispatch status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDispatchRecord {
    // ---
    pub user_id: i64,
    pub alert_id: i64,
    pub phone_number: String,
    pub message: String,
    pub status: DispatchStatus,
    pub sent_at: DateTime<Utc>,
}

/// SMS history row. Append-only apart from the delivery status update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRecord {
    // ---
    pub id: i64,
    pub user_id: i64,
    pub alert_id: i64,
    pub phone_number: String,
    pub message: String,
    pub status: DispatchStatus,
    pub sent_at: DateTime<Utc>,
}

impl DispatchRecord {
    pub fn from_new(id: i64, new: NewDispatchRecord) -> Self {
        DispatchRecord {
            id,
            user_id: new.user_id,
            alert_id: new.alert_id,
            phone_number: new.phone_number,
            message: new.message,
            status: new.status,
            sent_at: new.sent_at,
        }
    }
}
