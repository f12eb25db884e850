//! Dispatch coordinator: one SMS per (alert, recipient), recorded in the SMS
//! history.
//!
//! The unit of atomicity is one (alert, recipient) pair. An existing record
//! for the pair means the attempt already happened (sent or failed) and is
//! never repeated, which makes replays after a crash at-most-once per pair.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{Alert, DispatchStatus, NewDispatchRecord, Recipient};
use crate::notify::{LinkIssuer, SmsTransport};
use crate::store::Storage;

// ---

/// Per-alert dispatch tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Recipients with a record from an earlier attempt.
    pub already_recorded: usize,
    /// Recipients not attempted because the operation was cancelled.
    pub cancelled: usize,
}

pub struct Dispatcher {
    storage: Arc<dyn Storage>,
    transport: Arc<dyn SmsTransport>,
    links: Arc<dyn LinkIssuer>,
}

impl Dispatcher {
    // ---
    pub fn new(
        storage: Arc<dyn Storage>,
        transport: Arc<dyn SmsTransport>,
        links: Arc<dyn LinkIssuer>,
    ) -> Self {
        Dispatcher {
            storage,
            transport,
            links,
        }
    }

    /// Notify `recipients` about `alert`, in order.
    ///
    /// Transport failures are recorded as `failed` and do not stop the loop.
    /// Storage failures are propagated. Once `cancel` fires, the remaining
    /// recipients are counted as cancelled; records already written stay.
    pub async fn dispatch(
        &self,
        alert: &Alert,
        recipients: &[Recipient],
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        // ---
        let mut report = DispatchReport::default();
        // Issued at the first recipient that still needs a message.
        let mut link: Option<Option<String>> = None;

        for (idx, recipient) in recipients.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = recipients.len() - idx;
                warn!(
                    "Dispatch for alert {} cancelled, {} recipient(s) skipped",
                    alert.id, report.cancelled
                );
                break;
            }

            if self
                .storage
                .find_dispatch_record(alert.id, recipient.user_id)
                .await?
                .is_some()
            {
                info!(
                    "Alert {} already dispatched to user {}, skipping",
                    alert.id, recipient.user_id
                );
                report.already_recorded += 1;
                continue;
            }

            if link.is_none() {
                link = Some(self.action_link(alert).await);
            }
            let url = link.as_ref().and_then(|l| l.as_deref());

            let message = format_message(alert, recipient, url);
            let status = match self.transport.send(&recipient.phone_number, &message).await {
                Ok(delivery) => {
                    info!(
                        "SMS sent to {} ({}) for alert {} [message_id={:?}]",
                        recipient.phone_number, recipient.role_label, alert.id, delivery.message_id
                    );
                    report.sent += 1;
                    DispatchStatus::Sent
                }
                Err(e) => {
                    error!(
                        "SMS to {} for alert {} failed: {}",
                        recipient.phone_number, alert.id, e
                    );
                    report.failed += 1;
                    DispatchStatus::Failed
                }
            };

            self.storage
                .create_dispatch_record(NewDispatchRecord {
                    user_id: recipient.user_id,
                    alert_id: alert.id,
                    phone_number: recipient.phone_number.clone(),
                    message,
                    status,
                    sent_at: Utc::now(),
                })
                .await?;
        }

        info!(
            "Dispatch for alert {} complete: {} sent, {} failed, {} already recorded",
            alert.id, report.sent, report.failed, report.already_recorded
        );
        Ok(report)
    }

    /// A link failure degrades the message rather than blocking it.
    async fn action_link(&self, alert: &Alert) -> Option<String> {
        // ---
        match self.links.create_link(alert.id).await {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(
                    "Could not create action link for alert {}, sending without it: {}",
                    alert.id, e
                );
                None
            }
        }
    }
}

/// Korean sensor label used in SMS bodies, falling back to the raw type.
pub fn sensor_label(sensor_type: &str) -> &str {
    // ---
    match sensor_type {
        "temperature" => "온도",
        "pressure" => "압력",
        "vibration" => "진동",
        "power" => "전력",
        "current" => "전류",
        "voltage" => "전압",
        "speed" => "속도",
        "torque" => "토크",
        "position" => "위치",
        "accuracy" => "정확도",
        "quality" => "품질",
        other => other,
    }
}

/// Reading or threshold as printed in an SMS: whole numbers keep one
/// decimal, anything finer is printed in full.
pub(crate) fn format_level(value: f64) -> String {
    // ---
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// SMS body, e.g.
///
/// ```text
/// 18:45:00
/// press_001 H
/// 압력: 125.5 > 120.0(임계값)
/// [warning] 담당자
/// https://ops.example.com/action/3f2a...
/// ```
///
/// Lower-bound alerts print `<` instead of `>`.
pub fn format_message(alert: &Alert, recipient: &Recipient, link: Option<&str>) -> String {
    // ---
    let mut message = format!(
        "{}\n{} {}\n{}: {} {} {}(임계값)\n[{}] {}",
        alert.timestamp.format("%H:%M:%S"),
        alert.equipment_id,
        alert.severity.code(),
        sensor_label(&alert.sensor_type),
        format_level(alert.value),
        if alert.value < alert.threshold { "<" } else { ">" },
        format_level(alert.threshold),
        alert.severity,
        recipient.role_label,
    );

    if let Some(link) = link {
        message.push('\n');
        message.push_str(link);
    }
    message
}
