//! Alert generation and notification dispatch pipeline.
//!
//! A reading flows through: threshold evaluation → change-significance
//! filter → cooldown gate → recipient resolution → alert persistence →
//! dispatch. Each stage can end the pipeline; the stage that did is reported
//! as a [`PipelineOutcome`].
//!
//! The engine owns no timing loop. Readings arrive through
//! [`IngestHandle`](crate::ingest::IngestHandle) or a direct call to
//! [`Engine::process_reading`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::config::EngineSettings;
use crate::error::Result;
use crate::models::{Alert, AlertStatus, CooldownEntry, CooldownKey, NewAlert, Reading, Severity};
use crate::notify::{LinkIssuer, SmsTransport};
use crate::store::Storage;

mod cooldown;
mod dispatch;
mod keyed;
mod recipients;
mod significance;
mod threshold;

pub use cooldown::{CooldownPolicy, CooldownStore, GateDecision, InMemoryCooldownStore};
pub use dispatch::{format_message, sensor_label, DispatchReport, Dispatcher};
pub use keyed::KeyedStore;
pub use recipients::RecipientResolver;
pub use significance::{Significance, SignificanceFilter, SignificancePolicy};
pub use threshold::{evaluate, Evaluation, ThresholdSource, ThresholdSpec, ThresholdTable};

// ---

/// Where a reading's trip through the pipeline ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// No threshold configured for the sensor type.
    ConfigurationGap,
    /// Value within bounds.
    WithinBounds,
    /// Crossed a threshold but did not differ meaningfully from recent history.
    Insignificant { severity: Severity },
    /// Same key alerted too recently.
    CoolingDown { severity: Severity, remaining: Duration },
    /// Alert persisted and flagged; nobody to notify.
    NoRecipients { alert: Alert },
    /// Alert persisted and dispatched (possibly partially).
    Dispatched { alert: Alert, report: DispatchReport },
}

impl PipelineOutcome {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            PipelineOutcome::NoRecipients { alert } | PipelineOutcome::Dispatched { alert, .. } => {
                Some(alert)
            }
            _ => None,
        }
    }
}

pub struct Engine {
    settings: Arc<EngineSettings>,
    thresholds: Arc<dyn ThresholdSource>,
    filter: SignificanceFilter,
    cooldowns: Arc<dyn CooldownStore>,
    resolver: RecipientResolver,
    dispatcher: Dispatcher,
    storage: Arc<dyn Storage>,
    cancel: CancellationToken,
}

impl Engine {
    // ---
    /// Build an engine with in-memory cooldown state and the static threshold
    /// table from `settings`.
    pub fn new(
        settings: Arc<EngineSettings>,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn SmsTransport>,
        links: Arc<dyn LinkIssuer>,
    ) -> Self {
        // ---
        Engine {
            thresholds: Arc::new(settings.thresholds.clone()),
            filter: SignificanceFilter::new(settings.significance),
            cooldowns: Arc::new(InMemoryCooldownStore::new()),
            resolver: RecipientResolver::new(Arc::clone(&storage)),
            dispatcher: Dispatcher::new(Arc::clone(&storage), transport, links),
            storage,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the cooldown table, e.g. with one backed by a shared cache.
    pub fn with_cooldown_store(mut self, store: Arc<dyn CooldownStore>) -> Self {
        self.cooldowns = store;
        self
    }

    /// Replace the static threshold table, e.g. with levels supplied by an
    /// inference module.
    pub fn with_threshold_source(mut self, source: Arc<dyn ThresholdSource>) -> Self {
        self.thresholds = source;
        self
    }

    /// Share a cancellation token with the caller (used for shutdown).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Current cooldown entry for `key`, for observability.
    pub fn get_cooldown_state(&self, key: &CooldownKey) -> Option<CooldownEntry> {
        self.cooldowns.get(key)
    }

    /// Run one reading through the whole pipeline.
    ///
    /// Storage failures abort this reading only and are returned; transport
    /// failures are recorded per recipient and do not surface here.
    #[tracing::instrument(
        name = "process_reading",
        skip(self, reading),
        fields(equipment = %reading.equipment_id, sensor = %reading.sensor_type, value = reading.value)
    )]
    pub async fn process_reading(&self, reading: Reading) -> Result<PipelineOutcome> {
        // ---
        let spec = self.thresholds.lookup(&reading.sensor_type);

        let (severity, threshold) = match evaluate(&reading, spec.as_ref()) {
            Evaluation::ConfigurationGap => {
                warn!(
                    "No threshold configured for sensor type '{}', reading not evaluated",
                    reading.sensor_type
                );
                return Ok(PipelineOutcome::ConfigurationGap);
            }
            Evaluation::Normal => {
                self.filter.assess(&reading, None);
                trace!("Reading within bounds");
                return Ok(PipelineOutcome::WithinBounds);
            }
            Evaluation::Crossed {
                severity,
                threshold,
            } => (severity, threshold),
        };

        if let Significance::Insignificant { change, repeats } =
            self.filter.assess(&reading, Some(severity))
        {
            info!(
                "Suppressed {} alert: change {:.1}% after {} identical readings",
                severity,
                change * 100.0,
                repeats
            );
            return Ok(PipelineOutcome::Insignificant { severity });
        }

        let key = CooldownKey::new(&reading.equipment_id, &reading.sensor_type, severity);
        let window = self.settings.cooldowns.window(severity);
        if let GateDecision::Suppress { remaining } =
            self.cooldowns
                .try_fire(&key, reading.timestamp, window, reading.value)
        {
            info!(
                "Suppressed {} alert: cooling down for another {}s",
                severity,
                remaining.as_secs()
            );
            return Ok(PipelineOutcome::CoolingDown {
                severity,
                remaining,
            });
        }

        let recipients = self
            .resolver
            .resolve(&reading.equipment_id, &reading.sensor_type, severity)
            .await?;

        let unit = spec.as_ref().map(|s| s.unit.as_str()).unwrap_or_default();
        let alert = self
            .storage
            .create_alert(NewAlert {
                message: describe(&reading, severity, threshold, unit),
                equipment_id: reading.equipment_id,
                sensor_type: reading.sensor_type,
                value: reading.value,
                threshold,
                severity,
                timestamp: reading.timestamp,
                no_recipients: recipients.is_empty(),
            })
            .await?;

        info!("Alert {} created ({})", alert.id, alert.message);

        if recipients.is_empty() {
            warn!("Alert {} has no recipients, dispatch skipped", alert.id);
            return Ok(PipelineOutcome::NoRecipients { alert });
        }

        let report = self
            .dispatcher
            .dispatch(&alert, &recipients, &self.cancel)
            .await?;

        Ok(PipelineOutcome::Dispatched { alert, report })
    }

    /// Re-run dispatch for a stored alert. Recipients that already have a
    /// record are skipped, so this is safe after a crash mid-loop.
    pub async fn redispatch(&self, alert_id: i64) -> Result<DispatchReport> {
        // ---
        let alert = self.storage.get_alert(alert_id).await?;
        let recipients = self
            .resolver
            .resolve(&alert.equipment_id, &alert.sensor_type, alert.severity)
            .await?;

        self.dispatcher
            .dispatch(&alert, &recipients, &self.cancel)
            .await
    }

    /// Apply an operator status change. Fails with `InvalidStateTransition`
    /// for backward moves or anything from `done`, and `NotFound` for an
    /// unknown id.
    pub async fn transition_alert(&self, alert_id: i64, to: AlertStatus) -> Result<Alert> {
        // ---
        let alert = self.storage.get_alert(alert_id).await?;
        let next = alert.status.transition(to)?;

        if next == alert.status {
            return Ok(alert);
        }

        let updated = self.storage.update_alert_status(alert_id, next).await?;
        info!("Alert {} status {} -> {}", alert_id, alert.status, next);
        Ok(updated)
    }
}

/// Human-readable alert description stored with the alert.
fn describe(reading: &Reading, severity: Severity, threshold: f64, unit: &str) -> String {
    // ---
    let direction = if reading.value < threshold {
        "below"
    } else {
        "above"
    };
    format!(
        "{} {} {}{} {} {} threshold {}{}",
        reading.equipment_id,
        reading.sensor_type,
        dispatch::format_level(reading.value),
        unit,
        direction,
        severity,
        dispatch::format_level(threshold),
        unit
    )
}
