//! Change-significance filter.
//!
//! Suppresses alerts caused by a sensor parked on a threshold-crossing value:
//! a reading is dropped when it barely moved from the previous one *and* the
//! same value has already repeated more than `repeat_limit` times. Severity
//! escalation always passes.

use serde::Serialize;

use super::keyed::KeyedStore;
use crate::models::{Reading, Severity};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignificancePolicy {
    /// Relative change below which a reading counts as "not different".
    pub min_change_fraction: f64,
    /// Consecutive identical values tolerated before suppression kicks in.
    pub repeat_limit: u32,
}

impl Default for SignificancePolicy {
    fn default() -> Self {
        SignificancePolicy {
            min_change_fraction: 0.05,
            repeat_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct History {
    last_value: f64,
    last_severity: Option<Severity>,
    repeats: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Significance {
    Significant,
    Insignificant { change: f64, repeats: u32 },
}

type SeriesKey = (String, String);

/// Per-(equipment, sensor) history of the last evaluated reading.
#[derive(Debug)]
pub struct SignificanceFilter {
    policy: SignificancePolicy,
    history: KeyedStore<SeriesKey, History>,
}

const IDENTICAL_EPSILON: f64 = 1e-9;

impl SignificanceFilter {
    // ---
    pub fn new(policy: SignificancePolicy) -> Self {
        SignificanceFilter {
            policy,
            history: KeyedStore::new(),
        }
    }

    /// Record `reading` and report whether an alert for it would be
    /// meaningful. `severity` is `None` for in-bounds readings; those still
    /// update the history so a recovery breaks a run of repeats.
    pub fn assess(&self, reading: &Reading, severity: Option<Severity>) -> Significance {
        // ---
        let key = (reading.equipment_id.clone(), reading.sensor_type.clone());
        let value = reading.value;
        let policy = self.policy;

        self.history.update(&key, |slot| {
            let Some(prev) = *slot else {
                *slot = Some(History {
                    last_value: value,
                    last_severity: severity,
                    repeats: 0,
                });
                return Significance::Significant;
            };

            let identical = (value - prev.last_value).abs() < IDENTICAL_EPSILON;
            let repeats = if identical { prev.repeats + 1 } else { 0 };
            let change = relative_change(prev.last_value, value);
            let escalated = match (prev.last_severity, severity) {
                (Some(before), Some(now)) => now > before,
                (None, Some(_)) => true,
                _ => false,
            };

            *slot = Some(History {
                last_value: value,
                last_severity: severity,
                repeats,
            });

            if !escalated && change < policy.min_change_fraction && repeats > policy.repeat_limit
            {
                Significance::Insignificant { change, repeats }
            } else {
                Significance::Significant
            }
        })
    }
}

fn relative_change(last: f64, value: f64) -> f64 {
    // ---
    if last == 0.0 {
        if value == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (value - last).abs() / last.abs()
    }
}
