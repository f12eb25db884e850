//! Cooldown / dedup gate.
//!
//! Each (equipment, sensor, severity) key is either silent or active. An
//! active key suppresses candidates until its window has elapsed; staleness
//! is evaluated lazily on the next candidate, so there is no expiry task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::keyed::KeyedStore;
use crate::models::{CooldownEntry, CooldownKey, Severity};

// ---

/// Silence window per severity. More severe alerts get shorter windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CooldownPolicy {
    pub error: Duration,
    pub warning: Duration,
    pub info: Duration,
}

impl CooldownPolicy {
    // ---
    pub fn window(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        CooldownPolicy {
            error: Duration::from_secs(30),
            warning: Duration::from_secs(60),
            info: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Allow,
    Suppress { remaining: Duration },
}

/// Backing table for the gate.
///
/// `try_fire` must be atomic per key: two concurrent candidates for the same
/// key can never both be allowed. An external shared cache can implement
/// this with a compare-and-set.
pub trait CooldownStore: Send + Sync {
    fn try_fire(
        &self,
        key: &CooldownKey,
        now: DateTime<Utc>,
        window: Duration,
        value: f64,
    ) -> GateDecision;

    fn get(&self, key: &CooldownKey) -> Option<CooldownEntry>;
}

/// In-process cooldown table with one lock per key.
#[derive(Debug, Default)]
pub struct InMemoryCooldownStore {
    entries: KeyedStore<CooldownKey, CooldownEntry>,
}

impl InMemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CooldownStore for InMemoryCooldownStore {
    // ---
    fn try_fire(
        &self,
        key: &CooldownKey,
        now: DateTime<Utc>,
        window: Duration,
        value: f64,
    ) -> GateDecision {
        // ---
        self.entries.update(key, |slot| {
            if let Some(entry) = slot {
                let remaining = remaining(entry.last_fired_at, now, window);
                if !remaining.is_zero() {
                    return GateDecision::Suppress { remaining };
                }
            }

            *slot = Some(CooldownEntry {
                last_fired_at: now,
                last_value: value,
            });
            GateDecision::Allow
        })
    }

    fn get(&self, key: &CooldownKey) -> Option<CooldownEntry> {
        self.entries.get(key)
    }
}

/// Time left in the window. A `now` earlier than `fired_at` (out-of-order
/// reading) counts as inside the window.
fn remaining(fired_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Duration {
    // ---
    match (now - fired_at).to_std() {
        Ok(elapsed) => window.saturating_sub(elapsed),
        Err(_) => window,
    }
}
