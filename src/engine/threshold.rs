//! Threshold evaluation: reading + threshold spec → severity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Reading, Severity};

// ---

/// Warning/critical levels for one sensor type.
///
/// When `critical_level < warning_level` the sensor alarms on *low* values
/// (quality and accuracy percentages), otherwise on high values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    // ---
    pub warning_level: f64,
    pub critical_level: f64,
    pub unit: String,
    #[serde(default)]
    pub info_level: Option<f64>,
}

impl ThresholdSpec {
    // ---
    pub fn new(warning_level: f64, critical_level: f64, unit: &str) -> Self {
        ThresholdSpec {
            warning_level,
            critical_level,
            unit: unit.to_string(),
            info_level: None,
        }
    }

    pub fn with_info_level(mut self, level: f64) -> Self {
        self.info_level = Some(level);
        self
    }

    pub fn is_lower_bound(&self) -> bool {
        self.critical_level < self.warning_level
    }

    fn crosses(&self, value: f64, level: f64) -> bool {
        if self.is_lower_bound() {
            value < level
        } else {
            value > level
        }
    }
}

/// Where thresholds come from: a static table, or an inference module that
/// derives levels per sensor type.
pub trait ThresholdSource: Send + Sync {
    fn lookup(&self, sensor_type: &str) -> Option<ThresholdSpec>;
}

/// Static thresholds keyed by sensor type, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable(HashMap<String, ThresholdSpec>);

impl ThresholdTable {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sensor_type: &str, spec: ThresholdSpec) -> Self {
        self.0.insert(sensor_type.to_string(), spec);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Factory-floor defaults for the press/weld/assembly/inspection lines.
    pub fn factory_defaults() -> Self {
        // ---
        ThresholdTable::new()
            .with("temperature", ThresholdSpec::new(70.0, 85.0, "°C"))
            .with("pressure", ThresholdSpec::new(180.0, 190.0, "bar"))
            .with("vibration", ThresholdSpec::new(1.5, 2.0, "mm/s"))
            .with("current", ThresholdSpec::new(450.0, 480.0, "A"))
            .with("voltage", ThresholdSpec::new(45.0, 48.0, "V"))
            .with("speed", ThresholdSpec::new(90.0, 95.0, "rpm"))
            .with("torque", ThresholdSpec::new(180.0, 190.0, "Nm"))
            .with("position", ThresholdSpec::new(90.0, 95.0, "mm"))
            .with("accuracy", ThresholdSpec::new(97.0, 95.0, "%"))
            .with("quality", ThresholdSpec::new(95.0, 92.0, "%"))
    }
}

impl ThresholdSource for ThresholdTable {
    fn lookup(&self, sensor_type: &str) -> Option<ThresholdSpec> {
        self.0.get(sensor_type).cloned()
    }
}

// ---

/// Result of classifying one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// No threshold configured for the sensor type.
    ConfigurationGap,
    /// Value is within bounds.
    Normal,
    /// Value crossed `threshold`.
    Crossed { severity: Severity, threshold: f64 },
}

impl Evaluation {
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Evaluation::Crossed { severity, .. } => Some(*severity),
            _ => None,
        }
    }
}

/// Classify `reading` against `spec`. Critical wins over warning, warning
/// over info.
pub fn evaluate(reading: &Reading, spec: Option<&ThresholdSpec>) -> Evaluation {
    // ---
    let Some(spec) = spec else {
        return Evaluation::ConfigurationGap;
    };

    let value = reading.value;
    let levels = [
        (Severity::Error, Some(spec.critical_level)),
        (Severity::Warning, Some(spec.warning_level)),
        (Severity::Info, spec.info_level),
    ];

    levels
        .into_iter()
        .find_map(|(severity, level)| {
            level
                .filter(|level| spec.crosses(value, *level))
                .map(|threshold| Evaluation::Crossed {
                    severity,
                    threshold,
                })
        })
        .unwrap_or(Evaluation::Normal)
}
