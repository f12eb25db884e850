//! Configuration loader for the `codemetal-alertflow` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Everything is resolved once at startup into typed
//! structs; the engine receives [`EngineSettings`] by `Arc` and never re-reads
//! the environment mid-pipeline.
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::engine::{CooldownPolicy, SignificancePolicy, ThresholdTable};
use crate::notify::SmsSettings;

/// Parse an optional environment variable of any `FromStr` type.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        parse_env!($var_name, u32, $default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Settings the alert pipeline reads during evaluation.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    // ---
    pub thresholds: ThresholdTable,
    pub cooldowns: CooldownPolicy,
    pub significance: SignificancePolicy,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// HTTP bind address.
    pub listen_addr: SocketAddr,

    /// Base URL embedded in action links sent by SMS.
    pub public_base_url: String,

    /// How long an action link stays valid.
    pub action_link_ttl: chrono::Duration,

    /// Capacity of the bounded ingest queue.
    pub ingest_queue_capacity: usize,

    /// SMS gateway settings.
    pub sms: SmsSettings,

    /// Pipeline settings.
    pub engine: EngineSettings,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `SMS_API_URL`, `SMS_API_KEY`, `SMS_SENDER` – SMS gateway
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8080`)
/// - `PUBLIC_BASE_URL` – action link base (default: `http://localhost:8080`)
/// - `ACTION_LINK_TTL_HOURS` – action link lifetime (default: 24)
/// - `SMS_TIMEOUT_MS` – transport timeout (default: 5000)
/// - `ERROR_COOLDOWN_SECONDS` / `WARNING_COOLDOWN_SECONDS` / `INFO_COOLDOWN_SECONDS`
///   (default: 30 / 60 / 120)
/// - `MIN_CHANGE_FRACTION` – significance filter (default: 0.05)
/// - `REPEAT_LIMIT` – significance filter (default: 3)
/// - `INGEST_QUEUE_CAPACITY` – bounded queue size (default: 1024)
/// - `THRESHOLDS_FILE` – JSON threshold table (default: built-in factory table)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let listen_addr = parse_env!(
        "LISTEN_ADDR",
        SocketAddr,
        SocketAddr::from(([0, 0, 0, 0], 8080))
    );
    let public_base_url =
        env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let action_link_ttl =
        chrono::Duration::hours(parse_env_u32!("ACTION_LINK_TTL_HOURS", 24).into());
    let ingest_queue_capacity = parse_env!("INGEST_QUEUE_CAPACITY", usize, 1024);

    let sms = SmsSettings {
        api_url: require_env!("SMS_API_URL"),
        api_key: require_env!("SMS_API_KEY"),
        sender: require_env!("SMS_SENDER"),
        timeout: Duration::from_millis(parse_env!("SMS_TIMEOUT_MS", u64, 5000)),
    };

    let defaults = CooldownPolicy::default();
    let error_secs = parse_env!("ERROR_COOLDOWN_SECONDS", u64, defaults.error.as_secs());
    let warning_secs = parse_env!("WARNING_COOLDOWN_SECONDS", u64, defaults.warning.as_secs());
    let info_secs = parse_env!("INFO_COOLDOWN_SECONDS", u64, defaults.info.as_secs());
    let cooldowns = CooldownPolicy {
        error: Duration::from_secs(error_secs),
        warning: Duration::from_secs(warning_secs),
        info: Duration::from_secs(info_secs),
    };

    let defaults = SignificancePolicy::default();
    let significance = SignificancePolicy {
        min_change_fraction: parse_env!("MIN_CHANGE_FRACTION", f64, defaults.min_change_fraction),
        repeat_limit: parse_env_u32!("REPEAT_LIMIT", defaults.repeat_limit),
    };
    if !(0.0..=1.0).contains(&significance.min_change_fraction) {
        return Err(anyhow!(
            "Invalid MIN_CHANGE_FRACTION: {} is outside 0.0..=1.0",
            significance.min_change_fraction
        ));
    }

    let thresholds = match env::var("THRESHOLDS_FILE") {
        Ok(path) => load_thresholds(&path)?,
        Err(_) => ThresholdTable::factory_defaults(),
    };

    if ingest_queue_capacity == 0 {
        return Err(anyhow!("Invalid INGEST_QUEUE_CAPACITY: must be at least 1"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        listen_addr,
        public_base_url,
        action_link_ttl,
        ingest_queue_capacity,
        sms,
        engine: EngineSettings {
            thresholds,
            cooldowns,
            significance,
        },
    })
}

/// Read a `{sensor_type: ThresholdSpec}` JSON file.
pub fn load_thresholds(path: &str) -> Result<ThresholdTable> {
    // ---
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read THRESHOLDS_FILE '{}'", path))?;
    let table: ThresholdTable = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse THRESHOLDS_FILE '{}'", path))?;

    if table.is_empty() {
        return Err(anyhow!("THRESHOLDS_FILE '{}' defines no sensor types", path));
    }
    Ok(table)
}

/// Mask the password in a connection string (`user:****@host`).
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password and the SMS API key.
    pub fn log_config(&self) {
        // ---
        let cooldowns = &self.engine.cooldowns;
        let significance = &self.engine.significance;

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL          : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX           : {}", self.db_pool_max);
        tracing::info!("  LISTEN_ADDR           : {}", self.listen_addr);
        tracing::info!("  PUBLIC_BASE_URL       : {}", self.public_base_url);
        tracing::info!("  ACTION_LINK_TTL_HOURS : {}", self.action_link_ttl.num_hours());
        tracing::info!("  SMS_API_URL           : {}", self.sms.api_url);
        tracing::info!("  SMS_API_KEY           : ****");
        tracing::info!("  SMS_SENDER            : {}", self.sms.sender);
        tracing::info!("  SMS_TIMEOUT_MS        : {}", self.sms.timeout.as_millis());
        tracing::info!(
            "  COOLDOWN (err/warn/info): {}s / {}s / {}s",
            cooldowns.error.as_secs(),
            cooldowns.warning.as_secs(),
            cooldowns.info.as_secs()
        );
        tracing::info!("  MIN_CHANGE_FRACTION   : {}", significance.min_change_fraction);
        tracing::info!("  REPEAT_LIMIT          : {}", significance.repeat_limit);
        tracing::info!("  INGEST_QUEUE_CAPACITY : {}", self.ingest_queue_capacity);
        tracing::info!("  THRESHOLDS            : {} sensor types", self.engine.thresholds.len());
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_mask_db_url() {
        // ---
        assert_eq!(
            mask_db_url("postgres://alert:secret@db:5432/alertflow"),
            "postgres://alert:****@db:5432/alertflow"
        );
        assert_eq!(mask_db_url("postgres://db/alertflow"), "postgres://db/alertflow");
    }

    #[test]
    fn test_load_thresholds_file() {
        // ---
        let path =
            env::temp_dir().join(format!("alertflow-thresholds-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"pressure": {"warning_level": 120.0, "critical_level": 130.0, "unit": "bar"}}"#,
        )
        .unwrap();

        let table = load_thresholds(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_load_thresholds_missing_file() {
        assert!(load_thresholds("/nonexistent/thresholds.json").is_err());
    }
}
