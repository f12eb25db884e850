//! Threshold alerting for factory equipment sensors.
//!
//! Readings enter through [`IngestHandle`], are checked against per-sensor
//! threshold levels, pass a significance filter and a per-key cooldown gate,
//! and end as persisted alerts with SMS notifications to the equipment's
//! assignees and subscribers.
//!
//! Module boundaries follow the Explicit Module Boundary Pattern (EMBP):
//! each directory module exposes its public surface from `mod.rs` and keeps
//! its internals private.

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod models;
pub mod notify;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::{Config, EngineSettings};
pub use engine::{Engine, PipelineOutcome};
pub use error::{Error, Result};
pub use ingest::{spawn_ingest, IngestHandle};
