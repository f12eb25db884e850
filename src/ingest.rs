//! Reading ingest: validation at the edge, then a bounded queue feeding the
//! pipeline.
//!
//! Callers get an answer as soon as the reading is validated and queued; they
//! never wait for dispatch. Each queued reading runs on its own task, so
//! different cooldown keys proceed independently; per-key ordering is the
//! cooldown gate's job.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::engine::{Engine, PipelineOutcome};
use crate::error::{Error, Result};
use crate::models::{RawReading, Reading};

// ---

#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Reading>,
}

impl IngestHandle {
    // ---
    /// Validate and enqueue a reading. Fire-and-forget: returns once queued.
    ///
    /// Fails with `Validation` for a malformed reading, `QueueFull` when the
    /// pipeline is saturated and `QueueClosed` after shutdown.
    pub fn ingest_reading(&self, raw: RawReading) -> Result<()> {
        // ---
        let reading = raw.validate()?;
        self.tx.try_send(reading).map_err(|e| match e {
            TrySendError::Full(reading) => {
                warn!(
                    "Ingest queue full, rejecting reading for {}/{}",
                    reading.equipment_id, reading.sensor_type
                );
                Error::QueueFull
            }
            TrySendError::Closed(_) => Error::QueueClosed,
        })
    }

    /// Readings queued but not yet picked up by the worker.
    pub fn backlog(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start the ingest worker. It runs until the engine's cancellation token
/// fires or every [`IngestHandle`] is dropped, then waits for in-flight
/// pipelines to finish.
pub fn spawn_ingest(engine: Arc<Engine>, capacity: usize) -> (IngestHandle, JoinHandle<()>) {
    // ---
    let (tx, rx) = mpsc::channel(capacity);
    let worker = tokio::spawn(run(engine, rx));
    (IngestHandle { tx }, worker)
}

async fn run(engine: Arc<Engine>, mut rx: mpsc::Receiver<Reading>) {
    // ---
    let cancel = engine.cancellation().clone();
    let mut in_flight = JoinSet::new();

    info!("Ingest worker started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(reading) => {
                    let engine = Arc::clone(&engine);
                    in_flight.spawn(async move { report(engine.process_reading(reading).await) });
                }
                None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    error!("Pipeline task failed: {}", e);
                }
            }
        }
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!("Ingest worker stopping, {} queued reading(s) dropped", dropped);
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!("Pipeline task failed: {}", e);
        }
    }

    info!("Ingest worker stopped");
}

fn report(result: Result<PipelineOutcome>) {
    // ---
    match result {
        Ok(PipelineOutcome::Dispatched { alert, report }) => debug!(
            "Alert {} dispatched: {} sent, {} failed",
            alert.id, report.sent, report.failed
        ),
        Ok(outcome) => debug!("Pipeline finished: {:?}", outcome),
        Err(e) => error!("Pipeline failed: {}", e),
    }
}
