//! Application entry point for the `codemetal-alertflow` service.
//!
//! This binary orchestrates the full startup sequence for the alert engine:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool and creating the schema
//! - Wiring storage, the SMS gateway client and action links into the engine
//! - Starting the ingest worker and mounting the `routes` gateway (EMBP)
//! - Serving HTTP until Ctrl-C, then draining in-flight readings
//!
//! # Environment Variables
//! - `DATABASE_URL`, `SMS_API_URL`, `SMS_API_KEY`, `SMS_SENDER` (**required**)
//! - `LISTEN_ADDR` (optional) – bind address (default: `0.0.0.0:8080`)
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the pipeline tuning variables.
use std::{env, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use alertflow::config::{self, mask_db_url};
use alertflow::notify::{HttpSmsTransport, StoredLinkIssuer};
use alertflow::store::{PgStore, Storage};
use alertflow::{routes, schema, spawn_ingest, Engine};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database: {}", mask_db_url(&cfg.db_url));

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .with_context(|| format!("Failed to connect to database '{}'", mask_db_url(&cfg.db_url)))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let storage: Arc<dyn Storage> = Arc::new(PgStore::new(pool.clone()));
    let transport = Arc::new(HttpSmsTransport::new(cfg.sms.clone())?);
    let links = Arc::new(StoredLinkIssuer::new(
        Arc::clone(&storage),
        &cfg.public_base_url,
        cfg.action_link_ttl,
    ));

    let shutdown = CancellationToken::new();
    let engine = Arc::new(
        Engine::new(Arc::new(cfg.engine.clone()), storage, transport, links)
            .with_cancellation(shutdown.clone()),
    );

    let (ingest, worker) = spawn_ingest(Arc::clone(&engine), cfg.ingest_queue_capacity);

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(engine, ingest);

    tracing::info!("Listening on {}", cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .await?;

    // Server is down; stop the ingest worker even if the signal path was skipped
    shutdown.cancel();
    if let Err(e) = worker.await {
        tracing::error!("Ingest worker ended abnormally: {}", e);
    }

    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolve on Ctrl-C and cancel in-flight dispatch.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    // ---
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Unable to listen for shutdown signal: {}", e),
    }
    shutdown.cancel();
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Log target, file, and line number output enabled
/// - Colors follow `FORCE_COLOR` (`1|true|yes` on, `0|false|no` off), otherwise
///   TTY detection on stdout
/// - `AXUM_SPAN_EVENTS`: `"full"` for ENTER/EXIT/CLOSE with timing,
///   `"enter_exit"` for ENTER and EXIT, anything else CLOSE only
/// - `RUST_LOG` wins when set; otherwise `AXUM_LOG_LEVEL` (default `debug`)
///
/// Call once, before any tracing macros run.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some(level @ ("trace" | "debug" | "info" | "warn" | "error")) => level.to_string(),
            _ => "debug".to_string(),
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
