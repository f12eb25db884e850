//! Database schema management for `codemetal-alertflow`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Statements run in order inside one transaction.
const DDL: &[&str] = &[
    // Users reachable by SMS; managed by the user-management service
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id           BIGSERIAL PRIMARY KEY,
        name         TEXT        NOT NULL,
        phone_number TEXT        NOT NULL,
        department   TEXT,
        is_active    BOOLEAN     NOT NULL DEFAULT TRUE,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS equipment_users (
        id           BIGSERIAL PRIMARY KEY,
        equipment_id TEXT        NOT NULL,
        user_id      BIGINT      NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        role         TEXT        NOT NULL DEFAULT 'general',
        is_primary   BOOLEAN     NOT NULL DEFAULT FALSE,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (equipment_id, user_id)
    );
    "#,
    // At most one primary assignee per equipment
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_equipment_users_primary
        ON equipment_users (equipment_id) WHERE is_primary;
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alert_subscriptions (
        id           BIGSERIAL PRIMARY KEY,
        user_id      BIGINT  NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        equipment_id TEXT,
        sensor_type  TEXT,
        severity     TEXT    NOT NULL,
        is_active    BOOLEAN NOT NULL DEFAULT TRUE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alerts (
        id            BIGSERIAL PRIMARY KEY,
        equipment_id  TEXT             NOT NULL,
        sensor_type   TEXT             NOT NULL,
        value         DOUBLE PRECISION NOT NULL,
        threshold     DOUBLE PRECISION NOT NULL,
        severity      TEXT             NOT NULL,
        timestamp     TIMESTAMPTZ      NOT NULL,
        message       TEXT             NOT NULL,
        status        TEXT             NOT NULL DEFAULT 'unprocessed',
        no_recipients BOOLEAN          NOT NULL DEFAULT FALSE,
        created_at    TIMESTAMPTZ      NOT NULL DEFAULT now()
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_alerts_equipment_id
        ON alerts (equipment_id, timestamp DESC);
    "#,
    // SMS history: one row per (alert, recipient) attempt
    r#"
    CREATE TABLE IF NOT EXISTS sms_history (
        id           BIGSERIAL PRIMARY KEY,
        user_id      BIGINT      NOT NULL,
        alert_id     BIGINT      NOT NULL REFERENCES alerts (id) ON DELETE CASCADE,
        phone_number TEXT        NOT NULL,
        message      TEXT        NOT NULL,
        status       TEXT        NOT NULL,
        sent_at      TIMESTAMPTZ NOT NULL,
        UNIQUE (alert_id, user_id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS action_links (
        token      TEXT PRIMARY KEY,
        alert_id   BIGINT      NOT NULL REFERENCES alerts (id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        expires_at TIMESTAMPTZ NOT NULL,
        used_at    TIMESTAMPTZ
    );
    "#,
];

/// Create or update the database schema (idempotent).
///
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    for statement in DDL {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::debug!("Schema ready ({} statements)", DDL.len());
    Ok(())
}
