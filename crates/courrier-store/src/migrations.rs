//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::open_at`] call.
//! Each migration is guarded by the `user_version` pragma so it runs
//! exactly once.
//!
//! [`Database::open_at`]: crate::Database::open_at

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version. Bump this and extend [`run_migrations`] whenever
/// the schema changes.
const CURRENT_VERSION: u32 = 1;

const V001_UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4, shared with attachments
    sender_id     TEXT NOT NULL,
    recipient_id  TEXT NOT NULL,
    content       TEXT NOT NULL,              -- sealed (base64 of nonce||ciphertext)
    timestamp     TEXT NOT NULL,              -- RFC 3339, fixed microsecond width
    is_attachment INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_messages_participants_ts
    ON messages(sender_id, recipient_id, timestamp);

-- ----------------------------------------------------------------
-- Attachments (encrypted raw file bytes, 1:1 with an attachment message)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS attachments (
    id   TEXT PRIMARY KEY NOT NULL,           -- equals messages.id
    data BLOB NOT NULL
);
"#;

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        conn.execute_batch(V001_UP_SQL)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}
