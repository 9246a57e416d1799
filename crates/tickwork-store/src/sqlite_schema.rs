//! Database schema management.

use std::time::Duration;

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// How long a write waits for another connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply connection pragmas and create tables.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

// Timestamps are epoch milliseconds.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS job_definitions (
    name TEXT PRIMARY KEY,
    handler TEXT NOT NULL,
    payload BLOB NOT NULL,
    schedule TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    next_due INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS job_leases (
    job_name TEXT PRIMARY KEY,
    token TEXT NOT NULL UNIQUE,
    holder TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS job_runs (
    job_name TEXT NOT NULL,
    scheduled_for INTEGER NOT NULL,
    lease_token TEXT,
    lease_expires_at INTEGER,
    state TEXT NOT NULL,
    started_at INTEGER,
    finished_at INTEGER,
    outcome TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (job_name, scheduled_for)
);

CREATE INDEX IF NOT EXISTS idx_job_definitions_due ON job_definitions(enabled, next_due);
CREATE INDEX IF NOT EXISTS idx_job_runs_state ON job_runs(state, lease_expires_at);
"#;
