//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per orchestration pass
CREATE TABLE IF NOT EXISTS batches (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    summary TEXT
);

-- One row per item per batch; status holds ItemStatus db strings
CREATE TABLE IF NOT EXISTS batch_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT NOT NULL REFERENCES batches(id),
    source_id INTEGER NOT NULL,
    slug TEXT NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    error_detail TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_batch_logs_batch ON batch_logs(batch_id);
CREATE INDEX IF NOT EXISTS idx_batch_logs_status ON batch_logs(status);

-- Extracted records
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    classification TEXT NOT NULL,
    fragment_primary TEXT,
    fragment_secondary TEXT,
    source_url TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    attempts INTEGER NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_classification ON records(classification);

-- Site identifier -> record; the primary key allows each source ID once
CREATE TABLE IF NOT EXISTS source_mappings (
    source_id INTEGER PRIMARY KEY,
    record_id INTEGER NOT NULL REFERENCES records(id),
    slug TEXT NOT NULL,
    url TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
