//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the SQLite backend.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Links whose records are durably stored (the progress set)
CREATE TABLE IF NOT EXISTS links (
    link_id TEXT PRIMARY KEY,
    persisted_at TEXT NOT NULL
);

-- Extracted records, grouped by the link that produced them
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    link_id TEXT NOT NULL REFERENCES links(link_id) DEFERRABLE INITIALLY DEFERRED,
    organization_name TEXT NOT NULL,
    organization_email TEXT,
    organization_phone TEXT,
    organization_province TEXT,
    person_name TEXT NOT NULL,
    person_role TEXT NOT NULL,
    team_count INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_link ON records(link_id);

-- Store-level metadata (config hash, last update)
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
