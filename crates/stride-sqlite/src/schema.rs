//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};

use crate::error::SqliteError;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Create tables on a fresh database; refuse one written by a newer build.
pub fn init_schema(conn: &Connection) -> Result<(), SqliteError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let current: Option<i64> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match current {
        None => {
            tracing::info!(version = SCHEMA_VERSION, "creating database schema");
            conn.execute_batch(TABLES)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(found) if found > SCHEMA_VERSION => {
            return Err(SqliteError::Schema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Some(found) => {
            tracing::debug!(version = found, "database schema is up to date");
        }
    }
    Ok(())
}

const TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS drafts (
    draft_id TEXT PRIMARY KEY,
    plan_revision INTEGER NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS proposals (
    proposal_id TEXT PRIMARY KEY,
    draft_id TEXT NOT NULL REFERENCES drafts(draft_id),
    state TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_proposals_draft ON proposals(draft_id);

CREATE TABLE IF NOT EXISTS policy_profiles (
    profile_id TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    modified_by TEXT,
    modified_at TEXT
);

CREATE TABLE IF NOT EXISTS audit_records (
    sequence INTEGER PRIMARY KEY,
    target TEXT NOT NULL,
    scope TEXT,
    record_hash TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_target ON audit_records(target);
CREATE INDEX IF NOT EXISTS idx_audit_scope ON audit_records(scope);
"#;
