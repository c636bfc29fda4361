//! Database schema definitions.

use crate::error::{RelationsError, Result};
use rusqlite::{Connection, OptionalExtension};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the relations database.
pub const SCHEMA_SQL: &str = r"
    -- Relations (directed, typed edges)
    -- time is epoch microseconds.
    CREATE TABLE IF NOT EXISTS relations (
        source TEXT NOT NULL,
        destination TEXT NOT NULL,
        type TEXT NOT NULL,
        comment TEXT NOT NULL DEFAULT '',
        author TEXT NOT NULL DEFAULT '',
        time INTEGER NOT NULL,
        PRIMARY KEY (source, destination, type)
    );
    CREATE INDEX IF NOT EXISTS idx_relations_destination ON relations(destination);
    CREATE INDEX IF NOT EXISTS idx_relations_type ON relations(type);

    -- Tickets referenced by relations
    CREATE TABLE IF NOT EXISTS tickets (
        id TEXT PRIMARY KEY,
        product TEXT NOT NULL DEFAULT '',
        summary TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'open',
        created_at INTEGER NOT NULL,
        CHECK (status IN ('open', 'closed'))
    );
    CREATE INDEX IF NOT EXISTS idx_tickets_product ON tickets(product);
    CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);

    -- Per-product ticket numbering
    CREATE TABLE IF NOT EXISTS ticket_counters (
        product TEXT PRIMARY KEY,
        next_number INTEGER NOT NULL DEFAULT 1
    );

    -- History
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY,
        resource_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        actor TEXT NOT NULL,
        comment TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_resource_id ON events(resource_id);
    CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);
    CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);

    -- Config (Runtime)
    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- Metadata
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`. A database written by a
/// newer schema version is refused.
///
/// # Errors
///
/// Returns an error if the SQL execution fails, pragmas cannot be set, or the
/// stored schema version is newer than `CURRENT_SCHEMA_VERSION`.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored.map(|v| v.parse::<i32>()) {
        Some(Ok(found)) if found > CURRENT_SCHEMA_VERSION => {
            return Err(RelationsError::SchemaMismatch {
                expected: CURRENT_SCHEMA_VERSION,
                found,
            });
        }
        Some(Ok(_)) => {}
        Some(Err(_)) | None => {
            conn.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
                [CURRENT_SCHEMA_VERSION.to_string()],
            )?;
        }
    }

    // Set journal mode to WAL for concurrency
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(())
}
