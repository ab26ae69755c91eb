//! SQLite schema for the hot store
//!
//! `docs` holds content and flags per (project, doc). The edit version
//! lives in `doc_ops`, a separate table keyed by doc id alone, so it can be
//! written independently of content.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Documents. lines and ranges are JSON; both are NULL on shadow
        -- records whose content lives in the archive.
        CREATE TABLE IF NOT EXISTS docs (
            project_id TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            lines TEXT,
            ranges TEXT,
            rev INTEGER NOT NULL DEFAULT 0,
            name TEXT,
            deleted INTEGER,
            deleted_at INTEGER,
            in_cold_storage INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (project_id, doc_id)
        );

        -- Edit version counter, independent of content
        CREATE TABLE IF NOT EXISTS doc_ops (
            doc_id TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        );

        -- Listing non-deleted / deleted docs per project
        CREATE INDEX IF NOT EXISTS idx_docs_project_deleted ON docs(project_id, deleted);

        -- Finding shadow records to unarchive
        CREATE INDEX IF NOT EXISTS idx_docs_project_cold ON docs(project_id, in_cold_storage);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
