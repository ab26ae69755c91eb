//! SQLite hot store
//!
//! Holds the working copy of every document that is not archived, plus
//! shadow records (identity and flags only) for the ones that are.
//!
//! ## Tables
//!
//! - `docs` - content, `rev`, soft-delete metadata and the tier flag
//! - `doc_ops` - edit version per doc
//!
//! Every statement runs on tokio's blocking pool against a single shared
//! connection. Each method is one statement, so each is atomic on its own.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::Config;
use crate::ids::{DocId, ProjectId};
use crate::models::{
    ArchivedDoc, ContentUpdate, DocFilter, DocMeta, DocProjection, DocRecord, Residency,
};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};
use crate::storage::HotStore;

/// SQLite-backed [`HotStore`]
#[derive(Clone)]
pub struct SqliteHotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHotStore {
    /// Open or create the SQLite database
    pub fn open(config: &Config) -> StorageResult<Self> {
        let path = config.sqlite_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a closure against the connection on the blocking pool
    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
    }
}

#[async_trait]
impl HotStore for SqliteHotStore {
    async fn find_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        projection: DocProjection,
    ) -> StorageResult<Option<DocRecord>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM docs WHERE project_id = ? AND doc_id = ?",
                select_columns(projection)
            );
            let row = conn
                .query_row(
                    &sql,
                    params![project_id.to_string(), doc_id.to_string()],
                    |row| DocRow::from_row(row, projection),
                )
                .optional()?;

            row.map(|row| row.into_record(project_id, doc_id)).transpose()
        })
        .await
    }

    async fn upsert_content(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        update: ContentUpdate,
    ) -> StorageResult<Option<i64>> {
        if update.is_empty() {
            return Err(StorageError::InvalidRecord {
                details: format!("empty content update for doc {}", doc_id),
            });
        }

        let lines = update.lines.as_ref().map(serde_json::to_string).transpose()?;
        let ranges = update.ranges.as_ref().map(serde_json::to_string).transpose()?;

        // A shadow record is left alone and no row comes back
        self.run(move |conn| {
            let rev = conn
                .query_row(
                    r#"
                    INSERT INTO docs (project_id, doc_id, lines, ranges, rev)
                    VALUES (?1, ?2, ?3, ?4, 1)
                    ON CONFLICT(project_id, doc_id) DO UPDATE SET
                        lines = COALESCE(excluded.lines, docs.lines),
                        ranges = COALESCE(excluded.ranges, docs.ranges),
                        rev = docs.rev + 1
                    WHERE docs.in_cold_storage = 0
                    RETURNING rev
                    "#,
                    params![project_id.to_string(), doc_id.to_string(), lines, ranges],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(rev)
        })
        .await
    }

    async fn get_doc_version(&self, doc_id: DocId) -> StorageResult<i64> {
        self.run(move |conn| {
            let version: Option<i64> = conn
                .query_row(
                    "SELECT version FROM doc_ops WHERE doc_id = ?",
                    params![doc_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(version.unwrap_or(0))
        })
        .await
    }

    async fn set_doc_version(&self, doc_id: DocId, version: i64) -> StorageResult<()> {
        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO doc_ops (doc_id, version) VALUES (?1, ?2)
                ON CONFLICT(doc_id) DO UPDATE SET version = excluded.version
                "#,
                params![doc_id.to_string(), version],
            )?;
            Ok(())
        })
        .await
    }

    async fn patch_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        meta: &DocMeta,
    ) -> StorageResult<bool> {
        let meta = meta.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE docs SET
                    name = COALESCE(?3, name),
                    deleted = COALESCE(?4, deleted),
                    deleted_at = COALESCE(?5, deleted_at)
                WHERE project_id = ?1 AND doc_id = ?2
                "#,
                params![
                    project_id.to_string(),
                    doc_id.to_string(),
                    meta.name,
                    meta.deleted,
                    meta.deleted_at.map(|ts| ts.timestamp_millis()),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn mark_archived(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        rev: i64,
    ) -> StorageResult<bool> {
        self.run(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE docs SET lines = NULL, ranges = NULL, in_cold_storage = 1
                WHERE project_id = ?1 AND doc_id = ?2 AND rev = ?3 AND in_cold_storage = 0
                "#,
                params![project_id.to_string(), doc_id.to_string(), rev],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn restore_archived(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        archived: &ArchivedDoc,
    ) -> StorageResult<bool> {
        let lines = serde_json::to_string(&archived.lines)?;
        let ranges = serde_json::to_string(&archived.ranges)?;
        let rev = archived.rev;

        self.run(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE docs SET lines = ?3, ranges = ?4, in_cold_storage = 0
                WHERE project_id = ?1 AND doc_id = ?2 AND rev = ?5 AND in_cold_storage = 1
                "#,
                params![project_id.to_string(), doc_id.to_string(), lines, ranges, rev],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_docs(
        &self,
        project_id: ProjectId,
        filter: DocFilter,
        projection: DocProjection,
    ) -> StorageResult<Vec<DocRecord>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM docs WHERE project_id = ? AND COALESCE(deleted, 0) = ? ORDER BY rowid",
                select_columns(projection)
            );
            let deleted = matches!(filter, DocFilter::DeletedOnly);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![project_id.to_string(), deleted], |row| {
                    let doc_id: String = row.get("doc_id")?;
                    Ok((doc_id, DocRow::from_row(row, projection)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(doc_id, row)| row.into_record(project_id, parse_doc_id(&doc_id)?))
                .collect()
        })
        .await
    }

    async fn list_doc_ids(
        &self,
        project_id: ProjectId,
        residency: Residency,
    ) -> StorageResult<Vec<DocId>> {
        self.run(move |conn| {
            let cold = residency == Residency::ColdShadow;
            let mut stmt = conn.prepare(
                "SELECT doc_id FROM docs WHERE project_id = ? AND in_cold_storage = ? ORDER BY rowid",
            )?;
            let ids = stmt
                .query_map(params![project_id.to_string(), cold], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;

            ids.iter().map(|id| parse_doc_id(id)).collect()
        })
        .await
    }
}

// ==================== Row mapping ====================

/// Raw column values for one `docs` row
struct DocRow {
    lines: Option<String>,
    ranges: Option<String>,
    rev: Option<i64>,
    deleted: Option<bool>,
    name: Option<String>,
    deleted_at: Option<i64>,
    in_cold_storage: bool,
}

impl DocRow {
    fn from_row(row: &Row<'_>, projection: DocProjection) -> rusqlite::Result<Self> {
        Ok(Self {
            lines: if projection.lines { row.get("lines")? } else { None },
            ranges: if projection.ranges { row.get("ranges")? } else { None },
            rev: if projection.rev { Some(row.get("rev")?) } else { None },
            deleted: if projection.deleted { row.get("deleted")? } else { None },
            name: if projection.meta { row.get("name")? } else { None },
            deleted_at: if projection.meta { row.get("deleted_at")? } else { None },
            in_cold_storage: row.get("in_cold_storage")?,
        })
    }

    fn into_record(self, project_id: ProjectId, doc_id: DocId) -> StorageResult<DocRecord> {
        let lines = self
            .lines
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;
        let ranges = self
            .ranges
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;

        Ok(DocRecord {
            project_id,
            doc_id,
            lines,
            ranges,
            rev: self.rev,
            version: None,
            deleted: self.deleted,
            name: self.name,
            deleted_at: self.deleted_at.and_then(DateTime::<Utc>::from_timestamp_millis),
            in_cold_storage: self.in_cold_storage,
        })
    }
}

/// Column list for a projection
fn select_columns(projection: DocProjection) -> String {
    let mut columns = vec!["doc_id", "in_cold_storage"];
    if projection.lines {
        columns.push("lines");
    }
    if projection.ranges {
        columns.push("ranges");
    }
    if projection.rev {
        columns.push("rev");
    }
    if projection.deleted {
        columns.push("deleted");
    }
    if projection.meta {
        columns.push("name");
        columns.push("deleted_at");
    }
    columns.join(", ")
}

fn parse_doc_id(raw: &str) -> StorageResult<DocId> {
    raw.parse().map_err(|_| StorageError::InvalidRecord {
        details: format!("invalid doc id '{}'", raw),
    })
}
