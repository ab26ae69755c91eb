//! Document manager
//!
//! The entry point callers use. Reads transparently promote archived
//! documents back into the hot store (except [`DocManager::peek_doc`]),
//! writes only touch the fields that actually changed, and soft deletes can
//! trigger a background archive.

use std::sync::Arc;

use tracing::{debug, error};

use crate::archiver::DocArchiver;
use crate::config::Config;
use crate::diff::DirtyFields;
use crate::error::{log_failure, storage_failure, DocstoreError, DocstoreResult};
use crate::ids::{DocId, ProjectId};
use crate::models::{
    ContentUpdate, DocFilter, DocMeta, DocProjection, DocRecord, DocUpdate, Document,
    UpdateOutcome,
};
use crate::ranges;
use crate::storage::{ColdArchive, FileArchive, HotStore, SqliteHotStore, StorageError};
use crate::worker::{spawn_archive_worker, ArchiveWorkerHandle};

/// Unarchive rounds before a read gives up on a document that keeps
/// getting re-archived
pub const MAX_UNARCHIVE_ROUNDS: u32 = 3;

/// Tiered document manager over a hot store and a cold archive
pub struct DocManager {
    hot: Arc<dyn HotStore>,
    archiver: Arc<DocArchiver>,
    archive_worker: Option<ArchiveWorkerHandle>,
}

impl DocManager {
    /// Open the SQLite hot store and file archive under the configured data dir
    ///
    /// Must be called inside a tokio runtime when `archive_on_soft_delete`
    /// is enabled, since the background worker is spawned here.
    pub fn open(config: &Config) -> DocstoreResult<Self> {
        let hot = Arc::new(SqliteHotStore::open(config)?);
        let cold = Arc::new(FileArchive::from_config(config));
        Ok(Self::new(hot, cold, config))
    }

    /// Build a manager over arbitrary store implementations
    pub fn new(hot: Arc<dyn HotStore>, cold: Arc<dyn ColdArchive>, config: &Config) -> Self {
        let archiver = Arc::new(DocArchiver::from_config(hot.clone(), cold, config));
        let archive_worker = config
            .archive_on_soft_delete
            .then(|| spawn_archive_worker(archiver.clone(), config.archive_queue_capacity));

        Self {
            hot,
            archiver,
            archive_worker,
        }
    }

    /// Full document, unarchiving it first if needed
    pub async fn get_full_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
    ) -> DocstoreResult<Document> {
        let record = self.get_doc(project_id, doc_id, DocProjection::FULL).await?;
        into_document(record)
    }

    /// Just the lines, unarchiving the document first if needed
    pub async fn get_doc_lines(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
    ) -> DocstoreResult<Vec<String>> {
        let record = self
            .get_doc(project_id, doc_id, DocProjection::LINES)
            .await?;
        record.lines.ok_or_else(|| missing_lines(doc_id))
    }

    /// Full document without promoting an archived copy back to the hot store
    ///
    /// Fails with [`DocstoreError::DocModified`] if the document is written
    /// while it is being read.
    pub async fn peek_doc(&self, project_id: ProjectId, doc_id: DocId) -> DocstoreResult<Document> {
        let mut record = self
            .hot
            .find_doc(project_id, doc_id, DocProjection::FULL)
            .await
            .map_err(storage_failure(project_id, doc_id, "error finding doc"))?
            .ok_or_else(|| DocstoreError::not_found(project_id, doc_id))?;

        if record.in_cold_storage {
            let archived = self
                .archiver
                .get_archived_doc(project_id, doc_id)
                .await
                .map_err(log_failure(project_id, doc_id, "error reading doc from archive"))?;
            record.lines = Some(archived.lines);
            record.ranges = Some(archived.ranges);
        }

        let version = self
            .hot
            .get_doc_version(doc_id)
            .await
            .map_err(storage_failure(project_id, doc_id, "error getting doc version"))?;

        let current = self
            .hot
            .find_doc(project_id, doc_id, DocProjection::REV)
            .await
            .map_err(storage_failure(project_id, doc_id, "error re-checking doc rev"))?;
        match current {
            Some(current) if current.rev == record.rev => {}
            _ => {
                debug!(%project_id, %doc_id, "doc changed during peek");
                return Err(DocstoreError::DocModified { project_id, doc_id });
            }
        }

        record.version = Some(version);
        into_document(record)
    }

    /// Soft-delete flag; absent is reported as `false`
    pub async fn is_doc_deleted(&self, project_id: ProjectId, doc_id: DocId) -> DocstoreResult<bool> {
        let record = self
            .hot
            .find_doc(project_id, doc_id, DocProjection::DELETED)
            .await
            .map_err(storage_failure(project_id, doc_id, "error finding doc"))?
            .ok_or_else(|| DocstoreError::not_found(project_id, doc_id))?;
        Ok(record.is_deleted())
    }

    /// Write lines, ranges and version, touching only what changed
    ///
    /// `rev` is bumped when lines or ranges change; a version-only change
    /// leaves it alone. Creates the document if it does not exist.
    pub async fn update_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        update: DocUpdate,
    ) -> DocstoreResult<UpdateOutcome> {
        let (Some(lines), Some(version), Some(ranges)) =
            (update.lines, update.version, update.ranges)
        else {
            return Err(DocstoreError::InvalidInput(
                "no lines, version or ranges provided".to_string(),
            ));
        };
        let ranges = ranges::normalize(&ranges)?;

        // A document archived between the read and the write is not written;
        // it is unarchived and the update recomputed against it
        for _ in 0..MAX_UNARCHIVE_ROUNDS {
            let current = match self.get_doc(project_id, doc_id, DocProjection::FULL).await {
                Ok(record) => Some(record),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err),
            };

            let dirty = DirtyFields::compute(current.as_ref(), &lines, version, &ranges);
            let mut modified = false;
            let mut rev = current.as_ref().and_then(|c| c.rev).unwrap_or(0);

            if dirty.content() {
                debug!(
                    %project_id,
                    %doc_id,
                    lines = dirty.lines,
                    ranges = dirty.ranges,
                    "updating doc lines and ranges"
                );
                let content = ContentUpdate {
                    lines: dirty.lines.then(|| lines.clone()),
                    ranges: dirty.ranges.then(|| ranges.clone()),
                };
                let written = self
                    .hot
                    .upsert_content(project_id, doc_id, content)
                    .await
                    .map_err(storage_failure(
                        project_id,
                        doc_id,
                        "error updating doc lines and ranges",
                    ))?;
                match written {
                    Some(new_rev) => rev = new_rev,
                    None => {
                        debug!(%project_id, %doc_id, "doc was archived before the write, retrying");
                        continue;
                    }
                }
                modified = true;
            } else {
                debug!(%project_id, %doc_id, "doc lines have not changed, not updating");
            }

            if dirty.version {
                let old_version = current.as_ref().and_then(|c| c.version);
                debug!(%project_id, %doc_id, ?old_version, new_version = version, "updating doc version");
                if let Err(err) = self.hot.set_doc_version(doc_id, version).await {
                    if modified {
                        error!(
                            %project_id,
                            %doc_id,
                            rev,
                            version,
                            error = %err,
                            "doc content was written but the version update failed"
                        );
                    } else {
                        error!(%project_id, %doc_id, version, error = %err, "error updating doc version");
                    }
                    return Err(err.into());
                }
                modified = true;
            } else {
                debug!(%project_id, %doc_id, version, "doc version has not changed, not updating");
            }

            return Ok(UpdateOutcome { modified, rev });
        }

        Err(still_archived(project_id, doc_id))
    }

    /// Merge metadata into an existing document
    ///
    /// A patch that sets `deleted` queues the document for archiving when
    /// `archive_on_soft_delete` is enabled. The patch itself does not wait
    /// for that, and its outcome never depends on it.
    pub async fn patch_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        meta: DocMeta,
    ) -> DocstoreResult<()> {
        self.hot
            .find_doc(project_id, doc_id, DocProjection::DELETED)
            .await
            .map_err(storage_failure(project_id, doc_id, "error finding doc"))?
            .ok_or_else(|| DocstoreError::not_found(project_id, doc_id))?;

        if !meta.is_empty() {
            let matched = self
                .hot
                .patch_doc(project_id, doc_id, &meta)
                .await
                .map_err(storage_failure(project_id, doc_id, "error patching doc"))?;
            if !matched {
                return Err(DocstoreError::not_found(project_id, doc_id));
            }
        }

        if meta.marks_deleted() {
            if let Some(worker) = &self.archive_worker {
                worker.submit(project_id, doc_id);
            }
        }

        Ok(())
    }

    /// Move a document's content to the archive now
    pub async fn archive_doc(&self, project_id: ProjectId, doc_id: DocId) -> DocstoreResult<()> {
        self.archiver
            .archive_doc_by_id(project_id, doc_id)
            .await
            .map_err(log_failure(project_id, doc_id, "error archiving doc"))
    }

    /// Restore an archived document to the hot store
    pub async fn unarchive_doc(&self, project_id: ProjectId, doc_id: DocId) -> DocstoreResult<()> {
        self.archiver
            .unarchive_doc(project_id, doc_id)
            .await
            .map_err(log_failure(project_id, doc_id, "error unarchiving doc"))
    }

    /// Archive every hot document in a project; returns how many were attempted
    pub async fn archive_all_docs(&self, project_id: ProjectId) -> DocstoreResult<usize> {
        self.archiver
            .archive_all_docs(project_id)
            .await
            .inspect_err(|err| {
                if err.is_storage() {
                    error!(%project_id, error = %err, "error archiving project docs");
                }
            })
    }

    /// Restore every archived document in a project; returns how many were attempted
    pub async fn unarchive_all_docs(&self, project_id: ProjectId) -> DocstoreResult<usize> {
        self.archiver
            .unarchive_all_docs(project_id)
            .await
            .inspect_err(|err| {
                if err.is_storage() {
                    error!(%project_id, error = %err, "error unarchiving project docs");
                }
            })
    }

    /// All non-deleted documents, unarchiving the project first
    pub async fn get_all_non_deleted_docs(
        &self,
        project_id: ProjectId,
        projection: DocProjection,
    ) -> DocstoreResult<Vec<DocRecord>> {
        self.unarchive_all_docs(project_id).await?;

        let mut records = self
            .hot
            .list_docs(project_id, DocFilter::NonDeleted, projection)
            .await
            .inspect_err(|err| error!(%project_id, error = %err, "error listing docs"))?;

        if projection.version {
            for record in &mut records {
                record.version = Some(self.hot.get_doc_version(record.doc_id).await.map_err(
                    storage_failure(project_id, record.doc_id, "error getting doc version"),
                )?);
            }
        }

        Ok(records)
    }

    /// Soft-deleted documents with their name and deletion time
    ///
    /// Content is not read, so archived documents stay archived.
    pub async fn get_all_deleted_docs(&self, project_id: ProjectId) -> DocstoreResult<Vec<DocRecord>> {
        Ok(self
            .hot
            .list_docs(project_id, DocFilter::DeletedOnly, DocProjection::META)
            .await
            .inspect_err(|err| error!(%project_id, error = %err, "error listing deleted docs"))?)
    }

    /// Wait for every queued background archive to finish
    pub async fn flush_background_archives(&self) {
        if let Some(worker) = &self.archive_worker {
            worker.flush().await;
        }
    }

    /// Drain queued background archives and stop the worker
    pub async fn shutdown(self) {
        if let Some(worker) = self.archive_worker {
            worker.shutdown().await;
        }
    }

    /// Read a hot record, unarchiving first if it is a shadow
    async fn get_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        projection: DocProjection,
    ) -> DocstoreResult<DocRecord> {
        for _ in 0..MAX_UNARCHIVE_ROUNDS {
            let mut record = self
                .hot
                .find_doc(project_id, doc_id, projection)
                .await
                .map_err(storage_failure(project_id, doc_id, "error finding doc"))?
                .ok_or_else(|| DocstoreError::not_found(project_id, doc_id))?;

            if record.in_cold_storage {
                debug!(%project_id, %doc_id, "doc is archived, unarchiving before read");
                self.unarchive_doc(project_id, doc_id).await?;
                continue;
            }

            // Read after the content so the version is never older than it
            if projection.version {
                record.version = Some(
                    self.hot
                        .get_doc_version(doc_id)
                        .await
                        .map_err(storage_failure(project_id, doc_id, "error getting doc version"))?,
                );
            }
            return Ok(record);
        }

        Err(still_archived(project_id, doc_id))
    }
}

fn still_archived(project_id: ProjectId, doc_id: DocId) -> DocstoreError {
    let err = StorageError::StillArchived {
        doc_id,
        attempts: MAX_UNARCHIVE_ROUNDS,
    };
    error!(%project_id, %doc_id, error = %err, "doc kept getting re-archived");
    err.into()
}

fn missing_lines(doc_id: DocId) -> DocstoreError {
    StorageError::InvalidRecord {
        details: format!("hot doc {} has no lines", doc_id),
    }
    .into()
}

fn into_document(record: DocRecord) -> DocstoreResult<Document> {
    let deleted = record.is_deleted();
    let lines = record.lines.ok_or_else(|| missing_lines(record.doc_id))?;

    Ok(Document {
        project_id: record.project_id,
        doc_id: record.doc_id,
        lines,
        ranges: record.ranges.unwrap_or_default(),
        rev: record.rev.unwrap_or(0),
        version: record.version.unwrap_or(0),
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchivedDoc, Residency};
    use crate::ranges::{ChangeJson, ChangeMetadataJson, ChangeOp, Ranges, RangesJson};
    use crate::storage::StorageResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Hot store that lets a test slip a write into the middle of an operation
    struct RacingHotStore {
        inner: SqliteHotStore,
        write_on_version_read: Mutex<Option<(ProjectId, Vec<String>)>>,
        archive_before_find: Mutex<u32>,
        archive_before_upsert: Mutex<u32>,
        cold: FileArchive,
    }

    impl RacingHotStore {
        fn new(cold: FileArchive) -> Self {
            Self {
                inner: SqliteHotStore::open_in_memory().unwrap(),
                write_on_version_read: Mutex::new(None),
                archive_before_find: Mutex::new(0),
                archive_before_upsert: Mutex::new(0),
                cold,
            }
        }

        /// Archive a hot doc the way a concurrent archiver would
        async fn archive_now(&self, project_id: ProjectId, doc_id: DocId) -> StorageResult<()> {
            if let Some(record) = self
                .inner
                .find_doc(project_id, doc_id, DocProjection::FULL)
                .await?
            {
                if let (false, Some(lines)) = (record.in_cold_storage, record.lines) {
                    let rev = record.rev.unwrap_or(0);
                    let archived = ArchivedDoc::new(lines, record.ranges.unwrap_or_default(), rev);
                    self.cold.store(project_id, doc_id, &archived).await?;
                    self.inner.mark_archived(project_id, doc_id, rev).await?;
                }
            }
            Ok(())
        }
    }

    fn take_one(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock().unwrap();
        let fire = *remaining > 0;
        if fire {
            *remaining -= 1;
        }
        fire
    }

    #[async_trait]
    impl HotStore for RacingHotStore {
        async fn find_doc(
            &self,
            project_id: ProjectId,
            doc_id: DocId,
            projection: DocProjection,
        ) -> StorageResult<Option<DocRecord>> {
            // Re-archive the doc behind the reader's back
            if projection.lines && take_one(&self.archive_before_find) {
                self.archive_now(project_id, doc_id).await?;
            }
            self.inner.find_doc(project_id, doc_id, projection).await
        }

        async fn upsert_content(
            &self,
            project_id: ProjectId,
            doc_id: DocId,
            update: ContentUpdate,
        ) -> StorageResult<Option<i64>> {
            // Archived after the writer loaded it
            if take_one(&self.archive_before_upsert) {
                self.archive_now(project_id, doc_id).await?;
            }
            self.inner.upsert_content(project_id, doc_id, update).await
        }

        async fn get_doc_version(&self, doc_id: DocId) -> StorageResult<i64> {
            let pending = self.write_on_version_read.lock().unwrap().take();
            if let Some((project_id, lines)) = pending {
                self.inner
                    .upsert_content(
                        project_id,
                        doc_id,
                        ContentUpdate {
                            lines: Some(lines),
                            ranges: None,
                        },
                    )
                    .await?;
            }
            self.inner.get_doc_version(doc_id).await
        }

        async fn set_doc_version(&self, doc_id: DocId, version: i64) -> StorageResult<()> {
            self.inner.set_doc_version(doc_id, version).await
        }

        async fn patch_doc(
            &self,
            project_id: ProjectId,
            doc_id: DocId,
            meta: &DocMeta,
        ) -> StorageResult<bool> {
            self.inner.patch_doc(project_id, doc_id, meta).await
        }

        async fn mark_archived(
            &self,
            project_id: ProjectId,
            doc_id: DocId,
            rev: i64,
        ) -> StorageResult<bool> {
            self.inner.mark_archived(project_id, doc_id, rev).await
        }

        async fn restore_archived(
            &self,
            project_id: ProjectId,
            doc_id: DocId,
            archived: &ArchivedDoc,
        ) -> StorageResult<bool> {
            self.inner
                .restore_archived(project_id, doc_id, archived)
                .await
        }

        async fn list_docs(
            &self,
            project_id: ProjectId,
            filter: DocFilter,
            projection: DocProjection,
        ) -> StorageResult<Vec<DocRecord>> {
            self.inner.list_docs(project_id, filter, projection).await
        }

        async fn list_doc_ids(
            &self,
            project_id: ProjectId,
            residency: Residency,
        ) -> StorageResult<Vec<DocId>> {
            self.inner.list_doc_ids(project_id, residency).await
        }
    }

    struct Harness {
        manager: DocManager,
        hot: Arc<SqliteHotStore>,
        cold: Arc<FileArchive>,
        _temp_dir: TempDir,
    }

    fn harness(archive_on_soft_delete: bool) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(temp_dir.path());
        config.archive_on_soft_delete = archive_on_soft_delete;
        config.retry_initial_delay_ms = 1;

        let hot = Arc::new(SqliteHotStore::open_in_memory().unwrap());
        let cold = Arc::new(FileArchive::from_config(&config));
        let manager = DocManager::new(hot.clone(), cold.clone(), &config);

        Harness {
            manager,
            hot,
            cold,
            _temp_dir: temp_dir,
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn update(items: &[&str], version: i64) -> DocUpdate {
        DocUpdate::new(lines(items), version, RangesJson::default())
    }

    #[tokio::test]
    async fn test_update_rev_sequence() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        let first = h
            .manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();
        assert_eq!(first, UpdateOutcome { modified: true, rev: 1 });

        let same = h
            .manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();
        assert_eq!(same, UpdateOutcome { modified: false, rev: 1 });

        let changed = h
            .manager
            .update_doc(project, doc, update(&["a", "b"], 2))
            .await
            .unwrap();
        assert_eq!(changed, UpdateOutcome { modified: true, rev: 2 });

        let full = h.manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.lines, lines(&["a", "b"]));
        assert_eq!(full.rev, 2);
        assert_eq!(full.version, 2);
        assert!(!full.deleted);
    }

    #[tokio::test]
    async fn test_version_only_change_keeps_rev() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();
        let outcome = h
            .manager
            .update_doc(project, doc, update(&["a"], 7))
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome { modified: true, rev: 1 });
        let full = h.manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.version, 7);
        assert_eq!(full.rev, 1);
    }

    #[tokio::test]
    async fn test_ranges_change_bumps_rev() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();

        let ranges = RangesJson {
            changes: Some(vec![ChangeJson {
                id: " ABC123 ".to_string(),
                op: ChangeOp {
                    p: 0,
                    i: Some("a".to_string()),
                    d: None,
                },
                metadata: Some(ChangeMetadataJson {
                    user_id: Some("user-1".to_string()),
                    ts: Some("2024-03-01T10:00:00+02:00".to_string()),
                }),
            }]),
            comments: None,
        };
        let outcome = h
            .manager
            .update_doc(project, doc, DocUpdate::new(lines(&["a"]), 1, ranges.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { modified: true, rev: 2 });

        let full = h.manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.ranges.changes.len(), 1);
        assert_eq!(full.ranges.changes[0].id, "abc123");
        assert_eq!(
            full.ranges.changes[0].ts.unwrap().to_rfc3339(),
            "2024-03-01T08:00:00+00:00"
        );

        // Same ranges again, already normalized on disk
        let again = h
            .manager
            .update_doc(project, doc, DocUpdate::new(lines(&["a"]), 1, ranges))
            .await
            .unwrap();
        assert_eq!(again, UpdateOutcome { modified: false, rev: 2 });
    }

    #[tokio::test]
    async fn test_update_rejects_missing_fields() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        let cases = [
            DocUpdate {
                lines: None,
                ..update(&["a"], 1)
            },
            DocUpdate {
                version: None,
                ..update(&["a"], 1)
            },
            DocUpdate {
                ranges: None,
                ..update(&["a"], 1)
            },
        ];
        for case in cases {
            let err = h.manager.update_doc(project, doc, case).await.unwrap_err();
            assert!(matches!(err, DocstoreError::InvalidInput(_)));
        }

        // Nothing was created
        assert!(h
            .manager
            .get_full_doc(project, doc)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_update_rejects_bad_timestamp() {
        let h = harness(false);
        let ranges = RangesJson {
            changes: Some(vec![ChangeJson {
                id: "c1".to_string(),
                op: ChangeOp {
                    p: 0,
                    i: Some("x".to_string()),
                    d: None,
                },
                metadata: Some(ChangeMetadataJson {
                    user_id: None,
                    ts: Some("yesterday".to_string()),
                }),
            }]),
            comments: None,
        };

        let err = h
            .manager
            .update_doc(
                ProjectId::new(),
                DocId::new(),
                DocUpdate::new(lines(&["x"]), 1, ranges),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocstoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_reads_of_missing_doc_are_not_found() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        assert!(h.manager.get_full_doc(project, doc).await.unwrap_err().is_not_found());
        assert!(h.manager.get_doc_lines(project, doc).await.unwrap_err().is_not_found());
        assert!(h.manager.peek_doc(project, doc).await.unwrap_err().is_not_found());
        assert!(h.manager.is_doc_deleted(project, doc).await.unwrap_err().is_not_found());
        assert!(h
            .manager
            .patch_doc(project, doc, DocMeta::soft_delete("main.tex"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_doc_in_other_project_is_not_found() {
        let h = harness(false);
        let doc = DocId::new();

        h.manager
            .update_doc(ProjectId::new(), doc, update(&["a"], 1))
            .await
            .unwrap();

        assert!(h
            .manager
            .get_full_doc(ProjectId::new(), doc)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_get_unarchives_transparently() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["x", "y"], 3))
            .await
            .unwrap();
        h.manager.archive_doc(project, doc).await.unwrap();
        assert!(h.cold.is_archived(project, doc).await.unwrap());

        let full = h.manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.lines, lines(&["x", "y"]));
        assert_eq!(full.rev, 1);
        assert_eq!(full.version, 3);

        let record = h
            .hot
            .find_doc(project, doc, DocProjection::REV)
            .await
            .unwrap()
            .unwrap();
        assert!(!record.in_cold_storage);
    }

    #[tokio::test]
    async fn test_get_lines_unarchives() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["x"], 1))
            .await
            .unwrap();
        h.manager.archive_doc(project, doc).await.unwrap();

        assert_eq!(
            h.manager.get_doc_lines(project, doc).await.unwrap(),
            lines(&["x"])
        );
        assert_eq!(
            h.hot.list_doc_ids(project, Residency::Hot).await.unwrap(),
            vec![doc]
        );
    }

    #[tokio::test]
    async fn test_peek_leaves_archived_doc_in_place() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["x", "y"], 4))
            .await
            .unwrap();
        h.manager.archive_doc(project, doc).await.unwrap();

        let peeked = h.manager.peek_doc(project, doc).await.unwrap();
        assert_eq!(peeked.lines, lines(&["x", "y"]));
        assert_eq!(peeked.rev, 1);
        assert_eq!(peeked.version, 4);

        let record = h
            .hot
            .find_doc(project, doc, DocProjection::REV)
            .await
            .unwrap()
            .unwrap();
        assert!(record.in_cold_storage);
    }

    #[tokio::test]
    async fn test_peek_hot_doc() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["hot"], 2))
            .await
            .unwrap();

        let peeked = h.manager.peek_doc(project, doc).await.unwrap();
        assert_eq!(peeked.lines, lines(&["hot"]));
        assert_eq!(peeked.version, 2);
    }

    #[tokio::test]
    async fn test_peek_detects_concurrent_write() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_data_dir(temp_dir.path());
        let cold = FileArchive::from_config(&config);
        let racing = Arc::new(RacingHotStore::new(cold.clone()));
        let manager = DocManager::new(racing.clone(), Arc::new(cold), &config);
        let (project, doc) = (ProjectId::new(), DocId::new());

        manager
            .update_doc(project, doc, update(&["before"], 1))
            .await
            .unwrap();

        *racing.write_on_version_read.lock().unwrap() = Some((project, lines(&["after"])));
        let err = manager.peek_doc(project, doc).await.unwrap_err();
        assert!(err.is_conflict());

        // A retry sees the new content
        let peeked = manager.peek_doc(project, doc).await.unwrap();
        assert_eq!(peeked.lines, lines(&["after"]));
        assert_eq!(peeked.rev, 2);
    }

    #[tokio::test]
    async fn test_get_gives_up_on_repeated_rearchive() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(temp_dir.path());
        config.retry_initial_delay_ms = 1;
        let cold = FileArchive::from_config(&config);
        let racing = Arc::new(RacingHotStore::new(cold.clone()));
        let manager = DocManager::new(racing.clone(), Arc::new(cold), &config);
        let (project, doc) = (ProjectId::new(), DocId::new());

        manager
            .update_doc(project, doc, update(&["x"], 1))
            .await
            .unwrap();

        *racing.archive_before_find.lock().unwrap() = MAX_UNARCHIVE_ROUNDS;
        let err = manager.get_full_doc(project, doc).await.unwrap_err();
        assert!(matches!(
            err,
            DocstoreError::Storage(StorageError::StillArchived { attempts: 3, .. })
        ));

        // Once the churn stops the read succeeds
        let full = manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.lines, lines(&["x"]));
    }

    #[tokio::test]
    async fn test_update_survives_archive_before_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(temp_dir.path());
        config.retry_initial_delay_ms = 1;
        let cold = FileArchive::from_config(&config);
        let racing = Arc::new(RacingHotStore::new(cold.clone()));
        let manager = DocManager::new(racing.clone(), Arc::new(cold), &config);
        let (project, doc) = (ProjectId::new(), DocId::new());

        manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();

        *racing.archive_before_upsert.lock().unwrap() = 1;
        let outcome = manager
            .update_doc(project, doc, update(&["a", "b"], 2))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { modified: true, rev: 2 });

        let record = racing
            .inner
            .find_doc(project, doc, DocProjection::FULL)
            .await
            .unwrap()
            .unwrap();
        assert!(!record.in_cold_storage);
        assert_eq!(record.lines, Some(lines(&["a", "b"])));
        assert_eq!(record.ranges, Some(Ranges::default()));
        assert_eq!(record.rev, Some(2));

        let full = manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.lines, lines(&["a", "b"]));
        assert_eq!(full.rev, 2);
        assert_eq!(full.version, 2);
    }

    #[tokio::test]
    async fn test_update_gives_up_when_always_archived() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(temp_dir.path());
        config.retry_initial_delay_ms = 1;
        let cold = FileArchive::from_config(&config);
        let racing = Arc::new(RacingHotStore::new(cold.clone()));
        let manager = DocManager::new(racing.clone(), Arc::new(cold), &config);
        let (project, doc) = (ProjectId::new(), DocId::new());

        manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();

        *racing.archive_before_upsert.lock().unwrap() = MAX_UNARCHIVE_ROUNDS;
        let err = manager
            .update_doc(project, doc, update(&["b"], 2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DocstoreError::Storage(StorageError::StillArchived { .. })
        ));

        // Nothing half-written: the last archived content reads back intact
        let full = manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.lines, lines(&["a"]));
        assert_eq!(full.rev, 1);
        assert_eq!(full.version, 1);
    }

    #[tokio::test]
    async fn test_update_of_archived_doc() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();
        h.manager.archive_doc(project, doc).await.unwrap();

        // Unchanged content against an archived doc is still a no-op
        let same = h
            .manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();
        assert_eq!(same, UpdateOutcome { modified: false, rev: 1 });

        let changed = h
            .manager
            .update_doc(project, doc, update(&["b"], 2))
            .await
            .unwrap();
        assert_eq!(changed, UpdateOutcome { modified: true, rev: 2 });
    }

    #[tokio::test]
    async fn test_patch_and_is_deleted() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();
        assert!(!h.manager.is_doc_deleted(project, doc).await.unwrap());

        h.manager
            .patch_doc(project, doc, DocMeta::soft_delete("chapter1.tex"))
            .await
            .unwrap();
        assert!(h.manager.is_doc_deleted(project, doc).await.unwrap());

        // Without the flag the doc stays hot
        h.manager.flush_background_archives().await;
        let record = h
            .hot
            .find_doc(project, doc, DocProjection::REV)
            .await
            .unwrap()
            .unwrap();
        assert!(!record.in_cold_storage);
    }

    #[tokio::test]
    async fn test_empty_patch_on_existing_doc() {
        let h = harness(false);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["a"], 1))
            .await
            .unwrap();
        h.manager
            .patch_doc(project, doc, DocMeta::default())
            .await
            .unwrap();
        assert!(!h.manager.is_doc_deleted(project, doc).await.unwrap());
    }

    #[tokio::test]
    async fn test_soft_delete_archives_in_background() {
        let h = harness(true);
        let (project, doc) = (ProjectId::new(), DocId::new());

        h.manager
            .update_doc(project, doc, update(&["a", "b"], 1))
            .await
            .unwrap();
        h.manager
            .patch_doc(project, doc, DocMeta::soft_delete("old.tex"))
            .await
            .unwrap();
        h.manager.flush_background_archives().await;

        let record = h
            .hot
            .find_doc(project, doc, DocProjection::FULL)
            .await
            .unwrap()
            .unwrap();
        assert!(record.in_cold_storage);
        assert_eq!(record.lines, None);
        assert!(h.cold.is_archived(project, doc).await.unwrap());

        // Deleted docs can still be read
        let full = h.manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.lines, lines(&["a", "b"]));
        assert!(full.deleted);

        h.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_listing() {
        let h = harness(false);
        let project = ProjectId::new();
        let (kept, archived, deleted) = (DocId::new(), DocId::new(), DocId::new());

        for doc in [kept, archived, deleted] {
            h.manager
                .update_doc(project, doc, update(&["content"], 5))
                .await
                .unwrap();
        }
        h.manager.archive_doc(project, archived).await.unwrap();
        h.manager
            .patch_doc(project, deleted, DocMeta::soft_delete("gone.tex"))
            .await
            .unwrap();
        h.manager.archive_doc(project, deleted).await.unwrap();

        let live = h
            .manager
            .get_all_non_deleted_docs(project, DocProjection::FULL)
            .await
            .unwrap();
        let ids: Vec<DocId> = live.iter().map(|r| r.doc_id).collect();
        assert_eq!(ids, vec![kept, archived]);
        assert!(live
            .iter()
            .all(|r| r.lines == Some(lines(&["content"])) && r.version == Some(5)));

        let trash = h.manager.get_all_deleted_docs(project).await.unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].doc_id, deleted);
        assert_eq!(trash[0].name.as_deref(), Some("gone.tex"));
        assert!(trash[0].deleted_at.is_some());
        assert!(trash[0].lines.is_none());
    }

    #[tokio::test]
    async fn test_archive_all_then_read() {
        let h = harness(false);
        let project = ProjectId::new();
        let docs = [DocId::new(), DocId::new(), DocId::new()];

        for doc in docs {
            h.manager
                .update_doc(project, doc, update(&["body"], 1))
                .await
                .unwrap();
        }

        assert_eq!(h.manager.archive_all_docs(project).await.unwrap(), 3);
        assert_eq!(
            h.hot
                .list_doc_ids(project, Residency::ColdShadow)
                .await
                .unwrap()
                .len(),
            3
        );

        assert_eq!(h.manager.unarchive_all_docs(project).await.unwrap(), 3);
        for doc in docs {
            let peeked = h.manager.peek_doc(project, doc).await.unwrap();
            assert_eq!(peeked.lines, lines(&["body"]));
        }
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_data_dir(temp_dir.path());
        let (project, doc) = (ProjectId::new(), DocId::new());

        {
            let manager = DocManager::open(&config).unwrap();
            manager
                .update_doc(project, doc, update(&["persisted"], 1))
                .await
                .unwrap();
            manager.archive_doc(project, doc).await.unwrap();
            manager.shutdown().await;
        }

        let manager = DocManager::open(&config).unwrap();
        let full = manager.get_full_doc(project, doc).await.unwrap();
        assert_eq!(full.lines, lines(&["persisted"]));
        assert!(config.sqlite_path().exists());
        assert!(config.archive_dir().exists());
    }
}
