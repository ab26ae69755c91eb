//! Moving documents between the hot store and the cold archive
//!
//! Archiving writes the blob first and only then drops the hot content,
//! guarded by `rev`. Unarchiving restores the content and clears the shadow
//! flag, guarded the same way. Neither direction changes `rev`: relocation
//! is not an edit.
//!
//! Archives of the same document are serialized within one archiver, so
//! a slower archive of an older `rev` can never replace a newer blob.
//!
//! Store errors are returned unlogged; the caller decides how loud a
//! failure is.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt, TryStreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{DocstoreError, DocstoreResult};
use crate::ids::{DocId, ProjectId};
use crate::models::{ArchivedDoc, DocProjection, Residency};
use crate::storage::{ColdArchive, HotStore, StorageError, StorageResult};

/// Retry schedule for transient archive reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.unarchive_max_attempts.max(1),
            initial_delay: config.retry_initial_delay(),
            ..Self::default()
        }
    }
}

/// Lock stripes shared by every document an archiver handles
const ARCHIVE_LOCK_STRIPES: usize = 64;

/// Archives and restores documents across the two tiers
pub struct DocArchiver {
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdArchive>,
    retry: RetryPolicy,
    parallel_jobs: usize,
    archive_locks: Vec<Mutex<()>>,
}

impl DocArchiver {
    pub fn new(
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdArchive>,
        retry: RetryPolicy,
        parallel_jobs: usize,
    ) -> Self {
        Self {
            hot,
            cold,
            retry,
            parallel_jobs: parallel_jobs.max(1),
            archive_locks: (0..ARCHIVE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn from_config(
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdArchive>,
        config: &Config,
    ) -> Self {
        Self::new(
            hot,
            cold,
            RetryPolicy::from_config(config),
            config.parallel_archive_jobs,
        )
    }

    /// Move a hot document's content into the archive
    ///
    /// A no-op for a document that is already shadow-resident. If the
    /// document is written while the blob is being stored, it stays hot and
    /// the blob is overwritten by the next archive.
    pub async fn archive_doc_by_id(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
    ) -> DocstoreResult<()> {
        let _guard = self.archive_lock(project_id, doc_id).lock().await;

        let record = self
            .hot
            .find_doc(project_id, doc_id, DocProjection::FULL)
            .await?
            .ok_or_else(|| DocstoreError::not_found(project_id, doc_id))?;

        if record.in_cold_storage {
            debug!(%project_id, %doc_id, "doc is already archived");
            return Ok(());
        }

        let lines = record.lines.ok_or_else(|| StorageError::InvalidRecord {
            details: format!("doc {} has no lines to archive", doc_id),
        })?;
        let rev = record.rev.unwrap_or(0);
        let archived = ArchivedDoc::new(lines, record.ranges.unwrap_or_default(), rev);

        self.cold.store(project_id, doc_id, &archived).await?;

        if self.hot.mark_archived(project_id, doc_id, rev).await? {
            debug!(%project_id, %doc_id, rev, "archived doc");
        } else {
            debug!(%project_id, %doc_id, rev, "doc changed while archiving, leaving it hot");
        }

        Ok(())
    }

    /// Restore an archived document into the hot store
    ///
    /// A no-op for a document that is already hot, including one restored
    /// by a concurrent caller.
    pub async fn unarchive_doc(&self, project_id: ProjectId, doc_id: DocId) -> DocstoreResult<()> {
        let record = self
            .hot
            .find_doc(project_id, doc_id, DocProjection::REV)
            .await?
            .ok_or_else(|| DocstoreError::not_found(project_id, doc_id))?;

        if !record.in_cold_storage {
            debug!(%project_id, %doc_id, "doc is not archived");
            return Ok(());
        }

        let archived = self.retrieve_with_retry(project_id, doc_id).await?;

        if self
            .hot
            .restore_archived(project_id, doc_id, &archived)
            .await?
        {
            debug!(%project_id, %doc_id, rev = archived.rev, "unarchived doc");
            return Ok(());
        }

        // Nothing matched: either someone else restored it first, or the
        // shadow no longer agrees with the blob
        match self
            .hot
            .find_doc(project_id, doc_id, DocProjection::REV)
            .await?
        {
            None => Err(DocstoreError::not_found(project_id, doc_id)),
            Some(current) if !current.in_cold_storage => {
                debug!(%project_id, %doc_id, "doc was unarchived concurrently");
                Ok(())
            }
            Some(_) => Err(StorageError::RevMismatch {
                doc_id,
                archived_rev: archived.rev,
            }
            .into()),
        }
    }

    /// Read an archived document without touching the hot store
    pub async fn get_archived_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
    ) -> DocstoreResult<ArchivedDoc> {
        Ok(self.retrieve_with_retry(project_id, doc_id).await?)
    }

    /// Unarchive every shadow-resident document in a project
    pub async fn unarchive_all_docs(&self, project_id: ProjectId) -> DocstoreResult<usize> {
        let doc_ids = self
            .hot
            .list_doc_ids(project_id, Residency::ColdShadow)
            .await?;
        if doc_ids.is_empty() {
            return Ok(0);
        }

        debug!(%project_id, count = doc_ids.len(), "unarchiving docs");
        let count = doc_ids.len();

        stream::iter(doc_ids)
            .map(|doc_id| async move {
                match self.unarchive_doc(project_id, doc_id).await {
                    // Removed since it was listed
                    Err(err) if err.is_not_found() => Ok(()),
                    other => other,
                }
            })
            .buffer_unordered(self.parallel_jobs)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(count)
    }

    /// Archive every hot document in a project
    pub async fn archive_all_docs(&self, project_id: ProjectId) -> DocstoreResult<usize> {
        let doc_ids = self.hot.list_doc_ids(project_id, Residency::Hot).await?;
        if doc_ids.is_empty() {
            return Ok(0);
        }

        debug!(%project_id, count = doc_ids.len(), "archiving docs");
        let count = doc_ids.len();

        stream::iter(doc_ids)
            .map(|doc_id| async move {
                match self.archive_doc_by_id(project_id, doc_id).await {
                    Err(err) if err.is_not_found() => Ok(()),
                    other => other,
                }
            })
            .buffer_unordered(self.parallel_jobs)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(count)
    }

    fn archive_lock(&self, project_id: ProjectId, doc_id: DocId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        (project_id, doc_id).hash(&mut hasher);
        let stripe = (hasher.finish() % self.archive_locks.len() as u64) as usize;
        &self.archive_locks[stripe]
    }

    /// Read from the archive, retrying transient failures with backoff
    async fn retrieve_with_retry(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
    ) -> StorageResult<ArchivedDoc> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 1;

        loop {
            match self.cold.retrieve(project_id, doc_id).await {
                Ok(archived) => return Ok(archived),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        %project_id,
                        %doc_id,
                        attempt,
                        error = %err,
                        "archive read failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max_delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
