//! Filesystem cold archive
//!
//! Each archived document is one JSON blob. Writes are atomic (write to a
//! temp file, sync, then rename), so a reader never sees a partial blob and
//! an interrupted archive leaves the previous copy in place. A blob is never
//! replaced by one with a lower `rev`.
//!
//! Layout: `<archive_dir>/<project_id>/<doc_id>.json`

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::ids::{DocId, ProjectId};
use crate::models::{ArchivedDoc, ARCHIVE_SCHEMA_VERSION};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::ColdArchive;

/// Filesystem-backed [`ColdArchive`]
#[derive(Debug, Clone)]
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    /// Create an archive rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.archive_dir())
    }

    /// Path of the blob for a document
    pub fn blob_path(&self, project_id: ProjectId, doc_id: DocId) -> PathBuf {
        self.root
            .join(project_id.to_string())
            .join(format!("{}.json", doc_id))
    }
}

#[async_trait]
impl ColdArchive for FileArchive {
    async fn is_archived(&self, project_id: ProjectId, doc_id: DocId) -> StorageResult<bool> {
        let path = self.blob_path(project_id, doc_id);
        fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::from_read(e, path))
    }

    async fn retrieve(&self, project_id: ProjectId, doc_id: DocId) -> StorageResult<ArchivedDoc> {
        let path = self.blob_path(project_id, doc_id);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::ArchiveMissing { project_id, doc_id });
            }
            Err(e) => return Err(StorageError::from_read(e, path)),
        };

        let archived: ArchivedDoc =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::InvalidFormat {
                path: path.clone(),
                details: e.to_string(),
            })?;

        if archived.schema_v != ARCHIVE_SCHEMA_VERSION {
            return Err(StorageError::InvalidFormat {
                path,
                details: format!("unsupported schema_v {}", archived.schema_v),
            });
        }

        Ok(archived)
    }

    async fn store(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        archived: &ArchivedDoc,
    ) -> StorageResult<()> {
        // An unreadable existing blob is replaced
        if let Ok(existing) = self.retrieve(project_id, doc_id).await {
            if existing.rev > archived.rev {
                debug!(
                    %project_id,
                    %doc_id,
                    stored_rev = existing.rev,
                    rev = archived.rev,
                    "archive already holds a newer rev, keeping it"
                );
                return Ok(());
            }
        }

        let bytes = serde_json::to_vec(archived)?;
        atomic_write(&self.blob_path(project_id, doc_id), &bytes).await
    }
}

/// Write data to a file atomically
///
/// 1. Write to a uniquely named temp file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
async fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    // Unique per writer, so two concurrent archives of one doc never share a temp file
    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .await
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StorageError::from_io(e, path.to_path_buf()));
    }

    Ok(())
}
