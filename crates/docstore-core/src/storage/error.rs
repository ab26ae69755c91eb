//! Storage error handling
//!
//! Provides typed errors for hot store and archive operations with
//! descriptive messages and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::ids::{DocId, ProjectId};

/// Errors that can occur in either storage tier
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create a storage directory
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Archive blob exists but cannot be parsed
    #[error("Invalid archive format in '{path}': {details}")]
    InvalidFormat { path: PathBuf, details: String },

    /// Archive blob is missing for a document flagged as archived
    #[error("No archived copy of doc {doc_id} in project {project_id}")]
    ArchiveMissing { project_id: ProjectId, doc_id: DocId },

    /// Hot-store row is missing fields it must have, or cannot be decoded
    #[error("Invalid record: {details}")]
    InvalidRecord { details: String },

    /// Hot-store rev no longer matches the archived copy being restored
    #[error("Rev mismatch restoring doc {doc_id}: archive has rev {archived_rev}")]
    RevMismatch { doc_id: DocId, archived_rev: i64 },

    /// Document stayed in cold storage after repeated unarchive attempts
    #[error("Doc {doc_id} is still archived after {attempts} unarchive attempts")]
    StillArchived { doc_id: DocId, attempts: u32 },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON column or blob could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A thread panicked while holding the connection lock
    #[error("Database connection lock poisoned")]
    LockPoisoned,

    /// Blocking task was cancelled or panicked
    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Classify an I/O error raised while reading
    pub fn from_read(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ => StorageError::ReadError {
                path,
                source: error,
            },
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::ReadError { .. }
            | StorageError::WriteError { .. }
            | StorageError::TaskFailed(_) => true,
            StorageError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions. You may need to run with different permissions or change ownership.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StorageError::ArchiveMissing { .. } | StorageError::InvalidFormat { .. } => {
                Some("The archived copy is unreadable. Restore the archive directory from backup.")
            }
            StorageError::RevMismatch { .. } | StorageError::StillArchived { .. } => {
                Some("The document changed while being moved between tiers. Retry the request.")
            }
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
