//! Errors returned by the document manager
//!
//! `NotFound`, `InvalidInput` and `DocModified` are ordinary outcomes that
//! callers are expected to handle. `Storage` wraps a failure from either
//! tier and is passed through unchanged.

use thiserror::Error;
use tracing::error;

use crate::ids::{DocId, ProjectId};
use crate::ranges::RangesError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum DocstoreError {
    #[error("No such doc: {doc_id} in project {project_id}")]
    NotFound { project_id: ProjectId, doc_id: DocId },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The document changed while it was being read; retry the read
    #[error("Doc {doc_id} in project {project_id} was modified while it was being read")]
    DocModified { project_id: ProjectId, doc_id: DocId },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DocstoreError {
    pub fn not_found(project_id: ProjectId, doc_id: DocId) -> Self {
        DocstoreError::NotFound { project_id, doc_id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DocstoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DocstoreError::DocModified { .. })
    }

    /// Storage failures are unexpected; everything else is a normal outcome
    pub fn is_storage(&self) -> bool {
        matches!(self, DocstoreError::Storage(_))
    }
}

impl From<RangesError> for DocstoreError {
    fn from(err: RangesError) -> Self {
        DocstoreError::InvalidInput(err.to_string())
    }
}

/// Result type for document manager operations
pub type DocstoreResult<T> = Result<T, DocstoreError>;

/// Log a storage failure with the document's identity and wrap it
pub(crate) fn storage_failure(
    project_id: ProjectId,
    doc_id: DocId,
    context: &'static str,
) -> impl FnOnce(StorageError) -> DocstoreError {
    move |err| {
        error!(%project_id, %doc_id, error = %err, "{}", context);
        DocstoreError::Storage(err)
    }
}

/// Log a failed operation, but only if it is a storage failure
///
/// Not-found and invalid-input outcomes pass through silently.
pub(crate) fn log_failure(
    project_id: ProjectId,
    doc_id: DocId,
    context: &'static str,
) -> impl FnOnce(DocstoreError) -> DocstoreError {
    move |err| {
        if err.is_storage() {
            error!(%project_id, %doc_id, error = %err, "{}", context);
        }
        err
    }
}
