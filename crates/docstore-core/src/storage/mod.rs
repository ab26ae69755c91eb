//! Storage layer
//!
//! The two tiers the document manager sits on top of.
//!
//! ## Architecture
//!
//! - **Hot store** ([`HotStore`]): mutable per-document records with field
//!   projections, a server-side `rev` counter and a separate edit version
//!   counter. Implemented by [`SqliteHotStore`].
//! - **Cold archive** ([`ColdArchive`]): durable blobs keyed by
//!   (project, doc). Implemented by [`FileArchive`].
//!
//! Neither tier offers multi-statement transactions to the layer above;
//! each trait method is individually atomic.

use async_trait::async_trait;

use crate::ids::{DocId, ProjectId};
use crate::models::{ArchivedDoc, ContentUpdate, DocFilter, DocMeta, DocProjection, DocRecord, Residency};

pub mod archive;
pub mod error;
pub mod hot;
pub mod schema;

pub use archive::FileArchive;
pub use error::{StorageError, StorageResult};
pub use hot::SqliteHotStore;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};

/// Fast mutable store for actively edited documents
#[async_trait]
pub trait HotStore: Send + Sync {
    /// Look up a record, reading only the projected fields
    ///
    /// The edit version is never filled in here; read it with
    /// [`HotStore::get_doc_version`].
    async fn find_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        projection: DocProjection,
    ) -> StorageResult<Option<DocRecord>>;

    /// Write the given content fields, creating the record if needed
    ///
    /// `rev` is incremented by the store in the same statement. Returns the
    /// new `rev`, or `None` without writing anything when the record is a
    /// shadow; the caller must unarchive it first.
    async fn upsert_content(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        update: ContentUpdate,
    ) -> StorageResult<Option<i64>>;

    /// Current edit version, 0 when never set
    async fn get_doc_version(&self, doc_id: DocId) -> StorageResult<i64>;

    async fn set_doc_version(&self, doc_id: DocId, version: i64) -> StorageResult<()>;

    /// Merge metadata into an existing record. Returns false if none matched.
    async fn patch_doc(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        meta: &DocMeta,
    ) -> StorageResult<bool>;

    /// Drop content and flag the record as a shadow, if `rev` still matches
    ///
    /// Returns false when the record changed since `rev` was read, in which
    /// case nothing is modified.
    async fn mark_archived(&self, project_id: ProjectId, doc_id: DocId, rev: i64)
        -> StorageResult<bool>;

    /// Put archived content back and clear the shadow flag
    ///
    /// Only applies to a shadow record whose `rev` equals the archive's.
    /// Returns false when no such record matched.
    async fn restore_archived(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        archived: &ArchivedDoc,
    ) -> StorageResult<bool>;

    async fn list_docs(
        &self,
        project_id: ProjectId,
        filter: DocFilter,
        projection: DocProjection,
    ) -> StorageResult<Vec<DocRecord>>;

    /// Ids of every record in the project with the given residency
    async fn list_doc_ids(
        &self,
        project_id: ProjectId,
        residency: Residency,
    ) -> StorageResult<Vec<DocId>>;
}

/// Durable blob store for documents that are not being edited
#[async_trait]
pub trait ColdArchive: Send + Sync {
    async fn is_archived(&self, project_id: ProjectId, doc_id: DocId) -> StorageResult<bool>;

    /// Read an archived document; a missing blob is `ArchiveMissing`
    async fn retrieve(&self, project_id: ProjectId, doc_id: DocId) -> StorageResult<ArchivedDoc>;

    /// Write (or overwrite) an archived document
    ///
    /// An existing blob with a higher `rev` is kept.
    async fn store(
        &self,
        project_id: ProjectId,
        doc_id: DocId,
        archived: &ArchivedDoc,
    ) -> StorageResult<()>;
}
