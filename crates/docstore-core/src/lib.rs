//! Docstore Core Library
//!
//! A tiered document store: actively edited documents live in a fast hot
//! store, idle ones are moved to a cold archive and transparently brought
//! back on read.
//!
//! # Architecture
//!
//! - **Hot store** (SQLite): per-document records, a content `rev` counter
//!   and a separate edit version counter
//! - **Cold archive** (JSON files): one blob per archived document
//!
//! An archived document keeps a shadow record in the hot store (identity and
//! flags only), so lookups never need to consult the archive to find out
//! whether a document exists.
//!
//! # Quick Start
//!
//! ```text
//! let manager = DocManager::open(&Config::load()?)?;
//!
//! // Write a document
//! let outcome = manager
//!     .update_doc(project_id, doc_id, DocUpdate::new(lines, 1, RangesJson::default()))
//!     .await?;
//!
//! // Read it back, unarchiving if needed
//! let doc = manager.get_full_doc(project_id, doc_id).await?;
//! ```
//!
//! # Modules
//!
//! - `manager`: Read, write and patch operations (main entry point)
//! - `archiver`: Moving documents between tiers
//! - `worker`: Background archiving of soft-deleted documents
//! - `storage`: Hot store and cold archive implementations
//! - `models`: Records, projections and request types
//! - `ranges`: Tracked changes and comments
//! - `config`: Application configuration

pub mod archiver;
pub mod config;
pub mod diff;
pub mod error;
pub mod ids;
pub mod manager;
pub mod models;
pub mod ranges;
pub mod storage;
pub mod worker;

pub use archiver::{DocArchiver, RetryPolicy};
pub use config::Config;
pub use error::{DocstoreError, DocstoreResult};
pub use ids::{DocId, ProjectId};
pub use manager::{DocManager, MAX_UNARCHIVE_ROUNDS};
pub use models::{
    ArchivedDoc, DocFilter, DocMeta, DocProjection, DocRecord, DocUpdate, Document, Residency,
    UpdateOutcome,
};
pub use ranges::{Ranges, RangesJson};
pub use storage::{ColdArchive, FileArchive, HotStore, SqliteHotStore, StorageError};
