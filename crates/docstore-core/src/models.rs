//! Data models for docstore
//!
//! Defines the document record as the hot store sees it, the fully
//! resolved document handed to callers, and the request types for writes
//! and metadata patches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocId, ProjectId};
use crate::ranges::{Ranges, RangesJson};

/// Which tier holds the authoritative copy of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Residency {
    /// All fields live in the hot store
    Hot,
    /// The hot store keeps identity and flags only; content is in the archive
    ColdShadow,
}

/// Fields requested from the hot store
///
/// `in_cold_storage` is always read, so every lookup can tell whether the
/// record is a shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocProjection {
    pub lines: bool,
    pub ranges: bool,
    pub rev: bool,
    pub version: bool,
    pub deleted: bool,
    pub meta: bool,
}

impl DocProjection {
    /// Everything the read path returns
    pub const FULL: Self = Self {
        lines: true,
        ranges: true,
        rev: true,
        version: true,
        deleted: true,
        meta: false,
    };

    /// Only the text lines
    pub const LINES: Self = Self {
        lines: true,
        ranges: false,
        rev: false,
        version: false,
        deleted: false,
        meta: false,
    };

    /// Existence plus the soft-delete flag
    pub const DELETED: Self = Self {
        lines: false,
        ranges: false,
        rev: false,
        version: false,
        deleted: true,
        meta: false,
    };

    /// Only the content revision
    pub const REV: Self = Self {
        lines: false,
        ranges: false,
        rev: true,
        version: false,
        deleted: false,
        meta: false,
    };

    /// Name and deletion metadata, for trash listings
    pub const META: Self = Self {
        lines: false,
        ranges: false,
        rev: false,
        version: false,
        deleted: true,
        meta: true,
    };
}

/// A document as stored in the hot tier, restricted to a projection
///
/// Fields that were not requested, or that a shadow record does not carry,
/// are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    pub project_id: ProjectId,
    pub doc_id: DocId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Ranges>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub in_cold_storage: bool,
}

impl DocRecord {
    /// An empty record carrying only identity
    pub fn new(project_id: ProjectId, doc_id: DocId) -> Self {
        Self {
            project_id,
            doc_id,
            lines: None,
            ranges: None,
            rev: None,
            version: None,
            deleted: None,
            name: None,
            deleted_at: None,
            in_cold_storage: false,
        }
    }

    /// Current tier of this record
    pub fn residency(&self) -> Residency {
        if self.in_cold_storage {
            Residency::ColdShadow
        } else {
            Residency::Hot
        }
    }

    /// Soft-delete flag, with an absent flag reported as `false`
    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}

/// A fully resolved, hot-resident document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub project_id: ProjectId,
    pub doc_id: DocId,
    pub lines: Vec<String>,
    pub ranges: Ranges,
    pub rev: i64,
    pub version: i64,
    pub deleted: bool,
}

/// Content written in a single atomic hot-store update
///
/// Fields that are `None` are left untouched. The store bumps `rev` as
/// part of the same update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentUpdate {
    pub lines: Option<Vec<String>>,
    pub ranges: Option<Ranges>,
}

impl ContentUpdate {
    pub fn is_empty(&self) -> bool {
        self.lines.is_none() && self.ranges.is_none()
    }
}

/// A write request as received from a caller
///
/// All three fields are required; they are optional here so that a missing
/// one can be reported as invalid input instead of failing to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocUpdate {
    #[serde(default)]
    pub lines: Option<Vec<String>>,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub ranges: Option<RangesJson>,
}

impl DocUpdate {
    /// Build a complete update
    pub fn new(lines: Vec<String>, version: i64, ranges: RangesJson) -> Self {
        Self {
            lines: Some(lines),
            version: Some(version),
            ranges: Some(ranges),
        }
    }
}

/// Result of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// Whether anything was persisted
    pub modified: bool,
    /// Content revision after the write
    pub rev: i64,
}

/// Partial metadata merged into a hot-store record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocMeta {
    /// Metadata for soft deleting a document now
    pub fn soft_delete(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            deleted: Some(true),
            deleted_at: Some(Utc::now()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.deleted.is_none() && self.deleted_at.is_none()
    }

    /// True when applying this patch soft deletes the document
    pub fn marks_deleted(&self) -> bool {
        self.deleted == Some(true)
    }
}

/// Which records a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFilter {
    NonDeleted,
    DeletedOnly,
}

/// Current archive blob schema
pub const ARCHIVE_SCHEMA_VERSION: u32 = 1;

/// Content stored in the cold archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedDoc {
    pub schema_v: u32,
    pub lines: Vec<String>,
    #[serde(default)]
    pub ranges: Ranges,
    pub rev: i64,
}

impl ArchivedDoc {
    pub fn new(lines: Vec<String>, ranges: Ranges, rev: i64) -> Self {
        Self {
            schema_v: ARCHIVE_SCHEMA_VERSION,
            lines,
            ranges,
            rev,
        }
    }
}
