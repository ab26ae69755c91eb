//! Tracked changes and comments attached to a document
//!
//! Ranges arrive from editors in a loose wire encoding ([`RangesJson`]):
//! optional arrays, free-form id strings and string timestamps. Before they
//! are compared or stored they are normalized into [`Ranges`], which has
//! canonical ids and parsed timestamps. Two wire payloads that differ only in
//! id casing or timestamp formatting normalize to the same value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while normalizing wire ranges
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangesError {
    #[error("Invalid timestamp '{ts}' on tracked change {id}")]
    InvalidTimestamp { id: String, ts: String },

    #[error("Range entry is missing an id")]
    MissingId,
}

// ==================== Wire encoding ====================

/// Ranges as sent by editors
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RangesJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<ChangeJson>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<CommentJson>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeJson {
    pub id: String,
    pub op: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChangeMetadataJson>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangeMetadataJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentJson {
    pub id: String,
    pub op: CommentOp,
}

// ==================== Normalized encoding ====================

/// Insert or delete at a position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeOp {
    /// Character offset into the document
    pub p: u64,
    /// Inserted text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<String>,
    /// Deleted text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

/// Commented span
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentOp {
    /// Character offset into the document
    pub p: u64,
    /// Commented text
    pub c: String,
    /// Thread id
    pub t: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedChange {
    pub id: String,
    pub op: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub op: CommentOp,
}

/// Normalized ranges, the form that is stored and compared
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ranges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<TrackedChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

impl Ranges {
    /// True when there are neither tracked changes nor comments
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.comments.is_empty()
    }
}

impl From<&Ranges> for RangesJson {
    fn from(ranges: &Ranges) -> Self {
        let changes = ranges
            .changes
            .iter()
            .map(|change| ChangeJson {
                id: change.id.clone(),
                op: change.op.clone(),
                metadata: if change.user_id.is_none() && change.ts.is_none() {
                    None
                } else {
                    Some(ChangeMetadataJson {
                        user_id: change.user_id.clone(),
                        ts: change.ts.map(|ts| ts.to_rfc3339()),
                    })
                },
            })
            .collect::<Vec<_>>();
        let comments = ranges
            .comments
            .iter()
            .map(|comment| CommentJson {
                id: comment.id.clone(),
                op: comment.op.clone(),
            })
            .collect::<Vec<_>>();

        Self {
            changes: (!changes.is_empty()).then_some(changes),
            comments: (!comments.is_empty()).then_some(comments),
        }
    }
}

/// Normalize wire ranges into the stored encoding
pub fn normalize(ranges: &RangesJson) -> Result<Ranges, RangesError> {
    let changes = ranges
        .changes
        .iter()
        .flatten()
        .map(normalize_change)
        .collect::<Result<Vec<_>, _>>()?;

    let comments = ranges
        .comments
        .iter()
        .flatten()
        .map(normalize_comment)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Ranges { changes, comments })
}

fn normalize_change(change: &ChangeJson) -> Result<TrackedChange, RangesError> {
    let id = normalize_id(&change.id)?;
    let metadata = change.metadata.clone().unwrap_or_default();

    let ts = match metadata.ts {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| RangesError::InvalidTimestamp {
                    id: id.clone(),
                    ts: raw,
                })?,
        ),
        None => None,
    };

    Ok(TrackedChange {
        id,
        op: change.op.clone(),
        user_id: metadata.user_id.map(|user| user.trim().to_ascii_lowercase()),
        ts,
    })
}

fn normalize_comment(comment: &CommentJson) -> Result<Comment, RangesError> {
    Ok(Comment {
        id: normalize_id(&comment.id)?,
        op: CommentOp {
            p: comment.op.p,
            c: comment.op.c.clone(),
            t: normalize_id(&comment.op.t)?,
        },
    })
}

fn normalize_id(raw: &str) -> Result<String, RangesError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(RangesError::MissingId);
    }
    Ok(id.to_ascii_lowercase())
}

/// Decide whether incoming ranges differ from what is stored
///
/// An absent stored value counts as empty ranges, so an empty candidate
/// against a never-written value is not a change.
pub fn should_update_ranges(stored: Option<&Ranges>, incoming: &Ranges) -> bool {
    match stored {
        Some(stored) => stored != incoming,
        None => !incoming.is_empty(),
    }
}
