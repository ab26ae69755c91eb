//! Dirty-field detection for writes
//!
//! Compares an incoming write against the stored record and reports which
//! fields actually changed. Only dirty fields are rewritten, and `rev` only
//! moves when lines or ranges are dirty.

use crate::models::DocRecord;
use crate::ranges::{should_update_ranges, Ranges};

/// Per-field result of comparing a write against stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFields {
    pub lines: bool,
    pub ranges: bool,
    pub version: bool,
}

impl DirtyFields {
    /// Every field dirty, used when the document does not exist yet
    pub const ALL: Self = Self {
        lines: true,
        ranges: true,
        version: true,
    };

    /// Compare candidate state against the current record
    ///
    /// `current` is `None` when the document has never been written.
    pub fn compute(
        current: Option<&DocRecord>,
        lines: &[String],
        version: i64,
        ranges: &Ranges,
    ) -> Self {
        let Some(current) = current else {
            return Self::ALL;
        };

        Self {
            lines: current.lines.as_deref() != Some(lines),
            ranges: should_update_ranges(current.ranges.as_ref(), ranges),
            version: current.version != Some(version),
        }
    }

    /// Lines or ranges changed, so a content write (and rev bump) is needed
    pub fn content(&self) -> bool {
        self.lines || self.ranges
    }

    pub fn any(&self) -> bool {
        self.content() || self.version
    }
}
