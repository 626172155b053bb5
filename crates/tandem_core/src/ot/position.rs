//! Row/column points and spans over a line-oriented document.
//!
//! Positions are totally ordered row-first, then column, which is exactly the
//! derived ordering for the field order below. All predicates here are
//! inclusive on both ends; the transform engine layers its own half-open
//! treatment on top where deletions touch without overlapping.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A point in a document, addressed by line and column.
///
/// Columns count Unicode scalar values, not bytes, so both sides of the wire
/// agree on offsets regardless of encoding.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Zero-based line index
    pub row: u32,
    /// Zero-based character offset within the line
    pub column: u32,
}

impl Position {
    /// Create a position from a row and column.
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Return this position offset by `rows` and `columns`, clamped at zero.
    ///
    /// The column offset is only meaningful when the shift is known to happen
    /// on the same row as `self`; callers pass 0 otherwise.
    pub fn shifted(self, rows: i64, columns: i64) -> Self {
        Self {
            row: (self.row as i64 + rows).max(0) as u32,
            column: (self.column as i64 + columns).max(0) as u32,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

/// A span between two positions, `start <= end`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct Range {
    /// First position covered by the span
    pub start: Position,
    /// Last position covered by the span
    pub end: Position,
}

impl Range {
    /// Create a range from two positions, normalizing their order.
    pub fn new(a: Position, b: Position) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// True if the range covers no text at all.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if `p` lies within the range, both ends inclusive.
    pub fn contains_point(&self, p: Position) -> bool {
        self.start <= p && p <= self.end
    }

    /// True if `other` lies entirely within this range, ends inclusive.
    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True if the two ranges share at least one point, ends inclusive.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}
