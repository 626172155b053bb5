//! The edit operation model.
//!
//! An edit is either an insertion of a block of lines at a point, or a
//! deletion of a span. Deletions record the text they removed because the
//! transform engine needs it to compute row and column shifts; it is not
//! redundant bookkeeping.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{Result, TandemError};
use crate::ot::position::{Position, Range};

/// Stable, globally comparable replica identifier.
///
/// Allocated by the sequencer when a replica connects and delivered in the
/// initial snapshot. Two replicas comparing the same pair of ids always agree
/// on which is lower, which is what makes insertion tie-breaks deterministic.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub struct SiteId(pub u64);

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single edit against a line-oriented document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Insert `lines` at `start`. A single-element `lines` inserts within one
    /// row; each additional element starts a new row.
    Insert {
        /// Point the text is inserted at
        start: Position,
        /// The inserted text as a block of lines
        lines: Vec<String>,
    },
    /// Delete the text covered by `range`. `lines` records the removed text.
    Delete {
        /// Span of the removed text
        range: Range,
        /// The removed text as a block of lines
        lines: Vec<String>,
    },
}

/// Character length of a line (Unicode scalar values, not bytes).
pub(crate) fn char_len(s: &str) -> u32 {
    s.chars().count() as u32
}

/// End position of a block of `lines` laid down starting at `start`.
pub(crate) fn block_end(start: Position, lines: &[String]) -> Position {
    match lines {
        [] => start,
        [only] => Position::new(start.row, start.column + char_len(only)),
        [.., last] => Position::new(start.row + lines.len() as u32 - 1, char_len(last)),
    }
}

impl Operation {
    /// The operation that changes nothing: an insertion of empty text.
    pub fn noop(at: Position) -> Self {
        Operation::Insert {
            start: at,
            lines: vec![String::new()],
        }
    }

    /// True if applying this operation cannot change any document.
    pub fn is_noop(&self) -> bool {
        match self {
            Operation::Insert { lines, .. } => lines.iter().all(|l| l.is_empty()) && lines.len() <= 1,
            Operation::Delete { range, .. } => range.is_empty(),
        }
    }

    /// The point where this operation begins.
    pub fn start(&self) -> Position {
        match self {
            Operation::Insert { start, .. } => *start,
            Operation::Delete { range, .. } => range.start,
        }
    }

    /// The point where this operation ends: past the inserted block for an
    /// insertion, the end of the removed span for a deletion.
    pub fn end(&self) -> Position {
        match self {
            Operation::Insert { start, lines } => block_end(*start, lines),
            Operation::Delete { range, .. } => range.end,
        }
    }

    /// The span this operation covers.
    pub fn range(&self) -> Range {
        Range::new(self.start(), self.end())
    }

    /// Check the operation's internal consistency.
    ///
    /// An insertion must carry at least one line. A deletion's recorded lines
    /// must span exactly its range; anything else would silently corrupt the
    /// shift arithmetic downstream, so it is rejected here instead.
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::Insert { lines, .. } => {
                if lines.is_empty() {
                    return Err(TandemError::InvalidOperation(
                        "insert carries no lines".into(),
                    ));
                }
            }
            Operation::Delete { range, lines } => {
                if range.end < range.start {
                    return Err(TandemError::InvalidOperation(format!(
                        "delete range {} is inverted",
                        range
                    )));
                }
                if lines.is_empty() {
                    return Err(TandemError::InvalidOperation(
                        "delete carries no lines".into(),
                    ));
                }
                let spanned = block_end(range.start, lines);
                if spanned != range.end {
                    return Err(TandemError::InvalidOperation(format!(
                        "delete lines span {} but range ends at {}",
                        spanned, range.end
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: u32, column: u32) -> Position {
        Position::new(row, column)
    }

    fn lines(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_block_end_single_line() {
        assert_eq!(block_end(pos(2, 3), &lines(&["abc"])), pos(2, 6));
    }

    #[test]
    fn test_block_end_multi_line() {
        assert_eq!(block_end(pos(2, 3), &lines(&["ab", "", "xyz"])), pos(4, 3));
    }

    #[test]
    fn test_block_end_counts_chars_not_bytes() {
        assert_eq!(block_end(pos(0, 0), &lines(&["héllo"])), pos(0, 5));
    }

    #[test]
    fn test_noop_is_noop() {
        assert!(Operation::noop(pos(1, 1)).is_noop());
        let real = Operation::Insert {
            start: pos(1, 1),
            lines: lines(&["x"]),
        };
        assert!(!real.is_noop());
    }

    #[test]
    fn test_validate_rejects_empty_insert() {
        let op = Operation::Insert {
            start: pos(0, 0),
            lines: vec![],
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_delete() {
        let op = Operation::Delete {
            range: Range::new(pos(0, 0), pos(0, 3)),
            lines: lines(&["ab"]),
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_consistent_delete() {
        let op = Operation::Delete {
            range: Range::new(pos(0, 1), pos(1, 2)),
            lines: lines(&["bc", "de"]),
        };
        assert!(op.validate().is_ok());
    }
}
