//! The line buffer a replica edits.
//!
//! A document is an ordered sequence of lines and always holds at least one
//! (possibly empty) line, mirroring how editor buffers behave. Applying an
//! operation either succeeds completely or leaves the buffer untouched.

use crate::error::{Result, TandemError};
use crate::ot::operation::{Operation, char_len};
use crate::ot::position::{Position, Range};

/// Byte offset of character `col` within `s`, or `None` past the end.
pub(crate) fn byte_index(s: &str, col: u32) -> Option<usize> {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(col as usize)
}

/// An in-memory plain-text document, stored line by line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document (a single empty line).
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
        }
    }

    /// Build a document from newline-joined text.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(String::from).collect(),
        }
    }

    /// Render the document as newline-joined text.
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }

    /// The lines of the document.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines in the document (always at least 1).
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The position one past the last character of the document.
    pub fn end_position(&self) -> Position {
        let row = self.lines.len() as u32 - 1;
        Position::new(row, char_len(&self.lines[row as usize]))
    }

    fn check_point(&self, p: Position) -> Result<(usize, usize)> {
        let row = p.row as usize;
        let oob = || TandemError::OutOfBounds {
            position: p,
            rows: self.lines.len(),
        };
        let line = self.lines.get(row).ok_or_else(oob)?;
        let byte = byte_index(line, p.column).ok_or_else(oob)?;
        Ok((row, byte))
    }

    /// Apply an operation to the document.
    ///
    /// No-ops return without touching the buffer. Out-of-range operations
    /// fail without partial mutation.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        if op.is_noop() {
            return Ok(());
        }
        match op {
            Operation::Insert { start, lines } => self.insert(*start, lines),
            Operation::Delete { range, .. } => self.delete(*range),
        }
    }

    fn insert(&mut self, at: Position, block: &[String]) -> Result<()> {
        let (row, byte) = self.check_point(at)?;
        let line = &self.lines[row];
        let (head, tail) = line.split_at(byte);
        if block.len() == 1 {
            self.lines[row] = format!("{head}{}{tail}", block[0]);
        } else {
            let mut rows = Vec::with_capacity(block.len());
            rows.push(format!("{head}{}", block[0]));
            rows.extend(block[1..block.len() - 1].iter().cloned());
            rows.push(format!("{}{tail}", block[block.len() - 1]));
            self.lines.splice(row..=row, rows);
        }
        Ok(())
    }

    fn delete(&mut self, range: Range) -> Result<()> {
        let (start_row, start_byte) = self.check_point(range.start)?;
        let (end_row, end_byte) = self.check_point(range.end)?;
        if start_row == end_row {
            self.lines[start_row].replace_range(start_byte..end_byte, "");
        } else {
            let head = self.lines[start_row][..start_byte].to_string();
            let tail = &self.lines[end_row][end_byte..];
            let joined = format!("{head}{tail}");
            self.lines.splice(start_row..=end_row, std::iter::once(joined));
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
    fn test_round_trips_text() {
        let doc = Document::from_text("one\ntwo\n\nthree");
        assert_eq!(doc.line_count(), 4);
        assert_eq!(doc.to_text(), "one\ntwo\n\nthree");
    }

    #[test]
    fn test_empty_text_is_one_empty_line() {
        let doc = Document::from_text("");
        assert_eq!(doc.line_count(), 1);
        assert_eq!(doc.end_position(), pos(0, 0));
    }

    #[test]
    fn test_insert_within_one_line() {
        let mut doc = Document::from_text("held");
        doc.apply(&Operation::Insert {
            start: pos(0, 3),
            lines: lines(&["lo worl"]),
        })
        .unwrap();
        assert_eq!(doc.to_text(), "hello world");
    }

    #[test]
    fn test_insert_splits_line() {
        let mut doc = Document::from_text("ab");
        doc.apply(&Operation::Insert {
            start: pos(0, 1),
            lines: lines(&["x", "y"]),
        })
        .unwrap();
        assert_eq!(doc.to_text(), "ax\nyb");
    }

    #[test]
    fn test_insert_multi_line_block() {
        let mut doc = Document::from_text("headtail");
        doc.apply(&Operation::Insert {
            start: pos(0, 4),
            lines: lines(&["one", "two", "three"]),
        })
        .unwrap();
        assert_eq!(doc.to_text(), "headone\ntwo\nthreetail");
    }

    #[test]
    fn test_delete_within_one_line() {
        let mut doc = Document::from_text("abcdef");
        doc.apply(&Operation::Delete {
            range: Range::new(pos(0, 1), pos(0, 4)),
            lines: lines(&["bcd"]),
        })
        .unwrap();
        assert_eq!(doc.to_text(), "aef");
    }

    #[test]
    fn test_delete_across_lines() {
        let mut doc = Document::from_text("one\ntwo\nthree");
        doc.apply(&Operation::Delete {
            range: Range::new(pos(0, 2), pos(2, 3)),
            lines: lines(&["e", "two", "thr"]),
        })
        .unwrap();
        assert_eq!(doc.to_text(), "onee");
    }

    #[test]
    fn test_delete_then_insert_is_replace() {
        let mut doc = Document::from_text("hello world");
        doc.apply(&Operation::Delete {
            range: Range::new(pos(0, 0), pos(0, 5)),
            lines: lines(&["hello"]),
        })
        .unwrap();
        doc.apply(&Operation::Insert {
            start: pos(0, 0),
            lines: lines(&["goodbye"]),
        })
        .unwrap();
        assert_eq!(doc.to_text(), "goodbye world");
    }

    #[test]
    fn test_out_of_bounds_leaves_document_intact() {
        let mut doc = Document::from_text("ab");
        let before = doc.clone();
        let err = doc.apply(&Operation::Insert {
            start: pos(5, 0),
            lines: lines(&["x"]),
        });
        assert!(err.is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn test_unicode_columns() {
        let mut doc = Document::from_text("héllo");
        doc.apply(&Operation::Delete {
            range: Range::new(pos(0, 1), pos(0, 2)),
            lines: lines(&["é"]),
        })
        .unwrap();
        assert_eq!(doc.to_text(), "hllo");
    }

    #[test]
    fn test_noop_changes_nothing() {
        let mut doc = Document::from_text("abc");
        doc.apply(&Operation::noop(pos(0, 1))).unwrap();
        assert_eq!(doc.to_text(), "abc");
    }
}
