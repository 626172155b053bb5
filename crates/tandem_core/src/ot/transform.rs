//! The transform engine.
//!
//! Two operations are concurrent when both were issued against the same
//! acknowledged revision, neither aware of the other. Applying them naively in
//! different orders on different replicas tears the document apart; the engine
//! rewrites one of them so that both orders land on identical text.
//!
//! Two entry points:
//!
//! - [`resolve`] is the asymmetric form: `primary` is already in the local
//!   document and cannot be moved, so `incoming` is rewritten around it.
//! - [`order_pair`] is the symmetric form: neither operation is applied yet;
//!   the pair is put into a deterministic order, the second rewritten against
//!   the first. The second element may be absent when one operation collapses
//!   into the other.
//!
//! Both replicas run the same code over the same inputs (operations plus site
//! ids), so they reach the same outcome independently.

use std::cmp::Ordering;

use crate::error::Result;
use crate::ot::document::byte_index;
use crate::ot::operation::{Operation, SiteId, char_len};
use crate::ot::position::{Position, Range};

/// An operation tagged with the replica that issued it.
///
/// The site id only matters for the fully symmetric insert-at-same-point case,
/// but carrying it everywhere keeps the call sites uniform.
#[derive(Debug, Clone, Copy)]
pub struct Attributed<'a> {
    /// The operation itself
    pub op: &'a Operation,
    /// Replica that issued it
    pub site: SiteId,
}

impl<'a> Attributed<'a> {
    /// Tag an operation with its issuing replica.
    pub fn new(op: &'a Operation, site: SiteId) -> Self {
        Self { op, site }
    }
}

/// Where `p` ends up after a block of `lines` is inserted at `at`.
///
/// Points before the insertion are untouched. Points at or after it move down
/// by the added rows; a point on the insertion row is rebased onto the last
/// inserted line.
fn map_after_insert(p: Position, at: Position, lines: &[String]) -> Position {
    if p < at {
        return p;
    }
    let added_rows = lines.len() as u32 - 1;
    if p.row != at.row {
        return p.shifted(added_rows as i64, 0);
    }
    if added_rows == 0 {
        Position::new(p.row, p.column + char_len(&lines[0]))
    } else {
        Position::new(
            p.row + added_rows,
            char_len(&lines[lines.len() - 1]) + (p.column - at.column),
        )
    }
}

/// Where `p` ends up after the text covered by `range` is deleted.
///
/// Points at or before the start are untouched, points inside collapse onto
/// the start, points beyond move up by the removed rows (and left on the seam
/// row).
fn map_after_delete(p: Position, range: Range) -> Position {
    if p <= range.start {
        return p;
    }
    if p <= range.end {
        return range.start;
    }
    let removed_rows = range.end.row - range.start.row;
    if p.row == range.end.row {
        Position::new(range.start.row, range.start.column + (p.column - range.end.column))
    } else {
        p.shifted(-(removed_rows as i64), 0)
    }
}

/// Split a block of lines anchored at `start` into the text before and after
/// `at`. `at` must lie within the block.
fn split_block(lines: &[String], start: Position, at: Position) -> (Vec<String>, Vec<String>) {
    let row = (at.row - start.row) as usize;
    let col = if row == 0 {
        at.column - start.column
    } else {
        at.column
    };
    let line = &lines[row];
    let byte = byte_index(line, col).unwrap_or(line.len());
    let (head, tail) = line.split_at(byte);

    let mut before: Vec<String> = lines[..row].to_vec();
    before.push(head.to_string());
    let mut after: Vec<String> = vec![tail.to_string()];
    after.extend(lines[row + 1..].iter().cloned());
    (before, after)
}

/// Join two blocks of lines, merging the seam line.
fn concat_blocks(mut a: Vec<String>, b: Vec<String>) -> Vec<String> {
    let seam = a.pop().unwrap_or_default();
    let mut rest = b.into_iter();
    let first = rest.next().unwrap_or_default();
    a.push(format!("{seam}{first}"));
    a.extend(rest);
    a
}

/// Remove the sub-span `[cut_start, cut_end]` from a block anchored at
/// `start`, keeping the text on both sides.
fn excise_block(
    lines: &[String],
    start: Position,
    cut_start: Position,
    cut_end: Position,
) -> Vec<String> {
    let (head, rest) = split_block(lines, start, cut_start);
    let (_, tail) = split_block(&rest, cut_start, cut_end);
    concat_blocks(head, tail)
}

/// Rewrite `incoming` so it can be applied after `primary`.
///
/// `primary` has already been applied to the local document. The returned
/// sequence is applied in order; it holds one operation in the common case, a
/// no-op when `incoming` collapses entirely, and two deletions when a remote
/// deletion must be split around locally inserted text it did not know about.
///
/// Both inputs are validated up front; on error nothing is produced, so a
/// caller can never half-apply a transformation.
pub fn resolve(primary: Attributed<'_>, incoming: Attributed<'_>) -> Result<Vec<Operation>> {
    primary.op.validate()?;
    incoming.op.validate()?;

    if primary.op.is_noop() || incoming.op.is_noop() {
        return Ok(vec![incoming.op.clone()]);
    }

    let resolved = match (primary.op, incoming.op) {
        (
            Operation::Insert { start: p, lines: pl },
            Operation::Insert { start: i, lines: il },
        ) => {
            let start = match i.cmp(p) {
                Ordering::Greater => map_after_insert(*i, *p, pl),
                Ordering::Less => *i,
                // Same point: the lower site goes first, the other starts
                // right behind its inserted text.
                Ordering::Equal => {
                    if incoming.site < primary.site {
                        *i
                    } else {
                        primary.op.end()
                    }
                }
            };
            vec![Operation::Insert {
                start,
                lines: il.clone(),
            }]
        }

        (
            Operation::Delete { range: pr, .. },
            Operation::Delete { range: ir, lines: il },
        ) => {
            if pr.contains_range(ir) {
                // Identical or enclosed: the primary already removed all of
                // incoming's text.
                vec![Operation::noop(pr.start)]
            } else if pr.end <= ir.start {
                // Disjoint (touching counts as disjoint), primary before:
                // shift up/left through the removed span.
                let range = Range::new(
                    map_after_delete(ir.start, *pr),
                    map_after_delete(ir.end, *pr),
                );
                vec![Operation::Delete {
                    range,
                    lines: il.clone(),
                }]
            } else if ir.end <= pr.start {
                // Disjoint, primary after: untouched.
                vec![incoming.op.clone()]
            } else {
                // Overlap with text left over on at least one side. The
                // overlap is already gone; what remains of incoming's span is
                // contiguous once the primary's hole collapses.
                let cut_start = ir.start.max(pr.start);
                let cut_end = ir.end.min(pr.end);
                let lines = excise_block(il, ir.start, cut_start, cut_end);
                let range = Range::new(
                    map_after_delete(ir.start, *pr),
                    map_after_delete(ir.end, *pr),
                );
                vec![Operation::Delete { range, lines }]
            }
        }

        (
            Operation::Insert { start: p, lines: pl },
            Operation::Delete { range: ir, lines: il },
        ) => {
            if *p <= ir.start {
                // Inserted text sits at or before the span: the span slides
                // through it and the new text survives.
                let range = Range::new(
                    map_after_insert(ir.start, *p, pl),
                    map_after_insert(ir.end, *p, pl),
                );
                vec![Operation::Delete {
                    range,
                    lines: il.clone(),
                }]
            } else if *p >= ir.end {
                vec![incoming.op.clone()]
            } else {
                // The deletion encloses text we inserted after it was issued.
                // Split it in two around the insertion so the new text
                // survives; the second half is expressed against the document
                // as it stands after the first half has been applied.
                let (head, tail) = split_block(il, ir.start, *p);
                let first_range = Range::new(ir.start, *p);
                let first = Operation::Delete {
                    range: first_range,
                    lines: head,
                };
                let inserted_end = primary.op.end();
                let tail_end = map_after_insert(ir.end, *p, pl);
                let second = Operation::Delete {
                    range: Range::new(
                        map_after_delete(inserted_end, first_range),
                        map_after_delete(tail_end, first_range),
                    ),
                    lines: tail,
                };
                vec![first, second]
            }
        }

        (
            Operation::Delete { range: pr, .. },
            Operation::Insert { start: i, lines: il },
        ) => {
            // Before the span: untouched. Inside: pulled to the point the
            // deletion collapsed onto. Beyond: shifted up/left.
            vec![Operation::Insert {
                start: map_after_delete(*i, *pr),
                lines: il.clone(),
            }]
        }
    };

    Ok(resolved)
}

/// Put a concurrent pair into a deterministic application order.
///
/// Unlike [`resolve`], neither operation has been applied yet: the first
/// element of the returned pair applies to the shared base document, the
/// second (when present) to the result. Absent inputs pass through untouched,
/// and the second element is absent when one operation absorbs the other
/// (identical or enclosed deletions, overlapping deletions merged into their
/// union).
pub fn order_pair(
    a: Option<Attributed<'_>>,
    b: Option<Attributed<'_>>,
) -> Result<(Option<Operation>, Option<Operation>)> {
    let (a, b) = match (a, b) {
        (None, None) => return Ok((None, None)),
        (Some(a), None) => {
            a.op.validate()?;
            return Ok((Some(a.op.clone()), None));
        }
        (None, Some(b)) => {
            b.op.validate()?;
            return Ok((Some(b.op.clone()), None));
        }
        (Some(a), Some(b)) => (a, b),
    };
    a.op.validate()?;
    b.op.validate()?;

    let ordered = match (a.op, b.op) {
        (Operation::Insert { start: sa, .. }, Operation::Insert { start: sb, .. }) => {
            match sa.cmp(sb) {
                // The later insertion goes first so the earlier one's point
                // stays valid; neither needs rewriting.
                Ordering::Greater => (Some(a.op.clone()), Some(b.op.clone())),
                Ordering::Less => (Some(b.op.clone()), Some(a.op.clone())),
                Ordering::Equal => {
                    let (first, second) = if a.site <= b.site { (a, b) } else { (b, a) };
                    let shifted = match second.op {
                        Operation::Insert { lines, .. } => Operation::Insert {
                            start: first.op.end(),
                            lines: lines.clone(),
                        },
                        _ => unreachable!("both operations are insertions"),
                    };
                    (Some(first.op.clone()), Some(shifted))
                }
            }
        }

        (Operation::Delete { range: ra, lines: la }, Operation::Delete { range: rb, lines: lb }) => {
            if ra.contains_range(rb) {
                (Some(a.op.clone()), None)
            } else if rb.contains_range(ra) {
                (Some(b.op.clone()), None)
            } else if ra.end <= rb.start {
                // Disjoint: later span first, both unchanged.
                (Some(b.op.clone()), Some(a.op.clone()))
            } else if rb.end <= ra.start {
                (Some(a.op.clone()), Some(b.op.clone()))
            } else {
                // Partial overlap: a single replacement covering the union of
                // the two spans, its text spliced from both recordings.
                let (earlier, later) = if ra.start <= rb.start {
                    ((ra, la), (rb, lb))
                } else {
                    ((rb, lb), (ra, la))
                };
                let (head, _) = split_block(earlier.1, earlier.0.start, later.0.start);
                let lines = concat_blocks(head, later.1.clone());
                let merged = Operation::Delete {
                    range: Range::new(earlier.0.start, later.0.end),
                    lines,
                };
                (Some(merged), None)
            }
        }

        (Operation::Insert { start, lines }, Operation::Delete { range, .. }) => {
            order_insert_delete(start, lines, a.op, b.op, *range)
        }
        (Operation::Delete { range, .. }, Operation::Insert { start, lines }) => {
            order_insert_delete(start, lines, b.op, a.op, *range)
        }
    };

    Ok(ordered)
}

/// Shared insert-versus-delete ordering for [`order_pair`].
fn order_insert_delete(
    insert_start: &Position,
    insert_lines: &[String],
    insert: &Operation,
    delete: &Operation,
    range: Range,
) -> (Option<Operation>, Option<Operation>) {
    if *insert_start >= range.end {
        // Insertion past the span: it can go first, the span stays valid.
        (Some(insert.clone()), Some(delete.clone()))
    } else if *insert_start <= range.start {
        // Insertion before the span: deletion first, insertion point intact.
        (Some(delete.clone()), Some(insert.clone()))
    } else {
        // Insertion inside the span: deletion first, the insertion lands at
        // the point the span collapsed onto.
        let pulled = Operation::Insert {
            start: range.start,
            lines: insert_lines.to_vec(),
        };
        (Some(delete.clone()), Some(pulled))
    }
}
