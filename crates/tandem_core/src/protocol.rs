//! Wire protocol between replicas and the sequencer.
//!
//! Messages are JSON text frames tagged with a `type` field. The edit payload
//! travels as a [`Delta`], the flat `{action, start, end, lines}` shape the
//! editor adapter emits; it is converted into the tagged [`Operation`] at the
//! boundary so nothing downstream has to sniff field presence to infer intent.
//!
//! TypeScript bindings for these types are exported via `ts-rs` for the
//! browser editor adapter.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{Result, TandemError};
use crate::ot::{Operation, Position, Range, SiteId, block_end};

/// Action tag for an insertion delta.
pub const ACTION_INSERT: &str = "insert";
/// Action tag for a deletion delta.
pub const ACTION_DELETE: &str = "delete";

/// The wire shape of a single edit.
///
/// `end` is redundant for an insertion (it is implied by `start` and `lines`)
/// but is carried anyway because editor deltas come with it; decoding checks
/// it for consistency instead of trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Delta {
    /// `"insert"` or `"delete"`
    pub action: String,
    /// Start of the edit
    pub start: Position,
    /// End of the edit
    pub end: Position,
    /// The inserted or removed text as a block of lines
    pub lines: Vec<String>,
}

impl From<&Operation> for Delta {
    fn from(op: &Operation) -> Self {
        match op {
            Operation::Insert { start, lines } => Delta {
                action: ACTION_INSERT.to_string(),
                start: *start,
                end: op.end(),
                lines: lines.clone(),
            },
            Operation::Delete { range, lines } => Delta {
                action: ACTION_DELETE.to_string(),
                start: range.start,
                end: range.end,
                lines: lines.clone(),
            },
        }
    }
}

impl TryFrom<Delta> for Operation {
    type Error = TandemError;

    fn try_from(delta: Delta) -> Result<Operation> {
        let op = match delta.action.as_str() {
            ACTION_INSERT => {
                let spanned = block_end(delta.start, &delta.lines);
                if spanned != delta.end {
                    return Err(TandemError::InvalidOperation(format!(
                        "insert lines span {} but delta ends at {}",
                        spanned, delta.end
                    )));
                }
                Operation::Insert {
                    start: delta.start,
                    lines: delta.lines,
                }
            }
            ACTION_DELETE => {
                if delta.end < delta.start {
                    return Err(TandemError::InvalidOperation(format!(
                        "delete range [{}..{}] is inverted",
                        delta.start, delta.end
                    )));
                }
                Operation::Delete {
                    range: Range {
                        start: delta.start,
                        end: delta.end,
                    },
                    lines: delta.lines,
                }
            }
            other => {
                return Err(TandemError::InvalidOperation(format!(
                    "unrecognized action '{other}'"
                )));
            }
        };
        op.validate()?;
        Ok(op)
    }
}

/// Messages a replica sends to the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// A locally issued edit, tagged with the replica's last-known revision.
    /// `document` is the sender's full post-edit text; the sequencer stores it
    /// as the snapshot for late joiners.
    Change {
        /// Full post-edit document text
        document: String,
        /// The edit itself
        operation: Delta,
        /// Revision the edit was issued against
        revision: u64,
    },
}

/// Messages the sequencer sends to a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ServerMessage {
    /// Full-document snapshot on (re)connect, with the replica's assigned
    /// site id.
    Init {
        /// Canonical document text
        document: String,
        /// Authoritative revision
        revision: u64,
        /// The id assigned to the connecting replica
        site: SiteId,
    },
    /// Another replica's edit, relayed unchanged.
    Change {
        /// The submitter's post-edit document text (informational; replicas
        /// apply the operation, not the snapshot)
        document: String,
        /// The relayed edit
        operation: Delta,
        /// Revision the submitter issued the edit against
        revision: u64,
        /// The submitting replica
        site: SiteId,
    },
    /// Acknowledges the most recently processed change from this connection.
    Ack,
}

impl ClientMessage {
    /// Encode to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerMessage {
    /// Encode to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: u32, column: u32) -> Position {
        Position::new(row, column)
    }

    #[test]
    fn test_delta_round_trip_insert() {
        let op = Operation::Insert {
            start: pos(1, 2),
            lines: vec!["ab".into(), "c".into()],
        };
        let delta = Delta::from(&op);
        assert_eq!(delta.action, "insert");
        assert_eq!(delta.end, pos(2, 1));
        assert_eq!(Operation::try_from(delta).unwrap(), op);
    }

    #[test]
    fn test_delta_round_trip_delete() {
        let op = Operation::Delete {
            range: Range::new(pos(0, 1), pos(0, 4)),
            lines: vec!["bcd".into()],
        };
        let delta = Delta::from(&op);
        assert_eq!(delta.action, "delete");
        assert_eq!(Operation::try_from(delta).unwrap(), op);
    }

    #[test]
    fn test_unknown_action_is_invalid() {
        let delta = Delta {
            action: "remove".into(),
            start: pos(0, 0),
            end: pos(0, 1),
            lines: vec!["a".into()],
        };
        let err = Operation::try_from(delta).unwrap_err();
        assert!(matches!(err, TandemError::InvalidOperation(_)));
    }

    #[test]
    fn test_inconsistent_insert_end_is_invalid() {
        let delta = Delta {
            action: "insert".into(),
            start: pos(0, 0),
            end: pos(0, 9),
            lines: vec!["ab".into()],
        };
        assert!(Operation::try_from(delta).is_err());
    }

    #[test]
    fn test_messages_round_trip_json() {
        let msg = ServerMessage::Init {
            document: "hello\nworld".into(),
            revision: 7,
            site: SiteId(3),
        };
        let json = msg.to_json().unwrap();
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);

        let ack = ServerMessage::Ack;
        let json = ack.to_json().unwrap();
        assert!(json.contains("\"ack\""));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), ack);
    }

    #[test]
    fn test_change_wire_shape() {
        let op = Operation::Insert {
            start: pos(0, 0),
            lines: vec!["hi".into()],
        };
        let msg = ClientMessage::Change {
            document: "hi".into(),
            operation: Delta::from(&op),
            revision: 0,
        };
        let json = msg.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "change");
        assert_eq!(value["operation"]["action"], "insert");
        assert_eq!(value["operation"]["start"]["row"], 0);
        assert_eq!(value["operation"]["lines"][0], "hi");
    }
}
