//! The client-side session state machine.
//!
//! A session owns the replica's line buffer, the revision counter, and the
//! buffer of locally issued operations that have not been acknowledged yet.
//! It is a synchronous state machine: every inbound event (a local edit or a
//! message from the sequencer) goes through [`ReplicaSession::handle`], which
//! returns the actions the embedding editor and transport must carry out.
//! There is no internal I/O and no shared mutability, so the caller's event
//! loop is the only ordering that matters.

use std::collections::VecDeque;

use crate::error::{Result, TandemError};
use crate::ot::document::Document;
use crate::ot::operation::{Operation, SiteId};
use crate::ot::transform::{Attributed, resolve};
use crate::protocol::{ClientMessage, Delta, ServerMessage};

/// Whether the session has unacknowledged local operations in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Everything issued locally has been acknowledged.
    Synced,
    /// At least one local operation awaits acknowledgment.
    Pending,
}

/// Inbound event for the session state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The local editor produced an edit (already applied to its own buffer).
    LocalEdit(Operation),
    /// A message arrived from the sequencer.
    Remote(ServerMessage),
}

/// What the embedding editor/transport must do after handling an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Mirror this operation into the editor buffer, suppressing the editor's
    /// own change event while doing so.
    Apply(Operation),
    /// Replace the whole editor buffer (initial snapshot or resync).
    ReplaceDocument(String),
    /// Send this message to the sequencer.
    Send(ClientMessage),
}

/// One editing session's replica: document, revision, outstanding buffer.
#[derive(Debug, Default)]
pub struct ReplicaSession {
    site: Option<SiteId>,
    revision: u64,
    outstanding: VecDeque<Operation>,
    document: Document,
}

impl ReplicaSession {
    /// Create a fresh, not-yet-initialized session. The first message it can
    /// meaningfully handle is the sequencer's `init` snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The replica's assigned site id, once `init` has been received.
    pub fn site(&self) -> Option<SiteId> {
        self.site
    }

    /// Count of operations this replica has applied (acknowledged local plus
    /// remote).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Synced when the outstanding buffer is empty, Pending otherwise.
    pub fn state(&self) -> SessionState {
        if self.outstanding.is_empty() {
            SessionState::Synced
        } else {
            SessionState::Pending
        }
    }

    /// The replica's current document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Feed one event through the state machine.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>> {
        match event {
            SessionEvent::LocalEdit(op) => self.handle_local_edit(op),
            SessionEvent::Remote(ServerMessage::Init {
                document,
                revision,
                site,
            }) => Ok(self.handle_init(document, revision, site)),
            SessionEvent::Remote(ServerMessage::Ack) => self.handle_ack(),
            SessionEvent::Remote(ServerMessage::Change {
                operation,
                revision,
                site,
                ..
            }) => self.handle_remote_change(operation, revision, site),
        }
    }

    fn handle_local_edit(&mut self, op: Operation) -> Result<Vec<SessionAction>> {
        op.validate()?;
        self.document.apply(&op)?;
        let message = ClientMessage::Change {
            document: self.document.to_text(),
            operation: Delta::from(&op),
            revision: self.revision,
        };
        self.outstanding.push_back(op);
        log::debug!(
            "local edit queued, outstanding={}, revision={}",
            self.outstanding.len(),
            self.revision
        );
        Ok(vec![SessionAction::Send(message)])
    }

    fn handle_init(
        &mut self,
        document: String,
        revision: u64,
        site: SiteId,
    ) -> Vec<SessionAction> {
        // Any in-flight local operations are gone; the snapshot wins.
        if !self.outstanding.is_empty() {
            log::warn!(
                "snapshot received with {} unacknowledged local operations; discarding them",
                self.outstanding.len()
            );
        }
        self.document = Document::from_text(&document);
        self.revision = revision;
        self.site = Some(site);
        self.outstanding.clear();
        log::debug!("initialized: site={}, revision={}", site, revision);
        vec![SessionAction::ReplaceDocument(document)]
    }

    fn handle_ack(&mut self) -> Result<Vec<SessionAction>> {
        // Acks arrive in submission order; popping exactly one per ack is
        // what keeps an operation from ever being applied twice.
        if self.outstanding.pop_front().is_none() {
            return Err(TandemError::Protocol(
                "ack received with no outstanding operation".into(),
            ));
        }
        self.revision += 1;
        log::debug!(
            "ack: revision={}, outstanding={}",
            self.revision,
            self.outstanding.len()
        );
        Ok(Vec::new())
    }

    fn handle_remote_change(
        &mut self,
        operation: Delta,
        revision: u64,
        remote_site: SiteId,
    ) -> Result<Vec<SessionAction>> {
        let incoming = Operation::try_from(operation)?;
        let site = self.site.ok_or_else(|| {
            TandemError::Protocol("remote change received before init".into())
        })?;

        let concurrent = revision == self.revision && !self.outstanding.is_empty();
        let applied = if concurrent {
            // The remote edit was issued against the same revision as our
            // still-unconfirmed local edit: rewrite it around ours.
            let primary = self
                .outstanding
                .back()
                .expect("outstanding is non-empty when concurrent");
            log::debug!(
                "concurrent change from site {} at revision {}, transforming",
                remote_site,
                revision
            );
            resolve(
                Attributed::new(primary, site),
                Attributed::new(&incoming, remote_site),
            )?
        } else {
            vec![incoming]
        };

        for op in &applied {
            self.document.apply(op)?;
        }
        self.revision += 1;

        Ok(applied
            .into_iter()
            .filter(|op| !op.is_noop())
            .map(SessionAction::Apply)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::position::{Position, Range};

    fn pos(row: u32, column: u32) -> Position {
        Position::new(row, column)
    }

    fn insert(row: u32, column: u32, text: &str) -> Operation {
        Operation::Insert {
            start: pos(row, column),
            lines: vec![text.to_string()],
        }
    }

    fn delete(start: (u32, u32), end: (u32, u32), text: &str) -> Operation {
        Operation::Delete {
            range: Range::new(pos(start.0, start.1), pos(end.0, end.1)),
            lines: vec![text.to_string()],
        }
    }

    fn init(document: &str, revision: u64, site: u64) -> SessionEvent {
        SessionEvent::Remote(ServerMessage::Init {
            document: document.to_string(),
            revision,
            site: SiteId(site),
        })
    }

    fn remote_change(op: &Operation, revision: u64, site: u64) -> SessionEvent {
        SessionEvent::Remote(ServerMessage::Change {
            document: String::new(),
            operation: Delta::from(op),
            revision,
            site: SiteId(site),
        })
    }

    fn initialized(document: &str, site: u64) -> ReplicaSession {
        let mut session = ReplicaSession::new();
        session.handle(init(document, 0, site)).unwrap();
        session
    }

    #[test]
    fn test_init_replaces_everything() {
        let mut session = ReplicaSession::new();
        let actions = session.handle(init("hello", 4, 9)).unwrap();
        assert_eq!(
            actions,
            vec![SessionAction::ReplaceDocument("hello".to_string())]
        );
        assert_eq!(session.revision(), 4);
        assert_eq!(session.site(), Some(SiteId(9)));
        assert_eq!(session.state(), SessionState::Synced);
        assert_eq!(session.document().to_text(), "hello");
    }

    #[test]
    fn test_local_edit_sends_change_and_goes_pending() {
        let mut session = initialized("ab", 1);
        let actions = session
            .handle(SessionEvent::LocalEdit(insert(0, 1, "X")))
            .unwrap();
        assert_eq!(session.state(), SessionState::Pending);
        assert_eq!(session.document().to_text(), "aXb");
        // The change carries the post-edit snapshot and the issuing revision.
        match &actions[..] {
            [SessionAction::Send(ClientMessage::Change {
                document,
                operation,
                revision,
            })] => {
                assert_eq!(document, "aXb");
                assert_eq!(operation.action, "insert");
                assert_eq!(*revision, 0);
            }
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn test_ack_pops_exactly_one() {
        let mut session = initialized("ab", 1);
        session
            .handle(SessionEvent::LocalEdit(insert(0, 1, "X")))
            .unwrap();
        session
            .handle(SessionEvent::LocalEdit(insert(0, 2, "Y")))
            .unwrap();
        assert_eq!(session.state(), SessionState::Pending);

        session.handle(SessionEvent::Remote(ServerMessage::Ack)).unwrap();
        assert_eq!(session.revision(), 1);
        assert_eq!(session.state(), SessionState::Pending);

        session.handle(SessionEvent::Remote(ServerMessage::Ack)).unwrap();
        assert_eq!(session.revision(), 2);
        assert_eq!(session.state(), SessionState::Synced);

        // A third ack has nothing to confirm: the state machine refuses it
        // rather than risk re-applying anything.
        let err = session
            .handle(SessionEvent::Remote(ServerMessage::Ack))
            .unwrap_err();
        assert!(matches!(err, TandemError::Protocol(_)));
        assert_eq!(session.revision(), 2);
    }

    #[test]
    fn test_remote_change_applies_directly_when_synced() {
        let mut session = initialized("ab", 1);
        let op = insert(0, 1, "Z");
        let actions = session.handle(remote_change(&op, 0, 2)).unwrap();
        assert_eq!(actions, vec![SessionAction::Apply(op)]);
        assert_eq!(session.document().to_text(), "aZb");
        assert_eq!(session.revision(), 1);
    }

    #[test]
    fn test_concurrent_remote_change_is_transformed() {
        // Both replicas insert at column 1 of "ab" against revision 0. The
        // remote site id is lower, so its text must end up first.
        let mut session = initialized("ab", 2);
        session
            .handle(SessionEvent::LocalEdit(insert(0, 1, "Y")))
            .unwrap();

        let remote = insert(0, 1, "X");
        let actions = session.handle(remote_change(&remote, 0, 1)).unwrap();
        assert_eq!(actions, vec![SessionAction::Apply(insert(0, 1, "X"))]);
        assert_eq!(session.document().to_text(), "aXYb");
        assert_eq!(session.revision(), 1);

        session.handle(SessionEvent::Remote(ServerMessage::Ack)).unwrap();
        assert_eq!(session.revision(), 2);
        assert_eq!(session.state(), SessionState::Synced);
    }

    #[test]
    fn test_concurrent_sessions_converge() {
        // Two full sessions, each editing "ab" at the same point at revision
        // 0, each receiving the other's change before its own ack.
        let mut a = initialized("ab", 1);
        let mut b = initialized("ab", 2);

        let a_op = insert(0, 1, "X");
        let b_op = insert(0, 1, "Y");
        a.handle(SessionEvent::LocalEdit(a_op.clone())).unwrap();
        b.handle(SessionEvent::LocalEdit(b_op.clone())).unwrap();

        a.handle(remote_change(&b_op, 0, 2)).unwrap();
        b.handle(remote_change(&a_op, 0, 1)).unwrap();
        a.handle(SessionEvent::Remote(ServerMessage::Ack)).unwrap();
        b.handle(SessionEvent::Remote(ServerMessage::Ack)).unwrap();

        assert_eq!(a.document().to_text(), "aXYb");
        assert_eq!(b.document().to_text(), "aXYb");
        assert_eq!(a.revision(), 2);
        assert_eq!(b.revision(), 2);
    }

    #[test]
    fn test_concurrent_delete_collapse_emits_no_apply() {
        // The remote deletion is entirely inside what we already deleted:
        // nothing is left for the editor to mirror.
        let mut session = initialized("abcd", 1);
        session
            .handle(SessionEvent::LocalEdit(delete((0, 0), (0, 3), "abc")))
            .unwrap();

        let remote = delete((0, 1), (0, 2), "b");
        let actions = session.handle(remote_change(&remote, 0, 2)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(session.document().to_text(), "d");
        assert_eq!(session.revision(), 1);
    }

    #[test]
    fn test_remote_change_with_older_revision_applies_directly() {
        let mut session = initialized("abcdef", 1);
        let first = delete((0, 0), (0, 2), "ab");
        session.handle(remote_change(&first, 0, 2)).unwrap();
        assert_eq!(session.revision(), 1);

        // Next change was issued against the revision we just reached.
        let second = insert(0, 0, "Q");
        session.handle(remote_change(&second, 1, 2)).unwrap();
        assert_eq!(session.document().to_text(), "Qcdef");
    }

    #[test]
    fn test_remote_change_before_init_is_protocol_error() {
        let mut session = ReplicaSession::new();
        let op = insert(0, 0, "X");
        let err = session.handle(remote_change(&op, 0, 1)).unwrap_err();
        assert!(matches!(err, TandemError::Protocol(_)));
    }

    #[test]
    fn test_init_discards_outstanding() {
        let mut session = initialized("ab", 1);
        session
            .handle(SessionEvent::LocalEdit(insert(0, 1, "X")))
            .unwrap();
        assert_eq!(session.state(), SessionState::Pending);

        let actions = session.handle(init("fresh", 10, 1)).unwrap();
        assert_eq!(
            actions,
            vec![SessionAction::ReplaceDocument("fresh".to_string())]
        );
        assert_eq!(session.state(), SessionState::Synced);
        assert_eq!(session.revision(), 10);
        assert_eq!(session.document().to_text(), "fresh");
    }

    #[test]
    fn test_invalid_remote_operation_leaves_document_intact() {
        let mut session = initialized("ab", 1);
        let event = SessionEvent::Remote(ServerMessage::Change {
            document: String::new(),
            operation: Delta {
                action: "bogus".into(),
                start: pos(0, 0),
                end: pos(0, 1),
                lines: vec!["a".into()],
            },
            revision: 0,
            site: SiteId(2),
        });
        let err = session.handle(event).unwrap_err();
        assert!(matches!(err, TandemError::InvalidOperation(_)));
        assert_eq!(session.document().to_text(), "ab");
        assert_eq!(session.revision(), 0);
    }
}
