//! Core library for Tandem, a collaborative plain-text editor.
//!
//! Every connected editor session holds its own replica of the document.
//! Edits are applied locally right away and sent to a central relay (the
//! *sequencer*), which orders them and fans them out; when two edits were
//! issued concurrently against the same revision, the receiving replica
//! rewrites the incoming one through the transform engine so that all
//! replicas converge on identical text. The relay never resolves conflicts
//! itself.
//!
//! The pieces, bottom up:
//!
//! - [`ot::Position`] / [`ot::Range`] — row/column points and spans.
//! - [`ot::Operation`] — a tagged insert-or-delete edit.
//! - [`ot::Document`] — the line buffer an operation applies to.
//! - [`ot::resolve`] / [`ot::order_pair`] — the transform engine.
//! - [`ot::ReplicaSession`] — the client-side state machine tracking the
//!   revision counter and the buffer of unacknowledged local edits.
//! - [`protocol`] — the JSON wire messages exchanged with the sequencer.
//!
//! This crate is synchronous and transport-free; the relay server and the
//! CLI client wire it to the network.

#![warn(missing_docs)]

/// Error (common error types)
pub mod error;

/// The OT engine: positions, operations, documents, transforms, sessions
pub mod ot;

/// Wire messages exchanged between replicas and the sequencer
pub mod protocol;

pub use error::{Result, TandemError};
