use thiserror::Error;

use crate::ot::Position;

/// Unified error type for tandem operations
#[derive(Debug, Error)]
pub enum TandemError {
    /// An operation carried an unrecognized action tag, an inverted range, or
    /// recorded lines that do not span its range. The offending operation is
    /// rejected before any text is touched.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An operation addressed text outside the document buffer. The buffer is
    /// left untouched.
    #[error("position {position} is outside the document ({rows} lines)")]
    OutOfBounds {
        /// The out-of-range position
        position: Position,
        /// Number of lines in the document at the time of the failure
        rows: usize,
    },

    /// The session received a message its state machine cannot accept, e.g. a
    /// remote change before the initial snapshot or an ack with nothing
    /// outstanding.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A wire message failed to encode or decode
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport dropped. Recovery is reconnect plus a fresh snapshot;
    /// unacknowledged local operations are lost.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Result type alias for tandem operations
pub type Result<T> = std::result::Result<T, TandemError>;
