//! The operational-transformation engine and the session machinery around it.

mod document;
mod operation;
mod position;
mod session;
mod transform;

pub use document::Document;
pub use operation::{Operation, SiteId};
pub use position::{Position, Range};
pub use session::{ReplicaSession, SessionAction, SessionEvent, SessionState};
pub use transform::{Attributed, order_pair, resolve};

pub(crate) use operation::block_end;
