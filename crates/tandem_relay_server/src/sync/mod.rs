mod connection;
mod room;

pub use connection::ClientConnection;
pub use room::{RelayRoom, RelayState, RelayStats};
pub use tandem_core::ot::SiteId;
