use std::sync::Arc;

use tandem_core::protocol::{ClientMessage, ServerMessage};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{RelayRoom, SiteId};

/// Represents a connected replica
pub struct ClientConnection {
    /// Opaque per-connection id, used only for log correlation
    pub connection_id: String,
    /// The replica's assigned site id
    pub site: SiteId,
    room: Arc<RelayRoom>,
    broadcast_rx: broadcast::Receiver<(SiteId, ServerMessage)>,
}

impl ClientConnection {
    /// Register a new connection with a room
    pub fn new(room: Arc<RelayRoom>) -> Self {
        let (site, broadcast_rx) = room.subscribe();

        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            site,
            room,
            broadcast_rx,
        }
    }

    /// The snapshot message to send right after the connection is established
    pub async fn init_message(&self) -> ServerMessage {
        self.room.init_message(self.site).await
    }

    /// Handle an incoming text frame from the replica.
    ///
    /// Returns the reply to send back (the ack), or `None` when the frame was
    /// dropped as malformed.
    pub async fn handle_frame(&self, text: &str) -> Option<ServerMessage> {
        match ClientMessage::from_json(text) {
            Ok(msg) => self.room.handle_change(self.site, msg).await,
            Err(e) => {
                warn!(
                    "Dropping undecodable frame from connection {}: {}",
                    self.connection_id, e
                );
                None
            }
        }
    }

    /// Receive the next relayed change from another replica.
    ///
    /// The connection's own changes are filtered out here; the submitter gets
    /// an ack instead of an echo. A lagging receiver is handed a fresh
    /// snapshot, which resets its replica the same way a reconnect would.
    pub async fn recv_broadcast(&mut self) -> Option<ServerMessage> {
        loop {
            match self.broadcast_rx.recv().await {
                Ok((from, msg)) => {
                    if from == self.site {
                        continue;
                    }
                    return Some(msg);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        "Connection {} lagged {} messages, sending fresh snapshot",
                        self.connection_id, n
                    );
                    return Some(self.room.init_message(self.site).await);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.room.unsubscribe();
        debug!(
            "Connection closed: id={}, site={}, room={}",
            self.connection_id,
            self.site,
            self.room.doc_id()
        );
    }
}
