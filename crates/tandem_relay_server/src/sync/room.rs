use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tandem_core::ot::{Operation, SiteId};
use tandem_core::protocol::{ClientMessage, ServerMessage};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

/// Statistics about the relay state
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub active_connections: usize,
    pub active_rooms: usize,
}

/// Global relay state managing all rooms
pub struct RelayState {
    /// Map of document id to RelayRoom
    rooms: RwLock<HashMap<String, Arc<RelayRoom>>>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Create a new RelayState
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create a room for a document
    pub async fn get_or_create_room(&self, doc_id: &str) -> Arc<RelayRoom> {
        // Check if room exists
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(doc_id) {
                return room.clone();
            }
        }

        // Create new room
        let mut rooms = self.rooms.write().await;

        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(doc_id) {
            return room.clone();
        }

        let room = Arc::new(RelayRoom::new(doc_id));
        rooms.insert(doc_id.to_string(), room.clone());
        info!("Created relay room for document: {}", doc_id);

        room
    }

    /// Get an existing room by document id (does not create if not found)
    pub async fn get_room(&self, doc_id: &str) -> Option<Arc<RelayRoom>> {
        let rooms = self.rooms.read().await;
        rooms.get(doc_id).cloned()
    }

    /// Remove a room if it has no active connections
    pub async fn maybe_remove_room(&self, doc_id: &str) {
        let mut rooms = self.rooms.write().await;

        if let Some(room) = rooms.get(doc_id) {
            if room.connection_count() == 0 {
                rooms.remove(doc_id);
                info!("Removed idle relay room: {}", doc_id);
            }
        }
    }

    /// Get statistics about the relay state
    pub async fn get_stats(&self) -> RelayStats {
        let rooms = self.rooms.read().await;
        let active_connections: usize = rooms.values().map(|r| r.connection_count()).sum();

        RelayStats {
            active_connections,
            active_rooms: rooms.len(),
        }
    }
}

/// Canonical state of one relayed document.
///
/// The document text is authoritative only for the snapshot sent to a
/// (re)connecting replica; on every accepted change it is overwritten with
/// the submitter's post-edit text rather than recomputed. The room never
/// transforms operations: its contribution to convergence is being the single
/// point that orders them.
struct RoomDoc {
    document: String,
    revision: u64,
}

/// A relay room for a single document
pub struct RelayRoom {
    doc_id: String,
    /// Canonical document and authoritative revision counter
    state: RwLock<RoomDoc>,
    /// Broadcast channel fanning accepted changes out to connections; the
    /// submitting site is tagged so receivers can drop their own echo
    broadcast_tx: broadcast::Sender<(SiteId, ServerMessage)>,
    /// Number of active connections
    connection_count: AtomicUsize,
    /// Next site id to hand out
    next_site: AtomicU64,
}

impl RelayRoom {
    /// Create a new, empty room
    fn new(doc_id: &str) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);

        Self {
            doc_id: doc_id.to_string(),
            state: RwLock::new(RoomDoc {
                document: String::new(),
                revision: 0,
            }),
            broadcast_tx,
            connection_count: AtomicUsize::new(0),
            next_site: AtomicU64::new(1),
        }
    }

    /// The document id this room relays
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Register a new connection: allocate its site id and subscribe it to
    /// the room's broadcasts
    pub fn subscribe(&self) -> (SiteId, broadcast::Receiver<(SiteId, ServerMessage)>) {
        self.connection_count.fetch_add(1, Ordering::SeqCst);
        let site = SiteId(self.next_site.fetch_add(1, Ordering::SeqCst));
        (site, self.broadcast_tx.subscribe())
    }

    /// Unsubscribe a connection
    pub fn unsubscribe(&self) {
        self.connection_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Build the snapshot message for a (re)connecting replica
    pub async fn init_message(&self, site: SiteId) -> ServerMessage {
        let state = self.state.read().await;
        ServerMessage::Init {
            document: state.document.clone(),
            revision: state.revision,
            site,
        }
    }

    /// Handle a change submitted by `site`.
    ///
    /// The operation is decoded only to validate it; it is relayed unchanged.
    /// Returns the ack for the submitter, or `None` when the message was
    /// dropped as malformed (no ack is sent for dropped messages).
    pub async fn handle_change(&self, site: SiteId, msg: ClientMessage) -> Option<ServerMessage> {
        let ClientMessage::Change {
            document,
            operation,
            revision,
        } = msg;

        if let Err(e) = Operation::try_from(operation.clone()) {
            warn!(
                "Dropping malformed change from site {} in room {}: {}",
                site, self.doc_id, e
            );
            return None;
        }

        let new_revision;
        {
            let mut state = self.state.write().await;
            state.document = document.clone();
            state.revision += 1;
            new_revision = state.revision;
        }

        debug!(
            "Accepted change from site {} in room {}: revision {} -> {}",
            site,
            self.doc_id,
            revision,
            new_revision
        );

        // Relay the operation exactly as submitted; receivers decide whether
        // it needs transforming against their own outstanding edits.
        let _ = self.broadcast_tx.send((
            site,
            ServerMessage::Change {
                document,
                operation,
                revision,
                site,
            },
        ));

        Some(ServerMessage::Ack)
    }
}
