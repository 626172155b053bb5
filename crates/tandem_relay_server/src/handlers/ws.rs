use crate::sync::{ClientConnection, RelayState};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Document name
    pub doc: String,
}

/// Shared state for WebSocket handler
#[derive(Clone)]
pub struct WsState {
    pub relay: Arc<RelayState>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<WsState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    info!("WebSocket upgrade: doc={}", query.doc);

    ws.on_upgrade(move |socket| handle_socket(socket, state, query.doc))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: WsState, doc_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Get or create the relay room
    let room = state.relay.get_or_create_room(&doc_id).await;

    // Register this replica with the room
    let mut connection = ClientConnection::new(room.clone());

    info!(
        "WebSocket connected: doc={}, site={}, connections={}",
        doc_id,
        connection.site,
        room.connection_count()
    );

    // Send the initial snapshot
    let init = connection.init_message().await;
    match init.to_json() {
        Ok(json) => {
            if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                error!("Failed to send initial snapshot: {}", e);
                return;
            }
        }
        Err(e) => {
            error!("Failed to encode initial snapshot: {}", e);
            return;
        }
    }

    // Handle bidirectional communication
    loop {
        tokio::select! {
            // Handle incoming messages from the replica
            Some(msg) = ws_rx.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Some(reply) = connection.handle_frame(text.as_str()).await {
                            match reply.to_json() {
                                Ok(json) => {
                                    if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                                        error!("Failed to send ack: {}", e);
                                        break;
                                    }
                                }
                                Err(e) => error!("Failed to encode ack: {}", e),
                            }
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Client requested close");
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Relay changes from other replicas
            Some(broadcast_msg) = connection.recv_broadcast() => {
                match broadcast_msg.to_json() {
                    Ok(json) => {
                        if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                            error!("Failed to relay change: {}", e);
                            break;
                        }
                    }
                    Err(e) => error!("Failed to encode relayed change: {}", e),
                }
            }

            else => break,
        }
    }

    info!("WebSocket disconnected: doc={}, site={}", doc_id, connection.site);

    // Deregister before deciding whether the room is idle
    drop(connection);
    state.relay.maybe_remove_room(&doc_id).await;
}
