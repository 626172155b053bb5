//! Tandem Relay Server
//!
//! The sequencer for Tandem's collaborative editing protocol: a WebSocket
//! relay that orders the edits of all connected replicas of a document and
//! fans them out. It never transforms operations — conflict resolution
//! happens on the replicas — but by serializing submissions it defines which
//! operations count as concurrent.
//!
//! ## Protocol
//!
//! - On connect (`GET /sync?doc=<name>` upgraded to WebSocket) a replica
//!   receives an `init` snapshot with the canonical document text, the
//!   current revision, and its assigned site id.
//! - A replica submits edits as `change` messages; the relay stores the
//!   sender's post-edit snapshot, advances the revision, relays the operation
//!   unchanged to every other replica in the room, and acks the submitter.
//!
//! ## Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 3000)
//! - `CORS_ORIGINS`: Comma-separated list of allowed origins

use std::sync::Arc;

use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod handlers;
pub mod sync;

pub use config::Config;

use handlers::{api::ApiState, ws::WsState};
use sync::RelayState;

/// Build the relay's router over a shared relay state.
pub fn router(relay: Arc<RelayState>) -> Router {
    let ws_state = WsState {
        relay: relay.clone(),
    };
    let api_state = ApiState { relay };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any); // In production, use specific origins from config

    Router::new()
        // Health check
        .route("/", get(|| async { "Tandem Relay Server" }))
        .route("/health", get(|| async { "OK" }))
        // WebSocket sync endpoint
        .route("/sync", get(handlers::ws_handler).with_state(ws_state))
        // API routes
        .nest("/api", handlers::api_routes(api_state))
        // Add layers
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
