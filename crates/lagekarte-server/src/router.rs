//! Axum router construction for the sync server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`] with
//! CORS enabled so the read-only viewer can be loaded from another origin.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the sync server.
///
/// The router includes:
/// - `GET /` -- sync `WebSocket`, or the HTML status page for plain HTTP
/// - `GET /ws` -- sync `WebSocket`
/// - `GET /api/state` -- current snapshot
/// - `GET /api/status` -- server status
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws::root))
        .route("/ws", get(ws::ws_sync))
        .route("/api/state", get(handlers::get_state))
        .route("/api/status", get(handlers::get_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
