//! `WebSocket` handler for the sync channel.
//!
//! Peers connect to `GET /` or `GET /ws`. On upgrade the peer receives the
//! full snapshot as a `sync_data` frame and joins the broadcast set. Every
//! text frame it sends is handed to the [`Hub`](crate::hub::Hub); frames the
//! hub queues for this peer are forwarded to the socket.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::handlers;
use crate::hub::{Outbound, PeerId};
use crate::state::AppState;

/// Upgrade an HTTP request to a sync `WebSocket`.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_sync(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_peer(socket, state))
}

/// Serve the sync `WebSocket` on the root path, falling back to the HTML
/// status page for plain HTTP requests.
///
/// # Route
///
/// `GET /`
pub async fn root(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .on_upgrade(|socket| handle_peer(socket, state))
            .into_response(),
        Err(_) => handlers::index(State(state)).await.into_response(),
    }
}

/// Run one peer connection until either side closes it.
async fn handle_peer(mut socket: WebSocket, state: Arc<AppState>) {
    let peer = PeerId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.hub.lock().await.join(peer, tx);
    info!(%peer, "Sync peer connected");

    loop {
        tokio::select! {
            // Frames queued for this peer by the hub.
            outbound = rx.recv() => {
                match outbound {
                    Some(Outbound::Text(frame)) => {
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            debug!(%peer, "Sync peer disconnected (send failed)");
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        if socket.send(Message::Close(None)).await.is_err() {
                            debug!(%peer, "Sync peer already gone while closing");
                        }
                        break;
                    }
                }
            }
            // Frames sent by the peer.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let mut hub = state.hub.lock().await;
                        if let Some(applied) = hub.handle_text(peer, text.as_str()) {
                            state.publish(&applied);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(%peer, "Sync peer disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%peer, "Sync peer closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(%peer, error = %e, "Sync peer socket error");
                        break;
                    }
                    _ => {
                        // Binary and pong frames carry nothing for us.
                    }
                }
            }
        }
    }

    state.hub.lock().await.leave(peer);
    info!(%peer, "Sync peer disconnected");
}
