//! Client-mode connection to a remote sync server.
//!
//! [`ClientConnection::spawn`] starts a supervisor task that connects,
//! requests a full resync, dispatches every inbound message to a handler,
//! and forwards outbound messages. When the connection fails or closes the
//! supervisor waits a fixed delay and tries again, until the connection is
//! shut down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lagekarte_types::SyncMessage;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Connection sub-state while in client mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected; a reconnect may be pending.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and synchronizing.
    Connected,
    /// The last connection attempt failed.
    Error,
}

/// Handler for messages received from the server.
pub type InboundHandler = Arc<dyn Fn(SyncMessage) + Send + Sync>;

/// Parameters for one client connection.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server URL, e.g. `ws://192.168.1.20:8080`.
    pub url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

/// A supervised connection to a remote sync server.
#[derive(Debug)]
pub struct ClientConnection {
    url: String,
    outbound: mpsc::UnboundedSender<SyncMessage>,
    state: Arc<watch::Sender<ConnectionState>>,
    attempts: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl ClientConnection {
    /// Start connecting in the background.
    ///
    /// State transitions are published on `state`; the sender is shared so
    /// observers survive across connections.
    pub fn spawn(
        options: ClientOptions,
        state: Arc<watch::Sender<ConnectionState>>,
        on_message: InboundHandler,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(supervise(
            options.clone(),
            Arc::clone(&state),
            Arc::clone(&attempts),
            outbound_rx,
            on_message,
        ));
        Self {
            url: options.url,
            outbound,
            state,
            attempts,
            task,
        }
    }

    /// The server URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Queue a message for the server.
    ///
    /// Returns `false` (and drops the message) unless connected.
    pub fn send(&self, message: SyncMessage) -> bool {
        if self.state() != ConnectionState::Connected {
            debug!(kind = message.kind(), "Not connected, dropping outbound message");
            return false;
        }
        self.outbound.send(message).is_ok()
    }

    /// Stop the connection and cancel any pending reconnect.
    pub fn shutdown(self) {
        self.task.abort();
        self.state.send_replace(ConnectionState::Disconnected);
        info!(url = %self.url, "Sync client disconnected");
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// How a connected session ended.
enum SessionEnd {
    Closed,
    Failed(String),
}

async fn supervise(
    options: ClientOptions,
    state: Arc<watch::Sender<ConnectionState>>,
    attempts: Arc<AtomicU64>,
    mut outbound: mpsc::UnboundedReceiver<SyncMessage>,
    on_message: InboundHandler,
) {
    loop {
        let attempt = attempts.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        state.send_replace(ConnectionState::Connecting);
        info!(url = %options.url, attempt, "Connecting to sync server");

        match tokio_tungstenite::connect_async(options.url.as_str()).await {
            Ok((socket, _)) => {
                info!(url = %options.url, "Connected to sync server");
                // Anything queued before this connection was meant for a
                // previous one.
                while outbound.try_recv().is_ok() {}

                match run_session(socket, &state, &mut outbound, &on_message).await {
                    SessionEnd::Closed => info!(url = %options.url, "Sync server closed the connection"),
                    SessionEnd::Failed(e) => warn!(url = %options.url, error = %e, "Sync connection lost"),
                }
                state.send_replace(ConnectionState::Disconnected);
            }
            Err(e) => {
                warn!(url = %options.url, error = %e, "Failed to connect to sync server");
                state.send_replace(ConnectionState::Error);
            }
        }

        info!(
            url = %options.url,
            delay_ms = u64::try_from(options.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting after delay"
        );
        tokio::time::sleep(options.reconnect_delay).await;
    }
}

async fn run_session(
    mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    state: &watch::Sender<ConnectionState>,
    outbound: &mut mpsc::UnboundedReceiver<SyncMessage>,
    on_message: &InboundHandler,
) -> SessionEnd {
    if let Err(e) = send(&mut socket, &SyncMessage::sync_request()).await {
        return SessionEnd::Failed(e);
    }
    state.send_replace(ConnectionState::Connected);

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(message) => {
                        if let Err(e) = send(&mut socket, &message).await {
                            return SessionEnd::Failed(e);
                        }
                    }
                    None => return SessionEnd::Closed,
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => dispatch(text.as_str(), on_message),
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Ok(_)) => {
                        // Pings are answered by the protocol layer.
                    }
                    Some(Err(e)) => return SessionEnd::Failed(e.to_string()),
                }
            }
        }
    }
}

async fn send(
    socket: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    message: &SyncMessage,
) -> Result<(), String> {
    let frame = message.encode().map_err(|e| e.to_string())?;
    socket
        .send(Message::Text(frame.into()))
        .await
        .map_err(|e| e.to_string())
}

fn dispatch(text: &str, on_message: &InboundHandler) {
    match SyncMessage::decode(text) {
        Ok(message) => on_message(message),
        Err(e) => warn!(error = %e, "Dropping undecodable message from sync server"),
    }
}
