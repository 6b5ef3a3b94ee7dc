//! Sync server lifecycle management.
//!
//! [`TransportServer`] binds a TCP port and runs the Axum server on a
//! background task until [`TransportServer::stop`] is called. Both calls are
//! idempotent. The shared [`AppState`] outlives individual runs, so the
//! snapshot survives a stop/start cycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lagekarte_types::SyncState;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ServerError;
use crate::network::{self, NetworkAddress};
use crate::router::build_router;
use crate::state::{AppState, MutationHook};

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// How long `stop` waits for the server task before aborting it.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            shutdown_grace: Duration::from_millis(2000),
        }
    }
}

/// Result of a successful [`TransportServer::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInfo {
    /// The bound port.
    pub port: u16,
    /// `WebSocket` URL for local display.
    pub ws_url: String,
    /// HTTP URL for local display.
    pub http_url: String,
    /// `true` if the server was already running before this call.
    #[serde(skip)]
    pub already_running: bool,
}

impl StartInfo {
    fn new(port: u16, already_running: bool) -> Self {
        Self {
            port,
            ws_url: ws_url(port),
            http_url: http_url(port),
            already_running,
        }
    }
}

/// Point-in-time status of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Whether the listener is bound.
    pub is_running: bool,
    /// The bound port, if running.
    pub port: Option<u16>,
    /// Number of connected peers.
    pub client_count: usize,
    /// `WebSocket` URL, if running.
    pub ws_url: Option<String>,
    /// HTTP URL, if running.
    pub http_url: Option<String>,
}

impl ServerStatus {
    /// Read the status from shared state.
    pub async fn collect(state: &AppState) -> Self {
        let port = state.port();
        Self {
            is_running: port.is_some(),
            port,
            client_count: state.peer_count().await,
            ws_url: port.map(ws_url),
            http_url: port.map(http_url),
        }
    }
}

fn ws_url(port: u16) -> String {
    format!("ws://localhost:{port}")
}

fn http_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// A bound, serving instance.
#[derive(Debug)]
struct Running {
    port: u16,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The embedded sync server.
///
/// Constructed explicitly by whoever owns the process entry point; there is
/// no global instance.
#[derive(Debug)]
pub struct TransportServer {
    config: ServerConfig,
    state: Arc<AppState>,
    running: Mutex<Option<Running>>,
}

impl TransportServer {
    /// Create a stopped server with an empty snapshot.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new()),
            running: Mutex::new(None),
        }
    }

    /// The shared state served by this instance.
    pub const fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Bind `port` and begin serving.
    ///
    /// If the server is already running this returns the existing port
    /// without rebinding. Port `0` binds an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AddressInUse`] if another process holds the
    /// port, [`ServerError::Bind`] for other bind failures, and
    /// [`ServerError::InvalidAddress`] if the configured host is not an IP
    /// address.
    pub async fn start(&self, port: u16) -> Result<StartInfo, ServerError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            info!(port = current.port, "Sync server already running");
            return Ok(StartInfo::new(current.port, true));
        }

        let addr: SocketAddr = format!("{}:{port}", self.config.host)
            .parse()
            .map_err(|e| ServerError::InvalidAddress(format!("{}:{port}: {e}", self.config.host)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::from_bind(addr, &e))?;
        let bound = listener
            .local_addr()
            .map_err(|e| ServerError::from_bind(addr, &e))?
            .port();

        self.state.hub.lock().await.reopen();
        let router = build_router(Arc::clone(&self.state));
        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    // A dropped sender also means shut down.
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Sync server exited with error");
            }
        });

        self.state.mark_running(bound);
        *running = Some(Running {
            port: bound,
            shutdown,
            handle,
        });

        info!(port = bound, url = %ws_url(bound), "Sync server listening");
        Ok(StartInfo::new(bound, false))
    }

    /// Stop listening, close every peer, and return to the stopped state.
    ///
    /// The listener is told to shut down before the peers are closed, and
    /// the hub turns away any upgrade that completes in between.
    ///
    /// Returns `false` if the server was not running.
    pub async fn stop(&self) -> bool {
        let Some(current) = self.running.lock().await.take() else {
            return false;
        };

        self.state.mark_stopped();
        if current.shutdown.send(()).is_err() {
            warn!("Sync server task ended before shutdown was requested");
        }
        self.state.hub.lock().await.close_all();

        let abort = current.handle.abort_handle();
        match tokio::time::timeout(self.config.shutdown_grace, current.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Sync server task failed during shutdown"),
            Err(_) => {
                warn!(
                    grace_ms = self.config.shutdown_grace.as_millis(),
                    "Sync server did not stop in time, aborting"
                );
                abort.abort();
            }
        }

        info!(port = current.port, "Sync server stopped");
        true
    }

    /// Current running state, port, peer count, and URLs.
    pub async fn status(&self) -> ServerStatus {
        ServerStatus::collect(&self.state).await
    }

    /// Replace the snapshot wholesale and push it to every peer.
    pub async fn update_state(&self, state: SyncState) {
        self.state.hub.lock().await.replace_state(state);
    }

    /// Like [`TransportServer::update_state`], but the snapshot is produced
    /// by `snapshot` while the hub lock is held.
    ///
    /// No peer mutation can be applied between taking the snapshot and
    /// pushing it, so a snapshot read from a store the
    /// [`MutationHook`] mirrors into never drops a peer's edit.
    pub async fn update_state_with(&self, snapshot: impl FnOnce() -> SyncState) {
        let mut hub = self.state.hub.lock().await;
        let state = snapshot();
        hub.replace_state(state);
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> SyncState {
        self.state.snapshot().await
    }

    /// Install the hook that sees every mutation applied on behalf of a
    /// peer. See [`MutationHook`].
    pub fn set_mutation_hook(&self, hook: MutationHook) {
        self.state.set_mutation_hook(hook);
    }

    /// Remove the mutation hook.
    pub fn clear_mutation_hook(&self) {
        self.state.clear_mutation_hook();
    }

    /// Connection URLs per non-loopback interface. Empty while stopped.
    pub fn network_info(&self) -> Vec<NetworkAddress> {
        self.state
            .port()
            .map(network::network_addresses)
            .unwrap_or_default()
    }
}

impl Default for TransportServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
