//! Shared application state for the sync server.
//!
//! [`AppState`] holds the [`Hub`] (snapshot plus peer set) behind a Tokio
//! mutex and an optional [`MutationHook`] the hosting instance installs to
//! mirror every mutation applied on behalf of a peer into its own entity
//! store. The hook runs while the hub lock is held, so a snapshot taken
//! under the same lock never misses a mirrored mutation. The state outlives
//! individual server runs: stopping and restarting the server keeps the
//! snapshot.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use lagekarte_types::{SyncMessage, SyncState};
use tokio::sync::Mutex;

use crate::hub::Hub;

/// Callback for mutations applied on behalf of peers.
///
/// Called with the hub lock held. It must not block on the hub.
pub type MutationHook = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
pub struct AppState {
    /// The snapshot and the set of connected peers.
    pub hub: Mutex<Hub>,
    hook: RwLock<Option<MutationHook>>,
    running: AtomicBool,
    port: AtomicU16,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("hub", &self.hub)
            .field("running", &self.running)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new application state with an empty snapshot.
    pub fn new() -> Self {
        Self {
            hub: Mutex::new(Hub::new()),
            hook: RwLock::new(None),
            running: AtomicBool::new(false),
            port: AtomicU16::new(0),
        }
    }

    /// Install the hook for applied peer mutations, replacing any earlier
    /// one.
    pub fn set_mutation_hook(&self, hook: MutationHook) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Remove the mutation hook.
    pub fn clear_mutation_hook(&self) {
        *self.hook.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Hand an applied peer mutation to the hook.
    ///
    /// The caller holds the hub lock. Returns `false` if no hook is
    /// installed, which is not an error.
    pub fn publish(&self, message: &SyncMessage) -> bool {
        let hook = self
            .hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        hook.is_some_and(|hook| {
            hook(message);
            true
        })
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> SyncState {
        self.hub.lock().await.state().clone()
    }

    /// Number of connected peers.
    pub async fn peer_count(&self) -> usize {
        self.hub.lock().await.peer_count()
    }

    /// Whether the listener is currently bound.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The bound port, if running.
    pub fn port(&self) -> Option<u16> {
        self.is_running().then(|| self.port.load(Ordering::Acquire))
    }

    pub(crate) fn mark_running(&self, port: u16) {
        self.port.store(port, Ordering::Release);
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn mark_stopped(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
