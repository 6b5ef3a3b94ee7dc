//! The sync mode controller.
//!
//! [`SyncController`] owns the local [`EntityStore`] and decides what happens
//! to each change, based on the active [`SyncMode`]:
//!
//! - **standalone**: changes stay local.
//! - **server**: the embedded [`TransportServer`] runs; local changes are
//!   coalesced on a trailing debounce and pushed as one full snapshot;
//!   mutations peers send to the server are mirrored into the local store
//!   under the server's hub lock, and the push reads the store under the
//!   same lock, so a push never rolls back a peer's edit.
//! - **client**: a [`ClientConnection`] to a remote server is supervised;
//!   local changes are sent as discrete messages, inbound messages are
//!   applied to the local store.
//!
//! Every change carries its provenance. Local changes go through the
//! controller's mutation methods and are propagated; remote changes are
//! applied straight to the store and only notified, so they are never sent
//! back out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lagekarte_server::{MutationHook, NetworkAddress, TransportServer};
use lagekarte_store::{EntityStore, ExportBundle, Roster, StoreChange};
use lagekarte_types::{
    DeploymentInfo, Position, Station, StationId, SyncMessage, SyncState, Vehicle, VehicleId,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::{ClientConnection, ClientOptions, ConnectionState, InboundHandler};
use crate::config::AppConfig;
use crate::discovery::{self, DiscoveryOptions, DiscoveryProgress};
use crate::error::SyncError;
use crate::notify::{Notifier, SyncEvent};
use crate::settings::{SyncConfig, SyncConfigStore, SyncMode};
use crate::timer::OneShot;

/// Timing and fallback values for the controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Fixed delay between client reconnect attempts.
    pub reconnect_delay: Duration,
    /// Trailing debounce window for server-mode snapshot pushes.
    pub debounce: Duration,
    /// Server URL used when the persisted settings have none.
    pub fallback_server_url: String,
    /// Server port used when the persisted settings have none.
    pub default_port: u16,
    /// Discovery scan parameters.
    pub discovery: DiscoveryOptions,
}

impl ControllerOptions {
    /// Options taken from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reconnect_delay: config.sync.reconnect_delay(),
            debounce: config.sync.debounce(),
            fallback_server_url: config.sync.server_url.clone(),
            default_port: config.server.default_port,
            discovery: config.discovery.to_options(),
        }
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What the UI shows as the sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerStatus {
    /// Standalone mode.
    Standalone,
    /// Server mode with the server running.
    ServerMode,
    /// Client mode, connection attempt in flight.
    Connecting,
    /// Client mode, connected.
    Connected,
    /// Client mode, not connected.
    Disconnected,
    /// Server failed to start, or the last client connect failed.
    Error,
}

impl ControllerStatus {
    /// Status name as shown in the UI.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::ServerMode => "server-mode",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl From<ConnectionState> for ControllerStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Disconnected => Self::Disconnected,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Error => Self::Error,
        }
    }
}

/// The transport machinery of the active mode.
enum Active {
    Standalone,
    Server,
    ServerFailed,
    Client(Option<ClientConnection>),
}

struct ModeState {
    config: SyncConfig,
    active: Active,
}

/// Three-mode sync state machine around the local entity store.
pub struct SyncController {
    store: Arc<Mutex<EntityStore>>,
    notifier: Arc<Notifier>,
    server: Arc<TransportServer>,
    settings: SyncConfigStore,
    options: ControllerOptions,
    mode: tokio::sync::Mutex<ModeState>,
    debounce: OneShot,
    connection: Arc<watch::Sender<ConnectionState>>,
}

impl std::fmt::Debug for SyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("settings", &self.settings)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SyncController {
    /// Create a controller in standalone mode.
    ///
    /// Call [`SyncController::restore`] to switch to the persisted mode.
    /// Settings that name no server port fall back to
    /// [`ControllerOptions::default_port`].
    pub fn new(
        store: EntityStore,
        server: TransportServer,
        settings: SyncConfigStore,
        options: ControllerOptions,
    ) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            store: Arc::new(Mutex::new(store)),
            notifier: Arc::new(Notifier::new()),
            server: Arc::new(server),
            settings: settings.with_default_port(options.default_port),
            options,
            mode: tokio::sync::Mutex::new(ModeState {
                config: SyncConfig::default(),
                active: Active::Standalone,
            }),
            debounce: OneShot::new(),
            connection: Arc::new(connection),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The change notifier. Register UI listeners here.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// The embedded server.
    pub fn server(&self) -> &TransportServer {
        &self.server
    }

    /// A copy of the local snapshot.
    pub fn snapshot(&self) -> SyncState {
        lock_store(&self.store).snapshot()
    }

    /// All local stations.
    pub fn stations(&self) -> Vec<Station> {
        lock_store(&self.store).stations().to_vec()
    }

    /// All local vehicles.
    pub fn vehicles(&self) -> Vec<Vehicle> {
        lock_store(&self.store).vehicles().to_vec()
    }

    /// Vehicles grouped by station.
    pub fn roster(&self) -> Roster {
        lock_store(&self.store).roster()
    }

    /// A timestamped backup of all local entities.
    pub fn export(&self) -> ExportBundle {
        lock_store(&self.store).export()
    }

    /// The active sync settings.
    pub async fn config(&self) -> SyncConfig {
        self.mode.lock().await.config.clone()
    }

    // -----------------------------------------------------------------------
    // Local mutations
    // -----------------------------------------------------------------------

    /// Insert or replace a station.
    pub async fn save_station(&self, station: Station) -> Station {
        let saved = lock_store(&self.store).upsert_station(station);
        self.commit(StoreChange::StationUpdated(saved.clone())).await;
        saved
    }

    /// Delete a station. Returns `false` if it did not exist.
    pub async fn delete_station(&self, id: &StationId) -> bool {
        let removed = lock_store(&self.store).delete_station(id);
        if removed {
            self.commit(StoreChange::StationDeleted(id.clone())).await;
        }
        removed
    }

    /// Insert or replace a vehicle.
    pub async fn save_vehicle(&self, vehicle: Vehicle) -> Vehicle {
        let saved = lock_store(&self.store).upsert_vehicle(vehicle);
        self.commit(StoreChange::VehicleUpdated(saved.clone())).await;
        saved
    }

    /// Delete a vehicle. Returns `false` if it did not exist.
    pub async fn delete_vehicle(&self, id: &VehicleId) -> bool {
        let removed = lock_store(&self.store).delete_vehicle(id);
        if removed {
            self.commit(StoreChange::VehicleDeleted(id.clone())).await;
        }
        removed
    }

    /// Deploy, move, or recall a vehicle. `None` for an unknown vehicle.
    pub async fn set_vehicle_position(
        &self,
        id: &VehicleId,
        position: Option<Position>,
        deployment_info: Option<DeploymentInfo>,
    ) -> Option<Vehicle> {
        let moved = lock_store(&self.store).set_vehicle_position(id, position, deployment_info)?;
        self.commit(StoreChange::VehicleMoved(moved.clone())).await;
        Some(moved)
    }

    /// Replace all local entities with a backup.
    pub async fn import(&self, bundle: ExportBundle) {
        let snapshot = {
            let mut store = lock_store(&self.store);
            store.import(bundle);
            store.snapshot()
        };
        self.commit(StoreChange::FullSync(snapshot)).await;
    }

    async fn commit(&self, change: StoreChange) {
        self.notifier.notify(&SyncEvent::local(change.clone()));
        self.propagate(&change).await;
    }

    async fn propagate(&self, change: &StoreChange) {
        let mode = self.mode.lock().await;
        match &mode.active {
            Active::Standalone | Active::ServerFailed | Active::Client(None) => {}
            Active::Server => self.schedule_push(),
            Active::Client(Some(connection)) => {
                for message in outbound_messages(change) {
                    if !connection.send(message) {
                        debug!(event = change.event_type(), "Change kept local while offline");
                    }
                }
            }
        }
    }

    fn schedule_push(&self) {
        let store = Arc::clone(&self.store);
        let server = Arc::clone(&self.server);
        self.debounce.schedule(self.options.debounce, async move {
            server
                .update_state_with(|| {
                    let snapshot = lock_store(&store).snapshot();
                    debug!(
                        stations = snapshot.stations.len(),
                        vehicles = snapshot.vehicles.len(),
                        "Pushing snapshot to sync server"
                    );
                    snapshot
                })
                .await;
        });
    }

    // -----------------------------------------------------------------------
    // Mode transitions
    // -----------------------------------------------------------------------

    /// Switch to the mode persisted in the settings file.
    pub async fn restore(&self) -> Result<ControllerStatus, SyncError> {
        let mut config = self.settings.load();
        if config.server_url.is_empty() && !self.options.fallback_server_url.is_empty() {
            config.server_url.clone_from(&self.options.fallback_server_url);
        }
        info!(mode = ?config.mode, "Restoring sync mode");
        self.apply(config).await
    }

    /// Persist `config`, tear down the active mode, and enter the new one.
    ///
    /// A missing client id is filled with the current one.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the settings cannot be written; the
    /// active mode is left untouched then. Returns [`SyncError::Server`] if
    /// server mode cannot bind its port and [`SyncError::MissingServerUrl`]
    /// if client mode has no URL. The new mode stays selected in both of
    /// those cases and [`SyncController::status`] reports the failure.
    pub async fn set_mode(&self, mut config: SyncConfig) -> Result<ControllerStatus, SyncError> {
        if config.client_id.is_unassigned() {
            config.client_id = self.mode.lock().await.config.client_id.clone();
        }
        if let Err(e) = self.settings.save(&config) {
            error!(path = %self.settings.path().display(), error = %e, "Failed to persist sync settings");
            return Err(e.into());
        }
        self.apply(config).await
    }

    async fn apply(&self, config: SyncConfig) -> Result<ControllerStatus, SyncError> {
        let mut mode = self.mode.lock().await;
        self.teardown(&mut mode).await;
        let target = config.mode;
        let port = config.server_port;
        let url = config.server_url.clone();
        mode.config = config;

        let outcome = match target {
            SyncMode::Standalone => {
                info!("Sync disabled (standalone)");
                Ok(())
            }
            SyncMode::Server => self.enter_server(&mut mode, port).await,
            SyncMode::Client => self.enter_client(&mut mode, &url),
        };
        let status = self.status_of(&mode);
        drop(mode);

        outcome.map(|()| status)
    }

    async fn enter_server(&self, mode: &mut ModeState, port: u16) -> Result<(), SyncError> {
        self.server.set_mutation_hook(self.mirror_hook());
        let store = Arc::clone(&self.store);
        self.server
            .update_state_with(|| lock_store(&store).snapshot())
            .await;

        match self.server.start(port).await {
            Ok(started) => {
                info!(port = started.port, url = %started.ws_url, "Server mode active");
                mode.active = Active::Server;
                Ok(())
            }
            Err(e) => {
                error!(port, error = %e, "Failed to enter server mode");
                self.server.clear_mutation_hook();
                mode.active = Active::ServerFailed;
                Err(e.into())
            }
        }
    }

    fn enter_client(&self, mode: &mut ModeState, url: &str) -> Result<(), SyncError> {
        if url.trim().is_empty() {
            warn!("Client mode selected without a server URL");
            mode.active = Active::Client(None);
            return Err(SyncError::MissingServerUrl);
        }

        let connection = ClientConnection::spawn(
            ClientOptions {
                url: url.trim().to_owned(),
                reconnect_delay: self.options.reconnect_delay,
            },
            Arc::clone(&self.connection),
            remote_handler(Arc::clone(&self.store), Arc::clone(&self.notifier)),
        );
        mode.active = Active::Client(Some(connection));
        Ok(())
    }

    async fn teardown(&self, mode: &mut ModeState) {
        match std::mem::replace(&mut mode.active, Active::Standalone) {
            Active::Standalone | Active::ServerFailed => {}
            Active::Server => {
                self.debounce.cancel();
                self.server.stop().await;
                self.server.clear_mutation_hook();
            }
            Active::Client(connection) => {
                if let Some(connection) = connection {
                    connection.shutdown();
                }
                self.connection.send_replace(ConnectionState::Disconnected);
            }
        }
    }

    /// Mirror mutations peers send to the embedded server into the local
    /// store.
    fn mirror_hook(&self) -> MutationHook {
        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        Arc::new(move |message: &SyncMessage| apply_remote(&store, &notifier, message.clone()))
    }

    /// Leave the active mode and return to standalone. Used on shutdown.
    pub async fn shutdown(&self) {
        let mut mode = self.mode.lock().await;
        self.teardown(&mut mode).await;
        info!("Sync controller stopped");
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// The current sync status.
    pub async fn status(&self) -> ControllerStatus {
        let mode = self.mode.lock().await;
        self.status_of(&mode)
    }

    fn status_of(&self, mode: &ModeState) -> ControllerStatus {
        match &mode.active {
            Active::Standalone => ControllerStatus::Standalone,
            Active::Server if self.server.state().is_running() => ControllerStatus::ServerMode,
            Active::Server | Active::ServerFailed => ControllerStatus::Error,
            Active::Client(Some(connection)) => connection.state().into(),
            Active::Client(None) => ControllerStatus::Disconnected,
        }
    }

    /// Observe client connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Connection attempts made by the active client connection.
    pub async fn reconnect_attempts(&self) -> u64 {
        match &self.mode.lock().await.active {
            Active::Client(Some(connection)) => connection.attempts(),
            _ => 0,
        }
    }

    /// Connection URLs of the embedded server per local interface.
    pub fn network_info(&self) -> Vec<NetworkAddress> {
        self.server.network_info()
    }

    /// Scan the local network for sync servers.
    pub async fn discover(&self, progress: impl FnMut(&DiscoveryProgress)) -> Vec<String> {
        discovery::discover(&self.options.discovery, progress).await
    }
}

fn lock_store(store: &Mutex<EntityStore>) -> MutexGuard<'_, EntityStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply a message from the network and notify, without propagating.
fn apply_remote(store: &Mutex<EntityStore>, notifier: &Notifier, message: SyncMessage) {
    let kind = message.kind();
    let change = lock_store(store).apply(message);
    match change {
        Some(change) => notifier.notify(&SyncEvent::remote(change)),
        None => debug!(kind, "Remote message had no effect"),
    }
}

fn remote_handler(store: Arc<Mutex<EntityStore>>, notifier: Arc<Notifier>) -> InboundHandler {
    Arc::new(move |message| apply_remote(&store, &notifier, message))
}

/// Wire messages announcing a local change to the server.
///
/// A full replace has no wire form from a client, so every entity is sent
/// as an update.
fn outbound_messages(change: &StoreChange) -> Vec<SyncMessage> {
    match change {
        StoreChange::FullSync(state) => state
            .stations
            .iter()
            .map(|station| SyncMessage::StationUpdate {
                station: station.clone(),
            })
            .chain(state.vehicles.iter().map(|vehicle| SyncMessage::VehicleUpdate {
                vehicle: vehicle.clone(),
            }))
            .collect(),
        change => change.to_message().into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_match_ui_texts() {
        assert_eq!(ControllerStatus::ServerMode.as_str(), "server-mode");
        assert_eq!(
            serde_json::to_string(&ControllerStatus::ServerMode).unwrap_or_default(),
            r#""server-mode""#
        );
        assert_eq!(
            ControllerStatus::from(ConnectionState::Error),
            ControllerStatus::Error
        );
    }

    #[test]
    fn options_carry_configured_default_port() {
        let mut config = AppConfig::default();
        config.server.default_port = 9001;
        assert_eq!(ControllerOptions::from_config(&config).default_port, 9001);
    }

    #[test]
    fn full_sync_goes_out_as_individual_updates() {
        let state = SyncState::new(
            vec![Station::new("A", 1.0, 1.0)],
            vec![Vehicle::new("X", "MTW"), Vehicle::new("Y", "ELW")],
        );
        let kinds: Vec<&str> = outbound_messages(&StoreChange::FullSync(state))
            .iter()
            .map(SyncMessage::kind)
            .collect();
        assert_eq!(kinds, vec!["station_update", "vehicle_update", "vehicle_update"]);
    }

    #[test]
    fn move_goes_out_as_vehicle_update() {
        let messages = outbound_messages(&StoreChange::VehicleMoved(Vehicle::new("X", "MTW")));
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages.first(), Some(SyncMessage::VehicleUpdate { .. })));
    }
}
