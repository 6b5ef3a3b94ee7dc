//! Host binary for the Lagekarte sync core.
//!
//! Wires the entity store, the embedded sync server, and the sync
//! controller together and keeps them running until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `lagekarte-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Open the entity store in the data directory
//! 4. Create the embedded sync server
//! 5. Create the sync controller and register the change log listener
//! 6. Restore the persisted sync mode
//! 7. Wait for Ctrl-C, then leave the active mode

mod error;

use std::path::Path;

use lagekarte_server::TransportServer;
use lagekarte_store::{EntityStore, JsonFilePersistence};
use lagekarte_sync::config::LoggingConfig;
use lagekarte_sync::{
    AppConfig, CONFIG_FILE_NAME, ControllerOptions, ControllerStatus, Origin, SyncConfigStore,
    SyncController,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the entity store cannot be opened or the shutdown
/// signal cannot be awaited.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Errors are reported once logging is up.
    let loaded = AppConfig::load_or_default(Path::new(CONFIG_FILE_NAME));
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("lagekarte starting");
    if let Err(e) = &loaded {
        warn!(path = CONFIG_FILE_NAME, error = %e, "Falling back to default configuration");
    }
    info!(
        data_dir = %config.storage.data_dir.display(),
        host = %config.server.host,
        default_port = config.server.default_port,
        debounce_ms = config.sync.debounce_ms,
        "Configuration loaded"
    );

    // 3. Open the entity store.
    let persistence = JsonFilePersistence::new(&config.storage.data_dir).map_err(AppError::from)?;
    let store = EntityStore::open(persistence).map_err(AppError::from)?;
    info!(
        stations = store.stations().len(),
        vehicles = store.vehicles().len(),
        "Entity store opened"
    );

    // 4. Create the embedded sync server. It binds only in server mode.
    let server = TransportServer::new(config.server.to_server_config());

    // 5. Create the sync controller.
    let controller = SyncController::new(
        store,
        server,
        SyncConfigStore::new(&config.storage.data_dir),
        ControllerOptions::from_config(&config),
    );
    controller.notifier().add_listener(|event| {
        let origin = match event.origin {
            Origin::Local => "local",
            Origin::Remote => "remote",
        };
        debug!(event = event.event_type(), origin, "Entity change");
        Ok(())
    });

    // 6. Restore the persisted sync mode.
    match controller.restore().await {
        Ok(status) => info!(status = status.as_str(), "Sync mode restored"),
        Err(e) => warn!(error = %e, "Sync mode restored with errors"),
    }
    if controller.status().await == ControllerStatus::ServerMode {
        for address in controller.network_info() {
            info!(interface = %address.name, url = %address.ws_url, "Sync server reachable");
        }
    }

    // 7. Run until Ctrl-C.
    tokio::signal::ctrl_c().await.map_err(AppError::from)?;
    info!("Shutdown requested");
    controller.shutdown().await;
    info!("lagekarte stopped");

    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
