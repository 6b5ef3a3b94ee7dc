//! Mode controller and sync plumbing for the Lagekarte sync core.
//!
//! An instance runs in one of three modes:
//!
//! - **standalone**: data stays in the local store
//! - **server**: the embedded server from `lagekarte-server` runs and the
//!   local store is pushed to every connected peer
//! - **client**: the instance connects to another instance's server and
//!   keeps its local store in sync
//!
//! [`SyncController`] owns the mode, the local [`EntityStore`]
//! (`lagekarte_store::EntityStore`), and the [`Notifier`] the UI layer
//! subscribes to. The supporting modules hold the client connection with
//! its reconnect loop, LAN discovery, persisted settings, and the YAML
//! application configuration.
//!
//! [`EntityStore`]: lagekarte_store::EntityStore

pub mod client;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod notify;
pub mod settings;
pub mod timer;

// Re-export primary types for convenience.
pub use client::{ClientConnection, ClientOptions, ConnectionState};
pub use config::{AppConfig, CONFIG_FILE_NAME};
pub use controller::{ControllerOptions, ControllerStatus, SyncController};
pub use discovery::{DiscoveryOptions, DiscoveryProgress};
pub use error::{ConfigError, SyncError};
pub use notify::{ListenerId, Notifier, Origin, SyncEvent};
pub use settings::{ProxyMode, ProxySettings, ProxySettingsStore, SyncConfig, SyncConfigStore, SyncMode};
pub use timer::OneShot;
