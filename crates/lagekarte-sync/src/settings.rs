//! Per-instance settings persisted as JSON in the data directory.
//!
//! - `sync-config.json`: the selected [`SyncMode`], remote server URL and
//!   port, and the stable [`ClientId`] of this instance.
//! - `proxy-settings.json`: outbound proxy preferences for the host
//!   application.
//!
//! Both files are written on every change and read at startup. Missing
//! files yield defaults; stored fields are merged over the defaults so files
//! written by older versions keep loading.

use std::fs;
use std::path::{Path, PathBuf};

use lagekarte_types::ClientId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// File name of the sync settings inside the data directory.
pub const SYNC_CONFIG_FILE_NAME: &str = "sync-config.json";

/// File name of the proxy settings inside the data directory.
pub const PROXY_SETTINGS_FILE_NAME: &str = "proxy-settings.json";

// ---------------------------------------------------------------------------
// Sync configuration
// ---------------------------------------------------------------------------

/// How this instance participates in synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// No network activity.
    #[default]
    Standalone,
    /// Host the embedded sync server.
    Server,
    /// Connect to a remote sync server.
    Client,
}

/// Persisted sync settings for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Selected mode.
    #[serde(default)]
    pub mode: SyncMode,
    /// Remote server URL for client mode (e.g. `ws://192.168.1.20:8080`).
    #[serde(default)]
    pub server_url: String,
    /// Port the embedded server listens on in server mode.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Stable identifier of this instance, generated once.
    #[serde(default)]
    pub client_id: ClientId,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Standalone,
            server_url: String::new(),
            server_port: default_server_port(),
            client_id: ClientId::default(),
        }
    }
}

const fn default_server_port() -> u16 {
    8080
}

/// Reads and writes `sync-config.json`.
#[derive(Debug, Clone)]
pub struct SyncConfigStore {
    path: PathBuf,
    default_port: u16,
}

impl SyncConfigStore {
    /// Settings stored in `<data_dir>/sync-config.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SYNC_CONFIG_FILE_NAME),
            default_port: default_server_port(),
        }
    }

    /// Use `port` when the file is missing or names no server port.
    #[must_use]
    pub const fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the settings.
    ///
    /// A missing or unreadable file yields the defaults, with the store's
    /// default port as server port. If the loaded
    /// settings carry no client id, one is generated and persisted right
    /// away so every later start reuses it.
    pub fn load(&self) -> SyncConfig {
        let defaults = SyncConfig {
            server_port: self.default_port,
            ..SyncConfig::default()
        };
        let mut config = match self.read() {
            Ok(Some(config)) => config,
            Ok(None) => defaults,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable sync settings, using defaults");
                defaults
            }
        };

        if config.client_id.is_unassigned() {
            config.client_id = ClientId::generate();
            info!(client_id = %config.client_id, "Generated client id");
            if let Err(e) = self.save(&config) {
                warn!(error = %e, "Failed to persist generated client id");
            }
        }
        config
    }

    /// Persist the settings.
    pub fn save(&self, config: &SyncConfig) -> Result<(), ConfigError> {
        write_json(&self.path, config)
    }

    fn read(&self) -> Result<Option<SyncConfig>, ConfigError> {
        let Some(mut value) = read_json::<serde_json::Value>(&self.path)? else {
            return Ok(None);
        };
        if let Some(fields) = value.as_object_mut() {
            fields
                .entry("serverPort")
                .or_insert_with(|| self.default_port.into());
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

// ---------------------------------------------------------------------------
// Proxy settings
// ---------------------------------------------------------------------------

/// How outbound HTTP traffic of the host application is routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Use the operating system's proxy configuration.
    #[default]
    System,
    /// Use the proxy in [`ProxySettings::proxy_url`].
    Manual,
    /// Connect directly.
    Direct,
    /// Use the PAC script at [`ProxySettings::pac_url`].
    Pac,
}

/// Outbound proxy preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    /// Selected routing mode.
    #[serde(default)]
    pub mode: ProxyMode,
    /// Proxy URL for manual mode.
    #[serde(default)]
    pub proxy_url: String,
    /// Comma-separated hosts that bypass the proxy.
    #[serde(default = "default_bypass_rules")]
    pub proxy_bypass_rules: String,
    /// PAC script URL for PAC mode.
    #[serde(default)]
    pub pac_url: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            mode: ProxyMode::System,
            proxy_url: String::new(),
            proxy_bypass_rules: default_bypass_rules(),
            pac_url: String::new(),
        }
    }
}

fn default_bypass_rules() -> String {
    String::from("localhost,127.0.0.1")
}

/// Reads and writes `proxy-settings.json`.
#[derive(Debug, Clone)]
pub struct ProxySettingsStore {
    path: PathBuf,
}

impl ProxySettingsStore {
    /// Settings stored in `<data_dir>/proxy-settings.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PROXY_SETTINGS_FILE_NAME),
        }
    }

    /// Load the settings. Missing or corrupt files yield the defaults.
    pub fn load(&self) -> ProxySettings {
        match read_json(&self.path) {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable proxy settings, using defaults");
                ProxySettings::default()
            }
        }
    }

    /// Persist the settings.
    pub fn save(&self, settings: &ProxySettings) -> Result<(), ConfigError> {
        write_json(&self.path, settings)
    }
}

// ---------------------------------------------------------------------------
// JSON file helpers
// ---------------------------------------------------------------------------

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
