//! Application configuration loaded from `lagekarte-config.yaml`.
//!
//! Every field has a default so a missing file, an empty document, or a
//! partial document all yield a usable configuration. A handful of
//! environment variables override the file:
//!
//! - `LAGEKARTE_DATA_DIR` overrides `storage.data_dir`
//! - `LAGEKARTE_SERVER_PORT` overrides `server.default_port`
//! - `LAGEKARTE_SERVER_URL` overrides `sync.server_url`

use std::path::{Path, PathBuf};
use std::time::Duration;

use lagekarte_server::ServerConfig;
use serde::Deserialize;
use tracing::warn;

use crate::discovery::DiscoveryOptions;
use crate::error::ConfigError;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "lagekarte-config.yaml";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Where entity data and settings files live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedded sync server settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Client connection and debounce timing.
    #[serde(default)]
    pub sync: SyncTiming,

    /// LAN discovery scan parameters.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::InvalidValue`] if an override does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Like [`AppConfig::from_file`], but a missing file yields the defaults
    /// (with environment overrides applied).
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = lookup("LAGEKARTE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("LAGEKARTE_SERVER_PORT") {
            self.server.default_port = port.trim().parse().map_err(
                |e: std::num::ParseIntError| ConfigError::InvalidValue {
                    key: String::from("LAGEKARTE_SERVER_PORT"),
                    value: port.clone(),
                    message: e.to_string(),
                },
            )?;
        }
        if let Some(url) = lookup("LAGEKARTE_SERVER_URL") {
            self.sync.server_url = url;
        }
        Ok(())
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `state.json`, `sync-config.json`, and
    /// `proxy-settings.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Embedded sync server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port used when the sync settings do not name one.
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// Milliseconds `stop` waits for the server task before aborting it.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl ServerSection {
    /// The server configuration this section describes.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            default_port: default_port(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Client connection and debounce timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncTiming {
    /// Fixed delay between reconnect attempts in client mode.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Trailing debounce window for server-mode snapshot pushes.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Server URL used when the persisted sync settings have none.
    #[serde(default)]
    pub server_url: String,
}

impl SyncTiming {
    /// Reconnect delay as a [`Duration`].
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Debounce window as a [`Duration`].
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            debounce_ms: default_debounce_ms(),
            server_url: String::new(),
        }
    }
}

/// LAN discovery scan parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryConfig {
    /// Ports probed on every candidate host.
    #[serde(default = "default_discovery_ports")]
    pub ports: Vec<u16>,

    /// Per-probe connect timeout.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound on probes in flight.
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// Upper bound on hosts scanned per interface.
    #[serde(default = "default_max_hosts_per_interface")]
    pub max_hosts_per_interface: usize,
}

impl DiscoveryConfig {
    /// The scan options this section describes.
    pub fn to_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            ports: self.ports.clone(),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            max_concurrent: self.max_concurrent_probes.max(1),
            max_hosts_per_interface: self.max_hosts_per_interface,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ports: default_discovery_ports(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrent_probes: default_max_concurrent_probes(),
            max_hosts_per_interface: default_max_hosts_per_interface(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Read the config at `path`, falling back to defaults with a warning if it
/// cannot be used.
pub fn load_or_warn(path: &Path) -> AppConfig {
    match AppConfig::load_or_default(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Falling back to default configuration");
            AppConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_data_dir() -> PathBuf {
    PathBuf::from("./lagekarte-data")
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

const fn default_shutdown_grace_ms() -> u64 {
    2000
}

const fn default_reconnect_delay_ms() -> u64 {
    5000
}

const fn default_debounce_ms() -> u64 {
    500
}

fn default_discovery_ports() -> Vec<u16> {
    vec![8080, 8081, 8082, 3000]
}

const fn default_probe_timeout_ms() -> u64 {
    500
}

const fn default_max_concurrent_probes() -> usize {
    64
}

const fn default_max_hosts_per_interface() -> usize {
    254
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.storage.data_dir, PathBuf::from("./lagekarte-data"));
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.default_port, 8080);
        assert_eq!(config.sync.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.sync.debounce(), Duration::from_millis(500));
        assert_eq!(config.discovery.ports, vec![8080, 8081, 8082, 3000]);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
storage:
  data_dir: "/var/lib/lagekarte"

server:
  host: "127.0.0.1"
  default_port: 9000
  shutdown_grace_ms: 250

sync:
  reconnect_delay_ms: 1000
  debounce_ms: 100
  server_url: "ws://10.0.0.2:9000"

discovery:
  ports: [9000]
  probe_timeout_ms: 200
  max_concurrent_probes: 8
  max_hosts_per_interface: 16

logging:
  level: "debug"
  json: true
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/lagekarte"));
        assert_eq!(config.server.default_port, 9000);
        assert_eq!(
            config.server.to_server_config().shutdown_grace,
            Duration::from_millis(250)
        );
        assert_eq!(config.sync.reconnect_delay_ms, 1000);
        assert_eq!(config.sync.server_url, "ws://10.0.0.2:9000");
        let options = config.discovery.to_options();
        assert_eq!(options.ports, vec![9000]);
        assert_eq!(options.max_concurrent, 8);
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml_uses_defaults() {
        let config = AppConfig::parse("server:\n  default_port: 3000\n").unwrap();
        assert_eq!(config.server.default_port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.sync, SyncTiming::default());
    }

    #[test]
    fn parse_empty_yaml_uses_defaults() {
        assert_eq!(AppConfig::parse("").unwrap(), AppConfig::default());
        assert_eq!(AppConfig::parse("  \n").unwrap(), AppConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            AppConfig::parse("server: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| match key {
                "LAGEKARTE_DATA_DIR" => Some(String::from("/tmp/lk")),
                "LAGEKARTE_SERVER_PORT" => Some(String::from(" 8081 ")),
                "LAGEKARTE_SERVER_URL" => Some(String::from("ws://server:8081")),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/lk"));
        assert_eq!(config.server.default_port, 8081);
        assert_eq!(config.sync.server_url, "ws://server:8081");
    }

    #[test]
    fn invalid_port_override_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "LAGEKARTE_SERVER_PORT").then(|| String::from("eighty"))
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert_eq!(config.server.default_port, 8080);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_warn(&dir.path().join(CONFIG_FILE_NAME));
        assert_eq!(config.server.default_port, AppConfig::default().server.default_port);
    }
}
