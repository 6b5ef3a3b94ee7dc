//! Error types for the sync controller and its configuration.

use lagekarte_server::ServerError;

/// Errors that can occur when loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write a configuration file.
    #[error("failed to access config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// Failed to parse or write a JSON settings file.
    #[error("failed to process settings JSON: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// An override carried a value that does not fit its field.
    #[error("invalid value {value:?} for {key}: {message}")]
    InvalidValue {
        /// The offending key (environment variable name).
        key: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Errors surfaced by the sync controller.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The embedded server could not be started.
    #[error("sync server error: {0}")]
    Server(#[from] ServerError),

    /// Sync settings could not be persisted.
    #[error("sync config error: {0}")]
    Config(#[from] ConfigError),

    /// Client mode was selected without a server URL.
    #[error("no server URL configured for client mode")]
    MissingServerUrl,
}
