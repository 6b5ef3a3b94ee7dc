//! Error types for the `lagekarte-store` crate.

/// Errors that can occur while loading, persisting, or importing entities.
///
/// Persistence failures during normal mutations never surface as this
/// error: they are logged and the in-memory change is kept.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the durable store failed.
    #[error("storage I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The stored or imported data is not valid JSON for the data model.
    #[error("serialization error: {source}")]
    Serialization {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
