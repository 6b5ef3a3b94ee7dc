//! Durable storage collaborators for the [`EntityStore`](crate::EntityStore).
//!
//! The store writes the full snapshot after every mutation. Writes are
//! small (a few hundred entities at most) so the whole state is rewritten
//! rather than patched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lagekarte_types::SyncState;

use crate::error::StoreError;

/// File name of the persisted snapshot inside the data directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Durable storage for the entity snapshot.
pub trait Persistence: Send + Sync {
    /// Load the last persisted snapshot. A store that has never been
    /// written returns an empty snapshot.
    fn load(&self) -> Result<SyncState, StoreError>;

    /// Persist the given snapshot, replacing whatever was stored before.
    fn save(&self, state: &SyncState) -> Result<(), StoreError>;
}

/// Stores the snapshot as pretty-printed JSON in a data directory.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// target, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    /// Persist into `<data_dir>/state.json`, creating the directory if needed.
    pub fn new(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(STATE_FILE_NAME),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFilePersistence {
    fn load(&self) -> Result<SyncState, StoreError> {
        if !self.path.exists() {
            return Ok(SyncState::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(SyncState::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, state: &SyncState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Keeps the last saved snapshot in memory. Used for ephemeral sessions
/// and tests.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Mutex<Option<SyncState>>,
}

impl MemoryPersistence {
    /// Create an empty in-memory persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory persistence pre-seeded with a snapshot.
    pub fn with_state(state: SyncState) -> Self {
        Self {
            saved: Mutex::new(Some(state)),
        }
    }

    /// The last saved snapshot, if any.
    pub fn saved(&self) -> Option<SyncState> {
        self.saved.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<SyncState, StoreError> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, state: &SyncState) -> Result<(), StoreError> {
        if let Ok(mut guard) = self.saved.lock() {
            *guard = Some(state.clone());
        }
        Ok(())
    }
}
