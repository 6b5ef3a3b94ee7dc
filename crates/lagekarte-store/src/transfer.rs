//! Backup import and export.
//!
//! A backup is the full snapshot plus the time it was taken, in the same
//! JSON layout the map UI writes to `fw-lagekarte-backup-<date>.json`.

use chrono::{DateTime, Utc};
use lagekarte_types::{Station, SyncState, Vehicle};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A timestamped backup of all stations and vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    /// All stations.
    pub stations: Vec<Station>,
    /// All vehicles.
    pub vehicles: Vec<Vehicle>,
    /// When the backup was taken. Older backups may lack it.
    #[serde(default)]
    pub export_date: Option<DateTime<Utc>>,
}

impl ExportBundle {
    /// Wrap a snapshot, stamping it with the current time.
    pub fn from_state(state: SyncState) -> Self {
        Self {
            stations: state.stations,
            vehicles: state.vehicles,
            export_date: Some(Utc::now()),
        }
    }

    /// Unwrap into a plain snapshot.
    pub fn into_state(self) -> SyncState {
        SyncState::new(self.stations, self.vehicles)
    }

    /// Parse a backup file.
    ///
    /// Both `stations` and `vehicles` must be present arrays; any other
    /// fields (such as a saved map view) are ignored.
    pub fn parse(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
