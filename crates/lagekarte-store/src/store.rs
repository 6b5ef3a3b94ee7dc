//! The persisted in-memory entity store.
//!
//! [`EntityStore`] holds the local copy of all stations and vehicles. Every
//! mutation runs synchronously against the in-memory snapshot and is then
//! written through the [`Persistence`] collaborator. A failed write is
//! logged and counted but never rolls back the in-memory change: within a
//! session, availability wins over durability.

use lagekarte_types::{
    DeploymentInfo, Position, Station, StationId, SyncMessage, SyncState, Vehicle, VehicleId,
};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::merge::{self, StoreChange};
use crate::persistence::{MemoryPersistence, Persistence};
use crate::roster::Roster;
use crate::transfer::ExportBundle;

/// In-memory station and vehicle collections backed by durable storage.
pub struct EntityStore {
    state: SyncState,
    persistence: Box<dyn Persistence>,
    persist_failures: u64,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("stations", &self.state.stations.len())
            .field("vehicles", &self.state.vehicles.len())
            .field("persist_failures", &self.persist_failures)
            .finish_non_exhaustive()
    }
}

impl EntityStore {
    /// Open a store, loading the last persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the persisted snapshot cannot be read.
    pub fn open(persistence: impl Persistence + 'static) -> Result<Self, StoreError> {
        let mut state = persistence.load()?;
        for vehicle in &mut state.vehicles {
            vehicle.normalize();
        }
        debug!(
            stations = state.stations.len(),
            vehicles = state.vehicles.len(),
            "Entity store loaded"
        );
        Ok(Self {
            state,
            persistence: Box::new(persistence),
            persist_failures: 0,
        })
    }

    /// Create an empty store that only persists to memory.
    pub fn in_memory() -> Self {
        Self {
            state: SyncState::default(),
            persistence: Box::new(MemoryPersistence::new()),
            persist_failures: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All stations in insertion order.
    pub fn stations(&self) -> &[Station] {
        &self.state.stations
    }

    /// All vehicles in insertion order.
    pub fn vehicles(&self) -> &[Vehicle] {
        &self.state.vehicles
    }

    /// Look up a station by id.
    pub fn station(&self, id: &StationId) -> Option<&Station> {
        self.state.station(id)
    }

    /// Look up a vehicle by id.
    pub fn vehicle(&self, id: &VehicleId) -> Option<&Vehicle> {
        self.state.vehicle(id)
    }

    /// A detached copy of the whole snapshot.
    pub fn snapshot(&self) -> SyncState {
        self.state.clone()
    }

    /// Vehicles currently deployed on the map.
    pub fn deployed_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.state.vehicles.iter().filter(|v| v.deployed)
    }

    /// Vehicles currently available at their station.
    pub fn available_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.state.vehicles.iter().filter(|v| !v.deployed)
    }

    /// Vehicles grouped by station, with dangling references unassigned.
    pub fn roster(&self) -> Roster {
        Roster::build(&self.state)
    }

    /// Number of persistence writes that failed since the store was opened.
    pub const fn persist_failures(&self) -> u64 {
        self.persist_failures
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert or replace a station. Assigns an id on first save.
    pub fn upsert_station(&mut self, station: Station) -> Station {
        let saved = merge::upsert_station(&mut self.state, station);
        self.persist();
        saved
    }

    /// Remove a station. Vehicles referencing it are left untouched.
    pub fn delete_station(&mut self, id: &StationId) -> bool {
        let removed = merge::delete_station(&mut self.state, id);
        self.persist();
        removed
    }

    /// Insert or replace a vehicle. Assigns an id on first save.
    pub fn upsert_vehicle(&mut self, vehicle: Vehicle) -> Vehicle {
        let saved = merge::upsert_vehicle(&mut self.state, vehicle);
        self.persist();
        saved
    }

    /// Remove a vehicle.
    pub fn delete_vehicle(&mut self, id: &VehicleId) -> bool {
        let removed = merge::delete_vehicle(&mut self.state, id);
        self.persist();
        removed
    }

    /// Deploy, move, or recall a vehicle.
    ///
    /// Returns `None` (and writes nothing) if the vehicle does not exist.
    pub fn set_vehicle_position(
        &mut self,
        id: &VehicleId,
        position: Option<Position>,
        deployment_info: Option<DeploymentInfo>,
    ) -> Option<Vehicle> {
        let moved = merge::set_vehicle_position(&mut self.state, id, position, deployment_info)?;
        self.persist();
        Some(moved)
    }

    /// Replace every station and vehicle.
    pub fn replace_all(&mut self, state: SyncState) {
        merge::replace_all(&mut self.state, state);
        self.persist();
    }

    /// Apply a wire message received from a peer.
    ///
    /// Returns the change it caused, if any. Messages without an effect are
    /// not persisted.
    pub fn apply(&mut self, message: SyncMessage) -> Option<StoreChange> {
        let change = merge::apply_message(&mut self.state, message)?;
        self.persist();
        Some(change)
    }

    // -----------------------------------------------------------------------
    // Import / export
    // -----------------------------------------------------------------------

    /// Produce a timestamped backup of all entities.
    pub fn export(&self) -> ExportBundle {
        ExportBundle::from_state(self.snapshot())
    }

    /// Replace all entities with the contents of a backup.
    pub fn import(&mut self, bundle: ExportBundle) {
        self.replace_all(bundle.into_state());
    }

    fn persist(&mut self) {
        if let Err(e) = self.persistence.save(&self.state) {
            self.persist_failures = self.persist_failures.saturating_add(1);
            warn!(
                error = %e,
                failures = self.persist_failures,
                "Failed to persist entity store, keeping in-memory change"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    struct FailingPersistence;

    impl Persistence for FailingPersistence {
        fn load(&self) -> Result<SyncState, StoreError> {
            Ok(SyncState::default())
        }

        fn save(&self, _state: &SyncState) -> Result<(), StoreError> {
            Err(StoreError::Io {
                source: std::io::Error::other("disk full"),
            })
        }
    }

    /// Shares a [`MemoryPersistence`] with the test so saves can be inspected.
    struct Shared(Arc<MemoryPersistence>);

    impl Persistence for Shared {
        fn load(&self) -> Result<SyncState, StoreError> {
            self.0.load()
        }

        fn save(&self, state: &SyncState) -> Result<(), StoreError> {
            self.0.save(state)
        }
    }

    #[test]
    fn mutations_are_persisted() {
        let backing = Arc::new(MemoryPersistence::new());
        let mut store = EntityStore::open(Shared(Arc::clone(&backing))).unwrap();
        let station = store.upsert_station(Station::new("FW Nord", 51.2, 10.1));
        let saved = backing.saved().unwrap();
        assert_eq!(saved.stations.len(), 1);
        assert_eq!(saved.stations.first().map(|s| &s.id), Some(&station.id));
    }

    #[test]
    fn persist_failure_keeps_in_memory_change() {
        let mut store = EntityStore::open(FailingPersistence).unwrap();
        store.upsert_vehicle(Vehicle::new("HLF 1", "HLF"));
        assert_eq!(store.vehicles().len(), 1);
        assert_eq!(store.persist_failures(), 1);
    }

    #[test]
    fn open_loads_existing_snapshot() {
        let seeded = SyncState::new(vec![Station::new("A", 1.0, 1.0)], Vec::new());
        let store = EntityStore::open(MemoryPersistence::with_state(seeded)).unwrap();
        assert_eq!(store.stations().len(), 1);
    }

    #[test]
    fn recall_resets_deployment() {
        let mut store = EntityStore::in_memory();
        let vehicle = store.upsert_vehicle(Vehicle::new("DLK 23", "DLK"));
        store.set_vehicle_position(
            &vehicle.id,
            Some(Position::new(51.0, 10.0)),
            Some(DeploymentInfo {
                remarks: Some(String::from("Zufahrt Nord")),
                ..DeploymentInfo::default()
            }),
        );
        assert_eq!(store.deployed_vehicles().count(), 1);

        let recalled = store.set_vehicle_position(&vehicle.id, None, None).unwrap();
        assert!(!recalled.deployed);
        assert!(recalled.deployment_info.is_none());
        assert_eq!(store.available_vehicles().count(), 1);
    }

    #[test]
    fn move_of_unknown_vehicle_writes_nothing() {
        let backing = Arc::new(MemoryPersistence::new());
        let mut store = EntityStore::open(Shared(Arc::clone(&backing))).unwrap();
        let moved = store.set_vehicle_position(&VehicleId::from("ghost"), None, None);
        assert!(moved.is_none());
        assert!(backing.saved().is_none());
    }

    #[test]
    fn deleting_station_leaves_vehicle_reference_dangling() {
        let mut store = EntityStore::in_memory();
        let station = store.upsert_station(Station::new("FW West", 50.0, 9.0));
        let mut vehicle = Vehicle::new("LF 10", "LF");
        vehicle.station_id = Some(station.id.clone());
        let vehicle = store.upsert_vehicle(vehicle);

        assert!(store.delete_station(&station.id));
        let kept = store.vehicle(&vehicle.id).unwrap();
        assert_eq!(kept.station_id.as_ref(), Some(&station.id));
        assert_eq!(store.roster().unassigned.len(), 1);
    }

    #[test]
    fn import_replaces_everything() {
        let mut store = EntityStore::in_memory();
        store.upsert_station(Station::new("Old", 1.0, 1.0));
        let bundle =
            ExportBundle::from_state(SyncState::new(Vec::new(), vec![Vehicle::new("X", "MTW")]));
        store.import(bundle);
        assert!(store.stations().is_empty());
        assert_eq!(store.vehicles().len(), 1);
    }
}
