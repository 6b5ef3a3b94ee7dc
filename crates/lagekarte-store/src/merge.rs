//! Mutation semantics over a [`SyncState`].
//!
//! These functions are the single definition of how stations and vehicles
//! are inserted, replaced, removed, and moved. They perform no I/O and are
//! shared by the client-side [`EntityStore`](crate::EntityStore) and the
//! embedded sync server's snapshot, so both sides of the wire merge
//! identically (last writer wins per id).

use lagekarte_types::{
    DeploymentInfo, Position, Station, StationId, SyncMessage, SyncState, Vehicle, VehicleId,
};

/// A change applied to entity state, as seen by notification listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    /// A station was inserted or replaced.
    StationUpdated(Station),
    /// A station was removed.
    StationDeleted(StationId),
    /// A vehicle was inserted or replaced.
    VehicleUpdated(Vehicle),
    /// A vehicle was removed.
    VehicleDeleted(VehicleId),
    /// A vehicle was deployed, moved, or recalled.
    VehicleMoved(Vehicle),
    /// The whole snapshot was replaced.
    FullSync(SyncState),
}

impl StoreChange {
    /// Event type name delivered to listeners.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::StationUpdated(_) => "station_update",
            Self::StationDeleted(_) => "station_delete",
            Self::VehicleUpdated(_) => "vehicle_update",
            Self::VehicleDeleted(_) => "vehicle_delete",
            Self::VehicleMoved(_) => "vehicle_position",
            Self::FullSync(_) => "full_sync",
        }
    }

    /// The wire message that propagates this change to other peers.
    ///
    /// A move is sent as a full `vehicle_update` so the deployment info
    /// travels with it. Full syncs are never sent by clients.
    pub fn to_message(&self) -> Option<SyncMessage> {
        match self {
            Self::StationUpdated(station) => Some(SyncMessage::StationUpdate {
                station: station.clone(),
            }),
            Self::StationDeleted(id) => Some(SyncMessage::StationDelete {
                station_id: id.clone(),
            }),
            Self::VehicleUpdated(vehicle) | Self::VehicleMoved(vehicle) => {
                Some(SyncMessage::VehicleUpdate {
                    vehicle: vehicle.clone(),
                })
            }
            Self::VehicleDeleted(id) => Some(SyncMessage::VehicleDelete {
                vehicle_id: id.clone(),
            }),
            Self::FullSync(_) => None,
        }
    }
}

/// Insert or replace a station, assigning an id if it has none.
///
/// Replaces the first entry with a matching id; appends otherwise. Returns
/// the station as stored.
pub fn upsert_station(state: &mut SyncState, mut station: Station) -> Station {
    if station.id.is_unassigned() {
        station.id = StationId::generate();
    }
    match state.stations.iter_mut().find(|s| s.id == station.id) {
        Some(slot) => slot.clone_from(&station),
        None => state.stations.push(station.clone()),
    }
    station
}

/// Remove every station with the given id. Returns whether one was removed.
pub fn delete_station(state: &mut SyncState, id: &StationId) -> bool {
    let before = state.stations.len();
    state.stations.retain(|s| &s.id != id);
    state.stations.len() != before
}

/// Insert or replace a vehicle, assigning an id if it has none.
///
/// The stored copy is normalized so `deployed` matches `position`.
pub fn upsert_vehicle(state: &mut SyncState, mut vehicle: Vehicle) -> Vehicle {
    if vehicle.id.is_unassigned() {
        vehicle.id = VehicleId::generate();
    }
    vehicle.normalize();
    match state.vehicles.iter_mut().find(|v| v.id == vehicle.id) {
        Some(slot) => slot.clone_from(&vehicle),
        None => state.vehicles.push(vehicle.clone()),
    }
    vehicle
}

/// Remove every vehicle with the given id. Returns whether one was removed.
pub fn delete_vehicle(state: &mut SyncState, id: &VehicleId) -> bool {
    let before = state.vehicles.len();
    state.vehicles.retain(|v| &v.id != id);
    state.vehicles.len() != before
}

/// Deploy, move, or recall a vehicle.
///
/// Returns the updated vehicle, or `None` if no vehicle has that id.
pub fn set_vehicle_position(
    state: &mut SyncState,
    id: &VehicleId,
    position: Option<Position>,
    deployment_info: Option<DeploymentInfo>,
) -> Option<Vehicle> {
    let vehicle = state.vehicles.iter_mut().find(|v| &v.id == id)?;
    vehicle.relocate(position, deployment_info);
    Some(vehicle.clone())
}

/// Replace the snapshot wholesale, normalizing every vehicle.
pub fn replace_all(state: &mut SyncState, mut incoming: SyncState) {
    for vehicle in &mut incoming.vehicles {
        vehicle.normalize();
    }
    *state = incoming;
}

/// Apply a wire message to `state`.
///
/// Returns the resulting change, or `None` when the message has no effect
/// (a `sync_request`, a delete of an absent id, or a position update for an
/// unknown vehicle).
pub fn apply_message(state: &mut SyncState, message: SyncMessage) -> Option<StoreChange> {
    match message {
        SyncMessage::SyncRequest { .. } => None,
        SyncMessage::SyncData { data } => {
            replace_all(state, data);
            Some(StoreChange::FullSync(state.clone()))
        }
        SyncMessage::StationUpdate { station } => {
            Some(StoreChange::StationUpdated(upsert_station(state, station)))
        }
        SyncMessage::StationDelete { station_id } => {
            delete_station(state, &station_id).then_some(StoreChange::StationDeleted(station_id))
        }
        SyncMessage::VehicleUpdate { vehicle } => {
            Some(StoreChange::VehicleUpdated(upsert_vehicle(state, vehicle)))
        }
        SyncMessage::VehicleDelete { vehicle_id } => {
            delete_vehicle(state, &vehicle_id).then_some(StoreChange::VehicleDeleted(vehicle_id))
        }
        SyncMessage::VehiclePosition {
            vehicle_id,
            position,
            deployment_info,
        } => set_vehicle_position(state, &vehicle_id, position, deployment_info)
            .map(StoreChange::VehicleMoved),
    }
}
