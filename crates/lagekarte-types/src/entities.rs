//! Stations, vehicles, and the shared snapshot.
//!
//! Field names follow the camelCase JSON layout the map UI and exported
//! backup files use, so a serialized [`SyncState`] can be fed straight into
//! the viewer or written to disk.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{StationId, VehicleId};

/// A geographic coordinate in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl Position {
    /// Create a position from latitude and longitude.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Mission details attached to a deployed vehicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DeploymentInfo {
    /// Dispatch mission number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_number: Option<String>,
    /// Dispatch keyword (e.g. `B3`, `THL1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_keyword: Option<String>,
    /// Free-form remarks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// A fixed depot vehicles are assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Station {
    /// Stable identifier; empty until the first save assigns one.
    #[serde(default)]
    pub id: StationId,
    /// Display name.
    pub name: String,
    /// Optional street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Latitude of the depot.
    pub lat: f64,
    /// Longitude of the depot.
    pub lng: f64,
}

impl Station {
    /// Create an unsaved station (no id yet) at the given coordinates.
    pub fn new(name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: StationId::default(),
            name: name.into(),
            address: None,
            lat,
            lng,
        }
    }
}

/// A vehicle that can sit at its station or be deployed on the map.
///
/// Invariant: `deployed == position.is_some()`, and `deployment_info` is
/// `None` whenever `position` is `None`. [`Vehicle::relocate`] and
/// [`Vehicle::normalize`] maintain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Vehicle {
    /// Stable identifier; empty until the first save assigns one.
    #[serde(default)]
    pub id: VehicleId,
    /// Radio callsign.
    pub callsign: String,
    /// Vehicle type code (`HLF`, `DLK`, `RTW`, ...). Drives icon lookup.
    #[serde(rename = "type")]
    pub vehicle_type: String,
    /// Crew strength, e.g. `1/8`.
    #[serde(default)]
    pub crew: Option<String>,
    /// Weak reference to the home station. May dangle.
    #[serde(default)]
    pub station_id: Option<StationId>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Whether the vehicle is currently deployed on the map.
    #[serde(default)]
    pub deployed: bool,
    /// Deployment location, present iff deployed.
    #[serde(default)]
    pub position: Option<Position>,
    /// Mission details, cleared on recall.
    #[serde(default)]
    pub deployment_info: Option<DeploymentInfo>,
}

impl Vehicle {
    /// Create an unsaved, undeployed vehicle.
    pub fn new(callsign: impl Into<String>, vehicle_type: impl Into<String>) -> Self {
        Self {
            id: VehicleId::default(),
            callsign: callsign.into(),
            vehicle_type: vehicle_type.into(),
            crew: None,
            station_id: None,
            notes: None,
            deployed: false,
            position: None,
            deployment_info: None,
        }
    }

    /// Move the vehicle to `position`, or recall it with `None`.
    ///
    /// A recall always clears the deployment info, whatever was passed. When
    /// deploying, `deployment_info` replaces the current info only if given.
    pub fn relocate(&mut self, position: Option<Position>, deployment_info: Option<DeploymentInfo>) {
        self.deployed = position.is_some();
        self.position = position;
        if self.position.is_none() {
            self.deployment_info = None;
        } else if let Some(info) = deployment_info {
            self.deployment_info = Some(info);
        }
    }

    /// Re-derive `deployed` from `position` and drop stale deployment info.
    pub fn normalize(&mut self) {
        self.deployed = self.position.is_some();
        if self.position.is_none() {
            self.deployment_info = None;
        }
    }
}

/// The shared snapshot of all stations and vehicles.
///
/// Unique by id within each list; order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncState {
    /// All known stations.
    #[serde(default)]
    pub stations: Vec<Station>,
    /// All known vehicles.
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
}

impl SyncState {
    /// Create a snapshot from station and vehicle lists.
    pub const fn new(stations: Vec<Station>, vehicles: Vec<Vehicle>) -> Self {
        Self { stations, vehicles }
    }

    /// Find a station by id.
    pub fn station(&self, id: &StationId) -> Option<&Station> {
        self.stations.iter().find(|s| &s.id == id)
    }

    /// Find a vehicle by id.
    pub fn vehicle(&self, id: &VehicleId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| &v.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployed_vehicle() -> Vehicle {
        let mut v = Vehicle::new("Florian 1/44", "HLF");
        v.relocate(
            Some(Position::new(51.1, 10.4)),
            Some(DeploymentInfo {
                mission_number: Some(String::from("2024-117")),
                mission_keyword: Some(String::from("B3")),
                remarks: None,
            }),
        );
        v
    }

    #[test]
    fn relocate_sets_deployed_flag() {
        let v = deployed_vehicle();
        assert!(v.deployed);
        assert!(v.deployment_info.is_some());
    }

    #[test]
    fn recall_clears_deployment_info_even_if_passed() {
        let mut v = deployed_vehicle();
        v.relocate(None, Some(DeploymentInfo::default()));
        assert!(!v.deployed);
        assert!(v.position.is_none());
        assert!(v.deployment_info.is_none());
    }

    #[test]
    fn relocate_without_info_keeps_existing_info() {
        let mut v = deployed_vehicle();
        v.relocate(Some(Position::new(52.0, 11.0)), None);
        assert_eq!(
            v.deployment_info
                .as_ref()
                .and_then(|i| i.mission_keyword.as_deref()),
            Some("B3")
        );
    }

    #[test]
    fn normalize_repairs_inconsistent_flag() {
        let mut v = Vehicle::new("RTW 1", "RTW");
        v.deployed = true;
        v.deployment_info = Some(DeploymentInfo::default());
        v.normalize();
        assert!(!v.deployed);
        assert!(v.deployment_info.is_none());
    }

    #[test]
    fn vehicle_json_uses_ui_field_names() {
        let mut v = Vehicle::new("ELW 1", "ELW");
        v.station_id = Some(StationId::from("station_1"));
        let json = serde_json::to_value(&v).unwrap_or_default();
        assert_eq!(json["type"], "ELW");
        assert_eq!(json["stationId"], "station_1");
        assert!(json["deploymentInfo"].is_null());
    }

    #[test]
    fn vehicle_parses_from_ui_payload() {
        let raw = r#"{
            "id": "vehicle_test_1",
            "callsign": "Test Vehicle 1",
            "type": "HLF",
            "crew": "1/8",
            "stationId": null,
            "notes": "Vehicle number 1",
            "deployed": false,
            "position": null,
            "deploymentInfo": null
        }"#;
        let v: Result<Vehicle, _> = serde_json::from_str(raw);
        assert!(v.is_ok());
        let v = v.unwrap_or_else(|_| Vehicle::new("", ""));
        assert_eq!(v.id.as_str(), "vehicle_test_1");
        assert_eq!(v.crew.as_deref(), Some("1/8"));
    }

    #[test]
    fn station_without_id_parses_as_unassigned() {
        let raw = r#"{"name": "FW Nord", "lat": 51.0, "lng": 10.0}"#;
        let s: Result<Station, _> = serde_json::from_str(raw);
        assert!(s.is_ok_and(|s| s.id.is_unassigned()));
    }
}
