//! Vehicle grouping by home station.
//!
//! A vehicle whose `stationId` is unset, empty, or points at a station that
//! no longer exists lands in the unassigned bucket instead of failing.

use lagekarte_types::{Station, SyncState, Vehicle};

/// One station and the vehicles assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StationGroup {
    /// The station.
    pub station: Station,
    /// Vehicles whose `stationId` references this station.
    pub vehicles: Vec<Vehicle>,
}

/// Vehicles grouped under their stations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    /// One group per station, in station order. Stations without vehicles
    /// are included with an empty list.
    pub groups: Vec<StationGroup>,
    /// Vehicles without a resolvable station.
    pub unassigned: Vec<Vehicle>,
}

impl Roster {
    /// Group the vehicles of `state` by station.
    pub fn build(state: &SyncState) -> Self {
        let mut groups: Vec<StationGroup> = state
            .stations
            .iter()
            .map(|station| StationGroup {
                station: station.clone(),
                vehicles: Vec::new(),
            })
            .collect();
        let mut unassigned = Vec::new();

        for vehicle in &state.vehicles {
            let slot = vehicle
                .station_id
                .as_ref()
                .filter(|id| !id.is_unassigned())
                .and_then(|id| groups.iter().position(|g| &g.station.id == id));
            match slot.and_then(|idx| groups.get_mut(idx)) {
                Some(group) => group.vehicles.push(vehicle.clone()),
                None => unassigned.push(vehicle.clone()),
            }
        }

        Self { groups, unassigned }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagekarte_types::StationId;

    fn vehicle_at(callsign: &str, station: Option<&str>) -> Vehicle {
        let mut v = Vehicle::new(callsign, "HLF");
        v.station_id = station.map(StationId::from);
        v
    }

    #[test]
    fn groups_by_station_and_buckets_the_rest() {
        let mut nord = Station::new("Nord", 1.0, 1.0);
        nord.id = StationId::from("s_nord");
        let mut sued = Station::new("Süd", 2.0, 2.0);
        sued.id = StationId::from("s_sued");

        let state = SyncState::new(
            vec![nord, sued],
            vec![
                vehicle_at("A", Some("s_nord")),
                vehicle_at("B", Some("s_gone")),
                vehicle_at("C", None),
                vehicle_at("D", Some("")),
                vehicle_at("E", Some("s_nord")),
            ],
        );

        let roster = Roster::build(&state);
        assert_eq!(roster.groups.len(), 2);
        let nord_callsigns: Vec<&str> = roster
            .groups
            .first()
            .map(|g| g.vehicles.iter().map(|v| v.callsign.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(nord_callsigns, vec!["A", "E"]);
        assert!(roster.groups.get(1).is_some_and(|g| g.vehicles.is_empty()));
        assert_eq!(roster.unassigned.len(), 3);
    }
}
