//! JSON wire protocol spoken over the sync channel.
//!
//! Every frame is a JSON text message carrying a `type` discriminator:
//!
//! | `type` | Fields | Direction |
//! |--------|--------|-----------|
//! | `sync_data` | `data: {stations, vehicles}` | server to client |
//! | `sync_request` | `timestamp` | client to server |
//! | `station_update` | `station` | either |
//! | `station_delete` | `stationId` | either |
//! | `vehicle_update` | `vehicle` | either |
//! | `vehicle_delete` | `vehicleId` | either |
//! | `vehicle_position` | `vehicleId`, `position`, `deploymentInfo?` | either |
//!
//! Unknown fields (such as the `timestamp` older clients attach to every
//! mutation) are ignored on decode.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::entities::{DeploymentInfo, Position, Station, SyncState, Vehicle};
use crate::ids::{StationId, VehicleId};

/// Message type discriminators this protocol understands.
const KNOWN_TYPES: [&str; 7] = [
    "sync_data",
    "sync_request",
    "station_update",
    "station_delete",
    "vehicle_update",
    "vehicle_delete",
    "vehicle_position",
];

/// Errors raised while decoding an inbound frame.
///
/// Both variants are protocol errors: the single frame is dropped and the
/// connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON or does not match its declared type.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame carries a `type` this protocol does not know.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The frame has no string `type` field.
    #[error("message has no type field")]
    MissingType,
}

/// A single sync protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SyncMessage {
    /// Full snapshot. Receivers replace their local state wholesale.
    SyncData {
        /// The complete snapshot.
        data: SyncState,
    },
    /// Ask the server for a full snapshot.
    SyncRequest {
        /// Sender wall-clock time in unix milliseconds.
        #[serde(default)]
        #[ts(type = "number")]
        timestamp: i64,
    },
    /// Insert or replace a station by id.
    StationUpdate {
        /// The station as last written by the sender.
        station: Station,
    },
    /// Remove a station by id.
    StationDelete {
        /// Id of the station to remove.
        #[serde(rename = "stationId")]
        station_id: StationId,
    },
    /// Insert or replace a vehicle by id.
    VehicleUpdate {
        /// The vehicle as last written by the sender.
        vehicle: Vehicle,
    },
    /// Remove a vehicle by id.
    VehicleDelete {
        /// Id of the vehicle to remove.
        #[serde(rename = "vehicleId")]
        vehicle_id: VehicleId,
    },
    /// Deploy, move, or recall a vehicle.
    VehiclePosition {
        /// Id of the vehicle to move.
        #[serde(rename = "vehicleId")]
        vehicle_id: VehicleId,
        /// New position, or `null` to recall.
        #[serde(default)]
        position: Option<Position>,
        /// Mission details for a deployment.
        #[serde(rename = "deploymentInfo", default, skip_serializing_if = "Option::is_none")]
        deployment_info: Option<DeploymentInfo>,
    },
}

impl SyncMessage {
    /// Build a `sync_request` stamped with the current time.
    pub fn sync_request() -> Self {
        Self::SyncRequest {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Build a `sync_data` message carrying `state`.
    pub const fn sync_data(state: SyncState) -> Self {
        Self::SyncData { data: state }
    }

    /// The wire `type` discriminator of this message.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SyncData { .. } => "sync_data",
            Self::SyncRequest { .. } => "sync_request",
            Self::StationUpdate { .. } => "station_update",
            Self::StationDelete { .. } => "station_delete",
            Self::VehicleUpdate { .. } => "vehicle_update",
            Self::VehicleDelete { .. } => "vehicle_delete",
            Self::VehiclePosition { .. } => "vehicle_position",
        }
    }

    /// Whether this message mutates entity state.
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::SyncRequest { .. } | Self::SyncData { .. })
    }

    /// Encode this message as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON text frame.
    ///
    /// Distinguishes an unknown `type` from a malformed body so callers can
    /// log them differently.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_owned()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_vehicle_position_recall() {
        let raw = r#"{"type":"vehicle_position","vehicleId":"vehicle_1","position":null,"timestamp":1}"#;
        let msg = SyncMessage::decode(raw);
        assert!(matches!(
            msg,
            Ok(SyncMessage::VehiclePosition { ref vehicle_id, position: None, deployment_info: None })
                if vehicle_id.as_str() == "vehicle_1"
        ));
    }

    #[test]
    fn decodes_station_delete_with_camel_case_id() {
        let raw = r#"{"type":"station_delete","stationId":"station_9"}"#;
        let msg = SyncMessage::decode(raw);
        assert!(matches!(
            msg,
            Ok(SyncMessage::StationDelete { ref station_id }) if station_id.as_str() == "station_9"
        ));
    }

    #[test]
    fn null_entity_id_decodes_as_unassigned() {
        let raw = r#"{"type":"station_update","station":{"id":null,"name":"FW Nord","address":"","lat":51.0,"lng":10.0},"timestamp":1}"#;
        let msg = SyncMessage::decode(raw);
        assert!(matches!(
            msg,
            Ok(SyncMessage::StationUpdate { ref station }) if station.id.is_unassigned() && station.name == "FW Nord"
        ));
    }

    #[test]
    fn encodes_type_tag_in_snake_case() {
        let msg = SyncMessage::VehicleDelete {
            vehicle_id: VehicleId::from("vehicle_3"),
        };
        let json = msg.encode().unwrap_or_default();
        assert!(json.contains("\"type\":\"vehicle_delete\""));
        assert!(json.contains("\"vehicleId\":\"vehicle_3\""));
    }

    #[test]
    fn sync_data_defaults_missing_lists() {
        let msg = SyncMessage::decode(r#"{"type":"sync_data","data":{}}"#);
        assert!(matches!(
            msg,
            Ok(SyncMessage::SyncData { ref data }) if data.stations.is_empty() && data.vehicles.is_empty()
        ));
    }

    #[test]
    fn unknown_type_is_reported() {
        let msg = SyncMessage::decode(r#"{"type":"chat","text":"hi"}"#);
        assert!(matches!(msg, Err(ProtocolError::UnknownType(ref t)) if t == "chat"));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let msg = SyncMessage::decode("{not json");
        assert!(matches!(msg, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn missing_type_is_reported() {
        let msg = SyncMessage::decode(r#"{"station":{}}"#);
        assert!(matches!(msg, Err(ProtocolError::MissingType)));
    }

    #[test]
    fn known_type_with_bad_body_is_malformed() {
        let msg = SyncMessage::decode(r#"{"type":"station_update","station":42}"#);
        assert!(matches!(msg, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn mutation_classification() {
        assert!(!SyncMessage::sync_request().is_mutation());
        assert!(!SyncMessage::sync_data(SyncState::default()).is_mutation());
        assert!(
            SyncMessage::StationDelete {
                station_id: StationId::from("s")
            }
            .is_mutation()
        );
    }
}
