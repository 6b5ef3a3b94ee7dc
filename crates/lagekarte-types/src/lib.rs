//! Shared type definitions for the Lagekarte sync core.
//!
//! This crate is the single source of truth for the data exchanged between
//! the entity store, the embedded sync server, and connected clients. Types
//! flow downstream to `TypeScript` via `ts-rs` for the map UI.
//!
//! # Modules
//!
//! - [`ids`] -- String-backed identifiers for stations, vehicles, and clients
//! - [`entities`] -- Stations, vehicles, positions, and the shared snapshot
//! - [`protocol`] -- The JSON wire protocol spoken over the sync channel

pub mod entities;
pub mod ids;
pub mod protocol;

// Re-export all public types at crate root for convenience.
pub use entities::{DeploymentInfo, Position, Station, SyncState, Vehicle};
pub use ids::{ClientId, StationId, VehicleId};
pub use protocol::{ProtocolError, SyncMessage};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the map UI.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::StationId::export_all();
        let _ = crate::ids::VehicleId::export_all();
        let _ = crate::ids::ClientId::export_all();

        let _ = crate::entities::Position::export_all();
        let _ = crate::entities::DeploymentInfo::export_all();
        let _ = crate::entities::Station::export_all();
        let _ = crate::entities::Vehicle::export_all();
        let _ = crate::entities::SyncState::export_all();

        let _ = crate::protocol::SyncMessage::export_all();
    }
}
