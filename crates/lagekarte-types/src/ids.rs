//! Type-safe identifier wrappers around [`String`].
//!
//! Stations, vehicles, and client instances each get a strongly-typed ID so
//! identifiers cannot be mixed at compile time. IDs are plain strings on the
//! wire because the map UI and previously exported data files use the
//! `<kind>_<unix-millis>_<suffix>` format, e.g. `vehicle_1718000000000_k3j9x0a2b`.
//!
//! An empty ID means "not yet assigned": the entity store assigns one on
//! first save. A `null` ID on the wire decodes as unassigned too.

use std::fmt::Write as _;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Length of the random base36 suffix appended to generated IDs.
const ID_SUFFIX_LEN: usize = 9;

/// Alphabet used for the random suffix.
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Build a fresh identifier string with the given kind prefix.
fn generate_raw(prefix: &str) -> String {
    let mut rng = rand::rng();
    let mut id = String::with_capacity(
        prefix
            .len()
            .saturating_add(ID_SUFFIX_LEN)
            .saturating_add(16),
    );
    let _ = write!(id, "{prefix}_{}_", Utc::now().timestamp_millis());
    for _ in 0..ID_SUFFIX_LEN {
        let idx = rng.random_range(0..ID_ALPHABET.len());
        id.push(char::from(ID_ALPHABET.get(idx).copied().unwrap_or(b'0')));
    }
    id
}

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident => $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new identifier of this kind.
            pub fn generate() -> Self {
                Self(generate_raw($prefix))
            }

            /// Whether this identifier is still unassigned (empty).
            pub fn is_unassigned(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Option::<String>::deserialize(deserializer).map(|id| Self(id.unwrap_or_default()))
            }
        }
    };
}

define_id! {
    /// Unique identifier for a station (fixed depot).
    StationId => "station"
}

define_id! {
    /// Unique identifier for a vehicle.
    VehicleId => "vehicle"
}

define_id! {
    /// Stable per-installation identifier, generated once and persisted.
    ClientId => "client"
}
