//! Entity store for the Lagekarte sync core.
//!
//! Owns the canonical collections of stations and vehicles and defines the
//! mutation semantics every other component reuses:
//!
//! - **Upsert** assigns an id if missing, replaces the first entry with the
//!   same id, or appends.
//! - **Delete** filters out the matching id; deleting an absent id is a no-op.
//! - **Position update** derives `deployed` from the position and clears
//!   deployment info on recall.
//!
//! The embedded sync server applies peer messages to its own snapshot with
//! exactly these rules via [`merge`], and the client-side [`EntityStore`]
//! wraps them with durable persistence.
//!
//! # Modules
//!
//! - [`merge`] -- Pure mutation semantics over a [`SyncState`](lagekarte_types::SyncState)
//! - [`store`] -- [`EntityStore`], the persisted in-memory store
//! - [`persistence`] -- Durable storage collaborators
//! - [`roster`] -- Vehicle grouping by station, with an unassigned bucket
//! - [`transfer`] -- Backup import and export

pub mod error;
pub mod merge;
pub mod persistence;
pub mod roster;
pub mod store;
pub mod transfer;

pub use error::StoreError;
pub use merge::StoreChange;
pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence};
pub use roster::Roster;
pub use store::EntityStore;
pub use transfer::ExportBundle;
