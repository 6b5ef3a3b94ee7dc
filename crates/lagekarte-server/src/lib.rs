//! Embedded sync server for the Lagekarte sync core.
//!
//! This crate provides the rendezvous point clients connect to when one
//! instance runs in server-host mode:
//!
//! - **`WebSocket` endpoint** (`/` and `/ws`) speaking the JSON sync
//!   protocol: a joining peer receives the full snapshot, mutations from one
//!   peer are applied to the shared snapshot and rebroadcast to every other
//!   peer
//! - **REST endpoints** for the current snapshot and server status
//! - **Minimal HTML status page** (`GET /`) for the read-only viewer
//!
//! # Architecture
//!
//! The shared snapshot and the set of connected peers live together in one
//! [`Hub`](hub::Hub) behind a Tokio mutex. Applying a mutation and fanning it
//! out happen under the same guard, so every peer observes mutations in the
//! order the server applied them. Each peer has an unbounded outbound queue
//! drained by its own socket task; the guard is never held across socket
//! I/O.
//!
//! [`TransportServer`] owns the lifecycle (`start`, `stop`, `status`,
//! `update_state`) and is constructed explicitly by whoever owns the
//! process entry point.

pub mod control;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod network;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ServerError;
pub use hub::{Hub, Outbound, PeerId};
pub use network::{LocalInterface, NetworkAddress};
pub use router::build_router;
pub use server::{ServerConfig, ServerStatus, StartInfo, TransportServer};
pub use state::{AppState, MutationHook};
