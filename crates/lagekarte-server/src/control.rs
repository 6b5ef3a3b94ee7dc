//! Control surface for the UI layer.
//!
//! These wrappers never return errors: every outcome is folded into a
//! serializable [`ControlResponse`] the UI can display as-is.

use lagekarte_types::{Station, SyncState, Vehicle};
use serde::Serialize;
use tracing::error;

use crate::network::NetworkAddress;
use crate::server::{ServerStatus, TransportServer};

/// Outcome of a control call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    /// Whether the call achieved its goal.
    pub success: bool,
    /// Human-readable outcome, or the underlying error message.
    pub message: String,
    /// The bound port, for `start`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// `WebSocket` URL, for `start`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// HTTP URL, for `start`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_url: Option<String>,
}

impl ControlResponse {
    /// A successful outcome without connection details.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            port: None,
            ws_url: None,
            http_url: None,
        }
    }

    /// A failed outcome.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(message)
        }
    }
}

/// Start the server on `port`.
pub async fn start(server: &TransportServer, port: u16) -> ControlResponse {
    match server.start(port).await {
        Ok(info) => {
            let message = if info.already_running {
                String::from("Server is already running")
            } else {
                format!("Server started on port {}", info.port)
            };
            ControlResponse {
                port: Some(info.port),
                ws_url: Some(info.ws_url),
                http_url: Some(info.http_url),
                ..ControlResponse::ok(message)
            }
        }
        Err(e) => {
            error!(port, error = %e, "Failed to start sync server");
            ControlResponse::failed(e.to_string())
        }
    }
}

/// Stop the server.
pub async fn stop(server: &TransportServer) -> ControlResponse {
    if server.stop().await {
        ControlResponse::ok("Server stopped successfully")
    } else {
        ControlResponse::ok("Server is not running")
    }
}

/// Current server status.
pub async fn status(server: &TransportServer) -> ServerStatus {
    server.status().await
}

/// Connection URLs per non-loopback interface.
pub fn network_info(server: &TransportServer) -> Vec<NetworkAddress> {
    server.network_info()
}

/// Replace the server snapshot and push it to every peer.
pub async fn update_state(
    server: &TransportServer,
    stations: Vec<Station>,
    vehicles: Vec<Vehicle>,
) -> ControlResponse {
    server.update_state(SyncState::new(stations, vehicles)).await;
    ControlResponse::ok("State updated")
}
