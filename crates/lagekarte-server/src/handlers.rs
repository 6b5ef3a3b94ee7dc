//! REST endpoint handlers for the sync server.
//!
//! All handlers read from the shared [`Hub`](crate::hub::Hub) via
//! [`AppState`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page (or `WebSocket` upgrade) |
//! | `GET` | `/api/state` | Current snapshot of stations and vehicles |
//! | `GET` | `/api/status` | Running state, port, peer count, URLs |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{Html, IntoResponse};

use crate::server::ServerStatus;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing server status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (station_count, vehicle_count, deployed_count, peer_count) = {
        let hub = state.hub.lock().await;
        let snapshot = hub.state();
        (
            snapshot.stations.len(),
            snapshot.vehicles.len(),
            snapshot.vehicles.iter().filter(|v| v.deployed).count(),
            hub.peer_count(),
        )
    };
    let port = state
        .port()
        .map_or_else(|| String::from("-"), |p| p.to_string());

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="de">
<head>
    <meta charset="utf-8">
    <title>Lagekarte Sync-Server</title>
    <style>
        body {{
            background: #1b1f23;
            color: #e1e4e8;
            font-family: system-ui, sans-serif;
            padding: 2rem;
            max-width: 760px;
            margin: 0 auto;
        }}
        h1 {{ color: #f85149; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #24292e;
            border: 1px solid #444d56;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 110px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #f0f6fc; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.25rem 0; }}
        code {{ color: #ffa657; }}
    </style>
</head>
<body>
    <h1>Lagekarte</h1>
    <p class="subtitle">Sync-Server auf Port {port}</p>

    <div>
        <div class="metric"><div class="label">Clients</div><div class="value">{peer_count}</div></div>
        <div class="metric"><div class="label">Wachen</div><div class="value">{station_count}</div></div>
        <div class="metric"><div class="label">Fahrzeuge</div><div class="value">{vehicle_count}</div></div>
        <div class="metric"><div class="label">Im Einsatz</div><div class="value">{deployed_count}</div></div>
    </div>

    <h2>API</h2>
    <ul>
        <li><a href="/api/state">/api/state</a> -- aktueller Lagestand</li>
        <li><a href="/api/status">/api/status</a> -- Serverstatus</li>
        <li><code>ws://&lt;host&gt;:{port}/</code> -- Sync-Kanal</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/state
// ---------------------------------------------------------------------------

/// Return the current snapshot of stations and vehicles.
pub async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.snapshot().await)
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the server status object.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ServerStatus::collect(&state).await)
}
