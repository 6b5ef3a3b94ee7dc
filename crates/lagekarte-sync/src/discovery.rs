//! Best-effort LAN discovery of sync servers.
//!
//! For every non-loopback IPv4 interface the scan derives the hosts of its
//! subnet (clamped to the surrounding `/24`) and probes each host on a
//! fixed set of ports with a short `WebSocket` connect. URLs that accept a
//! connection within the timeout are reported. This is inherently racy and
//! approximate; it only finds servers that are up and reachable right now.

use std::net::Ipv4Addr;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use lagekarte_server::LocalInterface;
use lagekarte_server::network;
use tracing::{debug, info};

/// Parameters of a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Ports probed on every host.
    pub ports: Vec<u16>,
    /// Per-probe connect timeout.
    pub probe_timeout: Duration,
    /// Upper bound on probes in flight.
    pub max_concurrent: usize,
    /// Upper bound on hosts scanned per interface.
    pub max_hosts_per_interface: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            ports: vec![8080, 8081, 8082, 3000],
            probe_timeout: Duration::from_millis(500),
            max_concurrent: 64,
            max_hosts_per_interface: 254,
        }
    }
}

/// Progress report passed to the scan callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryProgress {
    /// Human-readable status line.
    pub message: String,
    /// Probes finished so far.
    pub probed: usize,
    /// Total probes in this scan.
    pub total: usize,
    /// Whether the scan has finished.
    pub done: bool,
    /// URLs found so far.
    pub servers: Vec<String>,
}

/// Hosts to probe for one interface, excluding the interface's own address.
///
/// Subnets wider than `/24` are clamped to the `/24` around the address.
pub fn subnet_hosts(iface: &LocalInterface, max_hosts: usize) -> Vec<Ipv4Addr> {
    let addr = u32::from(iface.addr);
    let clamp = u32::from(Ipv4Addr::new(255, 255, 255, 0));
    let mask = u32::from(iface.netmask) | clamp;
    let network = addr & mask;
    let broadcast = network | !mask;

    (network.saturating_add(1)..broadcast)
        .filter(|host| *host != addr)
        .map(Ipv4Addr::from)
        .take(max_hosts)
        .collect()
}

/// Every `ws://host:port` URL the scan would probe for `interfaces`.
pub fn candidate_urls(interfaces: &[LocalInterface], options: &DiscoveryOptions) -> Vec<String> {
    let mut urls = Vec::new();
    for iface in interfaces {
        for host in subnet_hosts(iface, options.max_hosts_per_interface) {
            for port in &options.ports {
                let url = format!("ws://{host}:{port}");
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
    }
    urls
}

/// Scan the local subnets for sync servers.
pub async fn discover(
    options: &DiscoveryOptions,
    progress: impl FnMut(&DiscoveryProgress),
) -> Vec<String> {
    let interfaces = network::local_ipv4_interfaces();
    info!(interfaces = interfaces.len(), "Starting server discovery");
    discover_with(candidate_urls(&interfaces, options), options, progress).await
}

/// Probe an explicit list of candidate URLs.
///
/// `progress` is called after every finished probe and once more with
/// `done == true`. The returned URLs are sorted.
pub async fn discover_with(
    candidates: Vec<String>,
    options: &DiscoveryOptions,
    mut progress: impl FnMut(&DiscoveryProgress),
) -> Vec<String> {
    let total = candidates.len();
    let timeout = options.probe_timeout;
    let mut probes = stream::iter(candidates)
        .map(|url| probe(url, timeout))
        .buffer_unordered(options.max_concurrent.max(1));

    let mut servers = Vec::new();
    let mut probed: usize = 0;
    while let Some(found) = probes.next().await {
        probed = probed.saturating_add(1);
        if let Some(url) = found {
            info!(url = %url, "Found sync server");
            servers.push(url);
        }
        progress(&DiscoveryProgress {
            message: format!("Suche Server... {probed}/{total}"),
            probed,
            total,
            done: false,
            servers: servers.clone(),
        });
    }

    servers.sort();
    let message = if servers.is_empty() {
        String::from("Keine Server gefunden")
    } else {
        format!("{} Server gefunden", servers.len())
    };
    progress(&DiscoveryProgress {
        message,
        probed,
        total,
        done: true,
        servers: servers.clone(),
    });
    servers
}

/// Try a `WebSocket` handshake with `url`. Returns the URL on success.
async fn probe(url: String, timeout: Duration) -> Option<String> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())).await {
        Ok(Ok((mut socket, _))) => {
            if let Err(e) = socket.close(None).await {
                debug!(url = %url, error = %e, "Probe close failed");
            }
            Some(url)
        }
        Ok(Err(_)) | Err(_) => None,
    }
}
