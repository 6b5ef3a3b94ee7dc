//! Local network interface enumeration.
//!
//! Used for the connection hints shown to the operator and as the address
//! source for the discovery scan.

use std::net::Ipv4Addr;

use serde::Serialize;
use tracing::warn;

/// A non-loopback IPv4 interface of this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    /// Interface name as reported by the OS.
    pub name: String,
    /// Assigned address.
    pub addr: Ipv4Addr,
    /// Subnet mask.
    pub netmask: Ipv4Addr,
}

/// Connection URLs for one interface, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAddress {
    /// Interface name.
    pub name: String,
    /// Dotted-quad address.
    pub address: String,
    /// `WebSocket` URL peers on this network connect to.
    pub ws_url: String,
    /// HTTP URL of the status page.
    pub http_url: String,
}

/// Enumerate non-loopback IPv4 interfaces.
///
/// Enumeration failures are logged and yield an empty list.
pub fn local_ipv4_interfaces() -> Vec<LocalInterface> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => Some(LocalInterface {
                name: iface.name,
                addr: v4.ip,
                netmask: v4.netmask,
            }),
            if_addrs::IfAddr::V6(_) => None,
        })
        .collect()
}

/// Connection URLs for every non-loopback IPv4 interface at `port`.
pub fn network_addresses(port: u16) -> Vec<NetworkAddress> {
    local_ipv4_interfaces()
        .into_iter()
        .map(|iface| NetworkAddress::new(iface.name, iface.addr, port))
        .collect()
}

impl NetworkAddress {
    /// Build the URLs for `addr:port`.
    pub fn new(name: String, addr: Ipv4Addr, port: u16) -> Self {
        Self {
            name,
            address: addr.to_string(),
            ws_url: format!("ws://{addr}:{port}"),
            http_url: format!("http://{addr}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_use_interface_address_and_port() {
        let address = NetworkAddress::new(String::from("eth0"), Ipv4Addr::new(10, 0, 0, 7), 8081);
        assert_eq!(address.ws_url, "ws://10.0.0.7:8081");
        assert_eq!(address.http_url, "http://10.0.0.7:8081");

        let json = serde_json::to_value(&address).unwrap_or_default();
        assert_eq!(json["wsUrl"], "ws://10.0.0.7:8081");
        assert_eq!(json["address"], "10.0.0.7");
    }

    #[test]
    fn enumeration_never_reports_loopback() {
        assert!(local_ipv4_interfaces().iter().all(|iface| !iface.addr.is_loopback()));
    }
}
