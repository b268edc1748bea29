//! Endpoint data model and the join-time interface contract.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use weft_common::{WeftError, WeftResult};

use crate::portmap::{PortBinding, TransportPort};

/// A MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Create a MAC address from raw octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// The raw octets.
    #[must_use]
    pub const fn octets(self) -> [u8; 6] {
        self.0
    }

    /// Derive a locally administered MAC from an IPv4 address
    /// (`02:42` prefix followed by the address octets).
    #[must_use]
    pub fn from_ipv4(ip: Ipv4Addr) -> Self {
        let [a, b, c, d] = ip.octets();
        Self([0x02, 0x42, a, b, c, d])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WeftError::Config {
            message: format!("invalid MAC address {s}"),
        };
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

/// A static route to install in the joining sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    /// Destination network.
    pub destination: IpNet,
    /// Next hop; routes without one are device routes.
    pub next_hop: Option<IpAddr>,
}

/// Requested endpoint attributes at creation time.
#[derive(Debug, Clone, Default)]
pub struct EndpointSpec {
    /// Caller-requested MAC address.
    pub mac: Option<MacAddr>,
    /// Caller-requested IPv4 address.
    pub address: Option<Ipv4Addr>,
    /// Caller-requested IPv6 address.
    pub address_v6: Option<Ipv6Addr>,
    /// Container ports exposed to linked endpoints.
    pub exposed_ports: Vec<TransportPort>,
    /// Host port bindings to publish at join time.
    pub port_bindings: Vec<PortBinding>,
    /// Static routes to install in the sandbox at join time.
    pub static_routes: Vec<StaticRoute>,
}

/// The interface assignment returned by endpoint creation.
#[derive(Debug, Clone)]
pub struct EndpointInterface {
    /// Assigned MAC address.
    pub mac: MacAddr,
    /// Assigned IPv4 address with the network prefix.
    pub address: Ipv4Net,
    /// Assigned IPv6 address with the network prefix, when enabled.
    pub address_v6: Option<Ipv6Net>,
    /// Host-side veth device name.
    pub host_ifname: String,
    /// Container-side veth device name before the sandbox renames it.
    pub container_ifname: String,
}

/// Sink the driver fills while joining an endpoint to a sandbox.
///
/// The sandbox layer implements this to receive the interface name, the
/// resolved default gateways and the endpoint's static routes.
pub trait InterfaceSink: Send {
    /// Receive the source device name and the destination name prefix.
    fn set_names(&mut self, src_name: &str, dst_prefix: &str) -> WeftResult<()>;

    /// Receive the resolved IPv4 default gateway.
    fn set_gateway(&mut self, gateway: IpAddr) -> WeftResult<()>;

    /// Receive the resolved IPv6 default gateway.
    fn set_gateway_v6(&mut self, gateway: IpAddr) -> WeftResult<()>;

    /// Receive a static route to install.
    fn add_static_route(&mut self, route: &StaticRoute) -> WeftResult<()>;
}

/// An [`InterfaceSink`] that records what the driver hands it.
#[derive(Debug, Default)]
pub struct InterfaceRecord {
    /// Source device name.
    pub src_name: Option<String>,
    /// Destination name prefix.
    pub dst_prefix: Option<String>,
    /// Resolved IPv4 gateway.
    pub gateway: Option<IpAddr>,
    /// Resolved IPv6 gateway.
    pub gateway_v6: Option<IpAddr>,
    /// Static routes, in install order.
    pub routes: Vec<StaticRoute>,
}

impl InterfaceSink for InterfaceRecord {
    fn set_names(&mut self, src_name: &str, dst_prefix: &str) -> WeftResult<()> {
        self.src_name = Some(src_name.to_string());
        self.dst_prefix = Some(dst_prefix.to_string());
        Ok(())
    }

    fn set_gateway(&mut self, gateway: IpAddr) -> WeftResult<()> {
        self.gateway = Some(gateway);
        Ok(())
    }

    fn set_gateway_v6(&mut self, gateway: IpAddr) -> WeftResult<()> {
        self.gateway_v6 = Some(gateway);
        Ok(())
    }

    fn add_static_route(&mut self, route: &StaticRoute) -> WeftResult<()> {
        self.routes.push(route.clone());
        Ok(())
    }
}

/// Operational snapshot of one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointOperInfo {
    /// MAC address string.
    pub mac: String,
    /// IPv4 address string.
    pub address: String,
    /// IPv6 address string, when assigned.
    pub address_v6: Option<String>,
    /// Sandbox key while joined.
    pub sandbox_key: Option<String>,
    /// Exposed container ports.
    pub exposed_ports: Vec<TransportPort>,
    /// Published host port bindings.
    pub port_bindings: Vec<PortBinding>,
}

/// Per-endpoint entry of the upward-facing network view.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointView {
    /// MAC address string.
    pub mac: String,
    /// IPv4 address string.
    pub ipv4: String,
    /// IPv6 address string, when assigned.
    pub ipv6: Option<String>,
}

/// Upward-facing per-network summary consumed by the resource view layer.
///
/// Only endpoints currently joined to a sandbox appear in `containers`.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSummary {
    /// Network name.
    pub name: String,
    /// Network id.
    pub id: String,
    /// Driver type serving the network.
    pub driver: String,
    /// Joined endpoints, keyed by endpoint id.
    pub containers: HashMap<String, EndpointView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_display_and_parse() {
        let mac: MacAddr = "02:42:ac:11:00:02".parse().unwrap();
        assert_eq!(mac.octets(), [0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);
        assert_eq!(mac.to_string(), "02:42:ac:11:00:02");

        assert!("02:42:ac".parse::<MacAddr>().is_err());
        assert!("02:42:ac:11:00:02:aa".parse::<MacAddr>().is_err());
        assert!("zz:42:ac:11:00:02".parse::<MacAddr>().is_err());
    }

    #[test]
    fn mac_from_ipv4() {
        let mac = MacAddr::from_ipv4("172.17.0.2".parse().unwrap());
        assert_eq!(mac.to_string(), "02:42:ac:11:00:02");
    }
}
