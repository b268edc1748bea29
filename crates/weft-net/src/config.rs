//! Driver and network configuration.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use weft_common::{WeftError, WeftResult};

/// Driver-wide configuration, injected at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Program iptables rules for isolation and publishing.
    pub enable_iptables: bool,
    /// Enable host IP forwarding at driver construction.
    pub enable_ip_forwarding: bool,
    /// Serve published localhost traffic through a userland proxy instead
    /// of hairpin NAT rules.
    pub enable_userland_proxy: bool,
    /// Name of the protected default bridge device.
    pub default_bridge_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            enable_iptables: true,
            enable_ip_forwarding: true,
            enable_userland_proxy: true,
            default_bridge_name: "weft0".to_string(),
        }
    }
}

/// Per-network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Human-facing network name.
    pub name: String,
    /// Bridge device name; derived from the network id when empty.
    pub bridge_name: String,
    /// The bridge device is externally managed: it must already exist and
    /// is never created or deleted by the driver.
    pub default_bridge: bool,
    /// MTU for the bridge and endpoint devices; 0 leaves the kernel
    /// default in place.
    pub mtu: i32,
    /// Allow containers on this bridge to reach each other.
    pub enable_icc: bool,
    /// Masquerade outbound traffic from the subnet.
    pub enable_ip_masquerade: bool,
    /// Assign IPv6 addresses on this network.
    pub enable_ipv6: bool,
    /// IPv4 subnet of the network (the bridge address lives here).
    pub address_v4: Option<Ipv4Net>,
    /// Restricted sub-block used for container address assignment.
    pub fixed_cidr: Option<Ipv4Net>,
    /// Explicit IPv4 default gateway.
    pub default_gateway_v4: Option<Ipv4Addr>,
    /// IPv6 subnet of the network.
    pub address_v6: Option<Ipv6Net>,
    /// Restricted v6 sub-block used for container address assignment.
    pub fixed_cidr_v6: Option<Ipv6Net>,
    /// Explicit IPv6 default gateway.
    pub default_gateway_v6: Option<Ipv6Addr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            bridge_name: String::new(),
            default_bridge: false,
            mtu: 0,
            enable_icc: true,
            enable_ip_masquerade: true,
            enable_ipv6: false,
            address_v4: None,
            fixed_cidr: None,
            default_gateway_v4: None,
            address_v6: None,
            fixed_cidr_v6: None,
            default_gateway_v6: None,
        }
    }
}

impl NetworkConfig {
    /// A configuration with the given name and the defaults above.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// The fixed sub-CIDR must be wholly contained in the subnet. The IPv4
    /// gateway must lie inside the subnet; it may lie outside the fixed
    /// sub-CIDR (the container allocation range does not constrain the
    /// gateway). The IPv6 gateway requires a v6 fixed sub-CIDR and must
    /// lie inside it.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error naming the offending field.
    pub fn validate(&self) -> WeftResult<()> {
        if self.mtu < 0 {
            return Err(WeftError::Config {
                message: format!("invalid MTU {}", self.mtu),
            });
        }

        if let (Some(subnet), Some(fixed)) = (self.address_v4, self.fixed_cidr) {
            if !subnet.trunc().contains(&fixed.trunc()) {
                return Err(WeftError::Config {
                    message: format!("fixed CIDR {fixed} is not contained in subnet {subnet}"),
                });
            }
        }

        if let Some(gateway) = self.default_gateway_v4 {
            let contained = match (self.address_v4, self.fixed_cidr) {
                (Some(subnet), _) => subnet.trunc().contains(&gateway),
                (None, Some(fixed)) => fixed.trunc().contains(&gateway),
                (None, None) => true,
            };
            if !contained {
                return Err(WeftError::Config {
                    message: format!("default gateway {gateway} is outside the network subnet"),
                });
            }
        }

        if let Some(gateway) = self.default_gateway_v6 {
            let contained = self
                .fixed_cidr_v6
                .is_some_and(|fixed| fixed.trunc().contains(&gateway));
            if !contained {
                return Err(WeftError::Config {
                    message: format!(
                        "default IPv6 gateway {gateway} requires a containing v6 fixed CIDR"
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Options for joining an endpoint to a sandbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinOptions {
    /// Child endpoints this container is linked to; their exposed ports
    /// are opened between the two addresses while the join lasts.
    pub links: Vec<String>,
}
