//! Port publishing for endpoints.
//!
//! Published host ports are reached through nat DNAT rules toward the
//! container address, with a filter ACCEPT for the forwarded flow and a
//! hairpin MASQUERADE when the userland proxy is disabled.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use weft_common::WeftResult;

use crate::firewall::{Firewall, Rule, WEFT_CHAIN};

/// Protocol for port rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP protocol.
    Tcp,
    /// UDP protocol.
    Udp,
}

impl Protocol {
    /// The protocol string as iptables expects it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A container port exposed to linked endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportPort {
    /// Protocol.
    pub proto: Protocol,
    /// Container port number.
    pub port: u16,
}

impl TransportPort {
    /// Create an exposed port.
    #[must_use]
    pub const fn new(proto: Protocol, port: u16) -> Self {
        Self { proto, port }
    }
}

/// A published binding between a host port and a container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Protocol.
    pub proto: Protocol,
    /// Host address to bind; all addresses when absent.
    pub host_ip: Option<IpAddr>,
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
}

impl PortBinding {
    /// Create a TCP binding.
    #[must_use]
    pub const fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            proto: Protocol::Tcp,
            host_ip: None,
            host_port,
            container_port,
        }
    }

    /// Create a UDP binding.
    #[must_use]
    pub const fn udp(host_port: u16, container_port: u16) -> Self {
        Self {
            proto: Protocol::Udp,
            host_ip: None,
            host_port,
            container_port,
        }
    }

    /// Restrict the binding to one host address.
    #[must_use]
    pub fn with_host_ip(mut self, ip: IpAddr) -> Self {
        self.host_ip = Some(ip);
        self
    }
}

impl Firewall {
    /// Publish an endpoint's port bindings toward its address.
    ///
    /// # Errors
    ///
    /// Returns an error after removing any partially-installed rules.
    pub fn publish_ports(
        &self,
        container_ip: IpAddr,
        bindings: &[PortBinding],
        userland_proxy: bool,
    ) -> WeftResult<()> {
        tracing::debug!(%container_ip, bindings = bindings.len(), "Publishing ports");
        self.add_group(&publish_rules(container_ip, bindings, userland_proxy))
    }

    /// Remove an endpoint's published-port rules, best-effort.
    pub fn release_ports(
        &self,
        container_ip: IpAddr,
        bindings: &[PortBinding],
        userland_proxy: bool,
    ) {
        tracing::debug!(%container_ip, bindings = bindings.len(), "Releasing published ports");
        self.remove_group(&publish_rules(container_ip, bindings, userland_proxy));
    }
}

fn publish_rules(
    container_ip: IpAddr,
    bindings: &[PortBinding],
    userland_proxy: bool,
) -> Vec<Rule> {
    let ip = container_ip.to_string();
    let mut rules = Vec::with_capacity(bindings.len() * 3);
    for binding in bindings {
        let proto = binding.proto.as_str();
        let host_port = binding.host_port.to_string();
        let container_port = binding.container_port.to_string();
        let dest = format!("{ip}:{container_port}");

        let mut dnat: Vec<&str> = vec![WEFT_CHAIN, "-p", proto];
        let host_ip = binding.host_ip.map(|ip| ip.to_string());
        if let Some(ref host_ip) = host_ip {
            dnat.push("-d");
            dnat.push(host_ip);
        }
        dnat.extend(["--dport", &host_port, "-j", "DNAT", "--to-destination", &dest]);
        rules.push(Rule::nat(&dnat));

        rules.push(Rule::filter(&[
            WEFT_CHAIN,
            "-d",
            &ip,
            "-p",
            proto,
            "--dport",
            &container_port,
            "-j",
            "ACCEPT",
        ]));

        // Hairpin return traffic is handled by the userland proxy when it
        // is enabled.
        if !userland_proxy {
            rules.push(Rule::nat(&[
                "POSTROUTING",
                "-p",
                proto,
                "-s",
                &ip,
                "-d",
                &ip,
                "--dport",
                &container_port,
                "-j",
                "MASQUERADE",
            ]));
        }
    }
    rules
}
