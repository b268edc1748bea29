//! Firewall rule management.
//!
//! Three rule families, all derived from live network and endpoint data:
//! per-network base rules (masquerade, inter-container policy, outbound
//! and return traffic), pairwise inter-network isolation, and link-scoped
//! exposed-port exceptions. Published-port NAT rules live in
//! [`crate::portmap`]. Every family installs through a group helper that
//! removes already-inserted rules when a later insert fails, so no caller
//! ever observes partial firewall state.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use weft_common::WeftResult;

use crate::exec::HostExec;
use crate::portmap::TransportPort;

/// Name of the chain owned by the driver in the filter and nat tables.
pub const WEFT_CHAIN: &str = "WEFT";

/// Rule operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Add,
    Del,
}

impl Action {
    const fn flag(self) -> &'static str {
        match self {
            Self::Add => "-A",
            Self::Del => "-D",
        }
    }
}

/// One iptables rule: an optional table plus chain-and-match arguments.
#[derive(Debug, Clone)]
pub(crate) struct Rule {
    table: Option<&'static str>,
    spec: Vec<String>,
}

impl Rule {
    pub(crate) fn filter(parts: &[&str]) -> Self {
        Self {
            table: None,
            spec: to_spec(parts),
        }
    }

    pub(crate) fn nat(parts: &[&str]) -> Self {
        Self {
            table: Some("nat"),
            spec: to_spec(parts),
        }
    }
}

fn to_spec(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// Programs iptables rules through the host execution seam.
#[derive(Clone)]
pub struct Firewall {
    exec: Arc<dyn HostExec>,
}

impl Firewall {
    /// Create a firewall programmer.
    #[must_use]
    pub fn new(exec: Arc<dyn HostExec>) -> Self {
        Self { exec }
    }

    /// Create the driver-owned chains and their jump rules.
    ///
    /// Stale jump rules from a previous run are dropped before being
    /// re-added, so initialization is repeatable.
    ///
    /// # Errors
    ///
    /// Returns an error if a jump rule cannot be installed.
    pub fn init_chains(&self) -> WeftResult<()> {
        // Chain creation fails when the chain already exists; that is fine.
        let _ = self.exec.run("iptables", &["-N", WEFT_CHAIN]);
        let _ = self.exec.run("iptables", &["-t", "nat", "-N", WEFT_CHAIN]);

        let jumps = [
            Rule::filter(&["FORWARD", "-j", WEFT_CHAIN]),
            Rule::nat(&[
                "PREROUTING",
                "-m",
                "addrtype",
                "--dst-type",
                "LOCAL",
                "-j",
                WEFT_CHAIN,
            ]),
            Rule::nat(&[
                "OUTPUT",
                "!",
                "-d",
                "127.0.0.0/8",
                "-m",
                "addrtype",
                "--dst-type",
                "LOCAL",
                "-j",
                WEFT_CHAIN,
            ]),
        ];
        for jump in &jumps {
            let _ = self.program(Action::Del, jump);
            self.program(Action::Add, jump)?;
        }
        tracing::debug!(chain = WEFT_CHAIN, "Firewall chains initialized");
        Ok(())
    }

    /// Install the base rules for a network.
    ///
    /// # Errors
    ///
    /// Returns an error after removing any partially-installed rules.
    pub fn add_network_rules(
        &self,
        bridge: &str,
        subnet: &IpNet,
        enable_icc: bool,
        enable_masquerade: bool,
    ) -> WeftResult<()> {
        tracing::debug!(bridge, subnet = %subnet, "Installing network base rules");
        self.add_group(&network_rules(bridge, subnet, enable_icc, enable_masquerade))
    }

    /// Remove the base rules for a network, best-effort.
    pub fn remove_network_rules(
        &self,
        bridge: &str,
        subnet: &IpNet,
        enable_icc: bool,
        enable_masquerade: bool,
    ) {
        self.remove_group(&network_rules(bridge, subnet, enable_icc, enable_masquerade));
    }

    /// Install the pairwise isolation rules between two network subnets.
    ///
    /// # Errors
    ///
    /// Returns an error after removing any partially-installed rules.
    pub fn add_isolation(&self, a: &IpNet, b: &IpNet) -> WeftResult<()> {
        tracing::debug!(a = %a, b = %b, "Isolating network pair");
        self.add_group(&isolation_rules(a, b))
    }

    /// Remove the pairwise isolation rules between two network subnets,
    /// best-effort.
    pub fn remove_isolation(&self, a: &IpNet, b: &IpNet) {
        self.remove_group(&isolation_rules(a, b));
    }

    /// Open a child endpoint's exposed ports between a parent and child
    /// address.
    ///
    /// # Errors
    ///
    /// Returns an error after removing any partially-installed rules.
    pub fn add_link(
        &self,
        parent: IpAddr,
        child: IpAddr,
        ports: &[TransportPort],
    ) -> WeftResult<()> {
        tracing::debug!(%parent, %child, ports = ports.len(), "Installing link rules");
        self.add_group(&link_rules(parent, child, ports))
    }

    /// Remove link-scoped rules, best-effort.
    pub fn remove_link(&self, parent: IpAddr, child: IpAddr, ports: &[TransportPort]) {
        self.remove_group(&link_rules(parent, child, ports));
    }

    pub(crate) fn program(&self, action: Action, rule: &Rule) -> WeftResult<()> {
        let mut args: Vec<&str> = Vec::with_capacity(rule.spec.len() + 3);
        if let Some(table) = rule.table {
            args.push("-t");
            args.push(table);
        }
        args.push(action.flag());
        for part in &rule.spec {
            args.push(part);
        }
        self.exec.run("iptables", &args).map(|_| ())
    }

    /// Install a rule group; on failure the already-inserted prefix is
    /// removed before the error is returned.
    pub(crate) fn add_group(&self, rules: &[Rule]) -> WeftResult<()> {
        for (done, rule) in rules.iter().enumerate() {
            if let Err(err) = self.program(Action::Add, rule) {
                for inserted in rules[..done].iter().rev() {
                    if let Err(undo_err) = self.program(Action::Del, inserted) {
                        tracing::warn!(error = %undo_err, "Failed to undo firewall rule");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Remove a rule group in reverse order, best-effort.
    pub(crate) fn remove_group(&self, rules: &[Rule]) {
        for rule in rules.iter().rev() {
            if let Err(err) = self.program(Action::Del, rule) {
                tracing::warn!(error = %err, "Failed to remove firewall rule");
            }
        }
    }
}

fn network_rules(
    bridge: &str,
    subnet: &IpNet,
    enable_icc: bool,
    enable_masquerade: bool,
) -> Vec<Rule> {
    let subnet = subnet.trunc().to_string();
    let mut rules = Vec::with_capacity(4);
    if enable_masquerade {
        rules.push(Rule::nat(&[
            "POSTROUTING",
            "-s",
            &subnet,
            "!",
            "-o",
            bridge,
            "-j",
            "MASQUERADE",
        ]));
    }
    let icc_target = if enable_icc { "ACCEPT" } else { "DROP" };
    rules.push(Rule::filter(&[
        "FORWARD", "-i", bridge, "-o", bridge, "-j", icc_target,
    ]));
    rules.push(Rule::filter(&[
        "FORWARD", "-i", bridge, "!", "-o", bridge, "-j", "ACCEPT",
    ]));
    rules.push(Rule::filter(&[
        "FORWARD",
        "-o",
        bridge,
        "-m",
        "conntrack",
        "--ctstate",
        "RELATED,ESTABLISHED",
        "-j",
        "ACCEPT",
    ]));
    rules
}

fn isolation_rules(a: &IpNet, b: &IpNet) -> Vec<Rule> {
    let a = a.trunc().to_string();
    let b = b.trunc().to_string();
    vec![
        Rule::filter(&["FORWARD", "-s", &a, "-d", &b, "-j", "DROP"]),
        Rule::filter(&["FORWARD", "-s", &b, "-d", &a, "-j", "DROP"]),
    ]
}

fn link_rules(parent: IpAddr, child: IpAddr, ports: &[TransportPort]) -> Vec<Rule> {
    let parent = parent.to_string();
    let child = child.to_string();
    let mut rules = Vec::with_capacity(ports.len() * 2);
    for port in ports {
        let port_s = port.port.to_string();
        rules.push(Rule::filter(&[
            WEFT_CHAIN,
            "-s",
            &parent,
            "-d",
            &child,
            "-p",
            port.proto.as_str(),
            "--dport",
            &port_s,
            "-j",
            "ACCEPT",
        ]));
        rules.push(Rule::filter(&[
            WEFT_CHAIN,
            "-s",
            &child,
            "-d",
            &parent,
            "-p",
            port.proto.as_str(),
            "--sport",
            &port_s,
            "-j",
            "ACCEPT",
        ]));
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MemoryExec;
    use crate::portmap::Protocol;

    fn firewall() -> (Firewall, MemoryExec) {
        let exec = MemoryExec::new();
        let fw = Firewall::new(Arc::new(exec.clone()));
        (fw, exec)
    }

    #[test]
    fn isolation_installs_both_directions() {
        let (fw, exec) = firewall();
        let a: IpNet = "10.1.0.0/24".parse().unwrap();
        let b: IpNet = "10.2.0.0/24".parse().unwrap();

        fw.add_isolation(&a, &b).unwrap();
        let rules = exec.rules();
        assert_eq!(rules.len(), 2);
        assert!(rules.contains(&"FORWARD -s 10.1.0.0/24 -d 10.2.0.0/24 -j DROP".to_string()));
        assert!(rules.contains(&"FORWARD -s 10.2.0.0/24 -d 10.1.0.0/24 -j DROP".to_string()));

        fw.remove_isolation(&a, &b);
        assert!(exec.rules().is_empty());
    }

    #[test]
    fn partial_isolation_failure_rolls_back() {
        let (fw, exec) = firewall();
        let a: IpNet = "10.1.0.0/24".parse().unwrap();
        let b: IpNet = "10.2.0.0/24".parse().unwrap();

        // The second (b -> a) direction fails to insert.
        exec.fail_matching("-s 10.2.0.0/24");
        assert!(fw.add_isolation(&a, &b).is_err());
        assert!(exec.rules().is_empty());
    }

    #[test]
    fn link_rules_cover_each_port() {
        let (fw, exec) = firewall();
        let parent: IpAddr = "172.17.0.3".parse().unwrap();
        let child: IpAddr = "172.17.0.2".parse().unwrap();
        let ports = [
            TransportPort::new(Protocol::Tcp, 5000),
            TransportPort::new(Protocol::Udp, 400),
        ];

        fw.add_link(parent, child, &ports).unwrap();
        let rules = exec.rules();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules.iter().filter(|r| r.contains("--dport 5000")).count(), 1);
        assert_eq!(rules.iter().filter(|r| r.contains("--sport 5000")).count(), 1);

        fw.remove_link(parent, child, &ports);
        assert!(exec.rules().is_empty());
    }

    #[test]
    fn init_chains_is_repeatable() {
        let (fw, exec) = firewall();
        fw.init_chains().unwrap();
        fw.init_chains().unwrap();

        let jumps: Vec<_> = exec
            .rules()
            .into_iter()
            .filter(|r| r.starts_with("FORWARD -j WEFT"))
            .collect();
        assert_eq!(jumps.len(), 1);
    }
}
