//! Host command execution seam.
//!
//! Every `ip(8)`, `iptables(8)` and sysctl side effect goes through the
//! [`HostExec`] trait so the driver can run against the real host or
//! against an in-memory fake:
//! - [`SystemExec`] - production, shells out to the host tools
//! - [`MemoryExec`] - testing, models link existence and a live rule table

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;

use parking_lot::Mutex;
use weft_common::{WeftError, WeftResult};

/// Executor for host-level network mutations.
pub trait HostExec: Send + Sync {
    /// Run a host command, returning its stdout on success.
    fn run(&self, program: &str, args: &[&str]) -> WeftResult<String>;

    /// Write a sysctl key (dotted form, e.g. `net.ipv4.ip_forward`).
    fn write_sysctl(&self, key: &str, value: &str) -> WeftResult<()>;
}

/// Production executor shelling out to the host tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExec;

impl HostExec for SystemExec {
    fn run(&self, program: &str, args: &[&str]) -> WeftResult<String> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| WeftError::Internal {
                message: format!("Failed to execute {program}: {e}"),
            })?;

        if !output.status.success() {
            return Err(WeftError::Internal {
                message: format!(
                    "{program} {} failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn write_sysctl(&self, key: &str, value: &str) -> WeftResult<()> {
        let path = format!("/proc/sys/{}", key.replace('.', "/"));
        std::fs::write(&path, value).map_err(|e| WeftError::Internal {
            message: format!("Failed to write {path}: {e}"),
        })?;
        tracing::debug!(key, value, "sysctl written");
        Ok(())
    }
}

/// In-memory executor for tests.
///
/// Models just enough host state to exercise the driver without touching
/// the kernel: which links exist (and veth peering), the live iptables
/// rule table, and sysctl writes. Failures can be injected by substring
/// match on the command line.
#[derive(Debug, Clone, Default)]
pub struct MemoryExec {
    state: Arc<Mutex<MemState>>,
}

#[derive(Debug, Default)]
struct MemState {
    links: HashMap<String, Option<String>>,
    chains: Vec<String>,
    rules: Vec<String>,
    sysctls: HashMap<String, String>,
    history: Vec<String>,
    fail_on: Vec<String>,
}

impl MemoryExec {
    /// Create an empty fake host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for any command whose line contains `needle`.
    pub fn fail_matching(&self, needle: &str) {
        self.state.lock().fail_on.push(needle.to_string());
    }

    /// Pre-seed a link, e.g. an externally managed bridge.
    pub fn add_link(&self, name: &str) {
        self.state.lock().links.insert(name.to_string(), None);
    }

    /// Whether a link currently exists.
    #[must_use]
    pub fn has_link(&self, name: &str) -> bool {
        self.state.lock().links.contains_key(name)
    }

    /// Snapshot of the live rule table, one canonical line per rule.
    ///
    /// Lines start with the chain name (prefixed with `-t <table>` for
    /// non-filter tables), followed by the match and target arguments.
    #[must_use]
    pub fn rules(&self) -> Vec<String> {
        self.state.lock().rules.clone()
    }

    /// Every command line issued, in order.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }

    /// Value last written to a sysctl key, if any.
    #[must_use]
    pub fn sysctl(&self, key: &str) -> Option<String> {
        self.state.lock().sysctls.get(key).cloned()
    }
}

impl HostExec for MemoryExec {
    fn run(&self, program: &str, args: &[&str]) -> WeftResult<String> {
        let mut state = self.state.lock();
        let line = format!("{program} {}", args.join(" "));
        state.history.push(line.clone());

        if state.fail_on.iter().any(|needle| line.contains(needle)) {
            return Err(WeftError::Internal {
                message: format!("injected failure: {line}"),
            });
        }

        match program {
            "ip" => state.ip_command(args),
            "iptables" | "ip6tables" => state.iptables_command(args),
            _ => Ok(String::new()),
        }
    }

    fn write_sysctl(&self, key: &str, value: &str) -> WeftResult<()> {
        self.state
            .lock()
            .sysctls
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl MemState {
    fn ip_command(&mut self, args: &[&str]) -> WeftResult<String> {
        // "ip -6 ..." behaves like "ip ..." for the state we model.
        let args = if args.first() == Some(&"-6") {
            &args[1..]
        } else {
            args
        };

        match (args.first(), args.get(1)) {
            (Some(&"link"), Some(&"add")) => self.link_add(args),
            (Some(&"link"), Some(&"show")) => {
                let name = args.get(2).copied().unwrap_or_default();
                self.require_link(name).map(|()| String::new())
            }
            (Some(&"link"), Some(&"set")) => {
                let name = args.get(2).copied().unwrap_or_default();
                self.require_link(name)?;
                if args.get(3) == Some(&"master") {
                    self.require_link(args.get(4).copied().unwrap_or_default())?;
                }
                Ok(String::new())
            }
            (Some(&"link"), Some(&"delete")) => {
                let name = args.get(2).copied().unwrap_or_default();
                self.require_link(name)?;
                if let Some(Some(peer)) = self.links.remove(name) {
                    self.links.remove(&peer);
                }
                Ok(String::new())
            }
            (Some(&"addr"), Some(&"add")) => {
                let dev = args
                    .iter()
                    .position(|a| *a == "dev")
                    .and_then(|i| args.get(i + 1))
                    .copied()
                    .unwrap_or_default();
                self.require_link(dev).map(|()| String::new())
            }
            _ => Ok(String::new()),
        }
    }

    fn link_add(&mut self, args: &[&str]) -> WeftResult<String> {
        // Forms: "link add name <br> type bridge"
        //        "link add <host> type veth peer name <peer>"
        let name = if args.get(2) == Some(&"name") {
            args.get(3).copied().unwrap_or_default()
        } else {
            args.get(2).copied().unwrap_or_default()
        };
        if self.links.contains_key(name) {
            return Err(WeftError::Internal {
                message: format!("RTNETLINK answers: File exists: {name}"),
            });
        }
        let peer = args
            .iter()
            .position(|a| *a == "peer")
            .and_then(|i| args.get(i + 2))
            .copied();
        self.links.insert(name.to_string(), peer.map(String::from));
        if let Some(peer) = peer {
            self.links.insert(peer.to_string(), Some(name.to_string()));
        }
        Ok(String::new())
    }

    fn require_link(&self, name: &str) -> WeftResult<()> {
        if self.links.contains_key(name) {
            Ok(())
        } else {
            Err(WeftError::Internal {
                message: format!("Device \"{name}\" does not exist"),
            })
        }
    }

    fn iptables_command(&mut self, args: &[&str]) -> WeftResult<String> {
        let action = args
            .iter()
            .position(|a| matches!(*a, "-A" | "-I" | "-D" | "-C" | "-N" | "-F" | "-X"));
        let Some(idx) = action else {
            return Ok(String::new());
        };

        match args[idx] {
            "-N" => {
                let chain = args.get(idx + 1).copied().unwrap_or_default();
                if self.chains.iter().any(|c| c.as_str() == chain) {
                    return Err(WeftError::Internal {
                        message: format!("iptables: Chain already exists: {chain}"),
                    });
                }
                self.chains.push(chain.to_string());
                Ok(String::new())
            }
            "-F" | "-X" => Ok(String::new()),
            flag => {
                let line = canonical_rule(args, idx);
                match flag {
                    "-A" | "-I" => {
                        self.rules.push(line);
                        Ok(String::new())
                    }
                    "-C" => {
                        if self.rules.iter().any(|r| *r == line) {
                            Ok(String::new())
                        } else {
                            Err(WeftError::Internal {
                                message: format!("iptables: no rule: {line}"),
                            })
                        }
                    }
                    _ => {
                        // "-D"
                        let pos = self.rules.iter().position(|r| *r == line);
                        match pos {
                            Some(i) => {
                                self.rules.remove(i);
                                Ok(String::new())
                            }
                            None => Err(WeftError::Internal {
                                message: format!("iptables: no rule to delete: {line}"),
                            }),
                        }
                    }
                }
            }
        }
    }
}

/// Canonical rule line: the full argument list with the action flag (and
/// any `-I` position index) stripped, so add/check/delete forms compare
/// equal.
fn canonical_rule(args: &[&str], action_idx: usize) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(args.len());
    parts.extend(&args[..action_idx]);
    let mut rest = &args[action_idx + 1..];
    // "-I CHAIN 1 ..." carries a rule position after the chain name.
    if args[action_idx] == "-I"
        && rest.len() > 1
        && rest[1].chars().all(|c| c.is_ascii_digit())
    {
        parts.push(rest[0]);
        rest = &rest[2..];
    }
    parts.extend(rest);
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_are_modeled() {
        let exec = MemoryExec::new();
        assert!(exec.run("ip", &["link", "show", "br0"]).is_err());

        exec.run("ip", &["link", "add", "name", "br0", "type", "bridge"])
            .unwrap();
        assert!(exec.has_link("br0"));
        exec.run("ip", &["link", "set", "br0", "up"]).unwrap();
        exec.run("ip", &["addr", "add", "10.0.0.1/24", "dev", "br0"])
            .unwrap();

        assert!(
            exec.run("ip", &["link", "add", "name", "br0", "type", "bridge"])
                .is_err()
        );
    }

    #[test]
    fn veth_peers_delete_together() {
        let exec = MemoryExec::new();
        exec.run(
            "ip",
            &["link", "add", "vethaa", "type", "veth", "peer", "name", "vethbb"],
        )
        .unwrap();
        assert!(exec.has_link("vethaa"));
        assert!(exec.has_link("vethbb"));

        exec.run("ip", &["link", "delete", "vethaa"]).unwrap();
        assert!(!exec.has_link("vethaa"));
        assert!(!exec.has_link("vethbb"));
    }

    #[test]
    fn rule_table_add_and_delete() {
        let exec = MemoryExec::new();
        let rule = ["FORWARD", "-s", "10.0.0.0/24", "-j", "DROP"];

        let mut add = vec!["-A"];
        add.extend(rule);
        exec.run("iptables", &add).unwrap();
        assert_eq!(exec.rules(), vec!["FORWARD -s 10.0.0.0/24 -j DROP"]);

        let mut del = vec!["-D"];
        del.extend(rule);
        exec.run("iptables", &del).unwrap();
        assert!(exec.rules().is_empty());
        assert!(exec.run("iptables", &del).is_err());
    }

    #[test]
    fn insert_position_is_canonicalized() {
        let exec = MemoryExec::new();
        exec.run("iptables", &["-I", "FORWARD", "1", "-i", "br0", "-j", "ACCEPT"])
            .unwrap();
        exec.run("iptables", &["-D", "FORWARD", "-i", "br0", "-j", "ACCEPT"])
            .unwrap();
        assert!(exec.rules().is_empty());
    }

    #[test]
    fn injected_failures() {
        let exec = MemoryExec::new();
        exec.fail_matching("MASQUERADE");
        assert!(
            exec.run("iptables", &["-t", "nat", "-A", "POSTROUTING", "-j", "MASQUERADE"])
                .is_err()
        );
    }
}
