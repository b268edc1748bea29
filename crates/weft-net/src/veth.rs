//! Virtual ethernet pair management.

use std::sync::Arc;

use weft_common::WeftResult;

use crate::endpoint::MacAddr;
use crate::exec::HostExec;

/// A virtual ethernet pair: one end on the host bridge, one end destined
/// for a container's network namespace.
pub struct VethPair {
    /// Host-side interface name.
    pub host: String,
    /// Container-side interface name.
    pub container: String,
    exec: Arc<dyn HostExec>,
}

impl VethPair {
    /// Create the pair and bring the host side up.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair cannot be created.
    pub fn create(exec: Arc<dyn HostExec>, host: &str, container: &str) -> WeftResult<Self> {
        tracing::debug!(host, container, "Creating veth pair");
        exec.run(
            "ip",
            &["link", "add", host, "type", "veth", "peer", "name", container],
        )?;
        exec.run("ip", &["link", "set", host, "up"])?;
        Ok(Self {
            host: host.to_string(),
            container: container.to_string(),
            exec,
        })
    }

    /// Wrap an already-created pair, e.g. for teardown.
    #[must_use]
    pub fn from_existing(exec: Arc<dyn HostExec>, host: &str, container: &str) -> Self {
        Self {
            host: host.to_string(),
            container: container.to_string(),
            exec,
        }
    }

    /// Set the MTU on both ends.
    ///
    /// # Errors
    ///
    /// Returns an error if either end rejects the MTU.
    pub fn set_mtu(&self, mtu: i32) -> WeftResult<()> {
        let mtu = mtu.to_string();
        self.exec
            .run("ip", &["link", "set", &self.host, "mtu", &mtu])?;
        self.exec
            .run("ip", &["link", "set", &self.container, "mtu", &mtu])?;
        Ok(())
    }

    /// Program the container-side MAC address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be set.
    pub fn set_container_mac(&self, mac: MacAddr) -> WeftResult<()> {
        self.exec.run(
            "ip",
            &["link", "set", &self.container, "address", &mac.to_string()],
        )?;
        Ok(())
    }

    /// Move the container side into a sandbox network namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be moved.
    pub fn move_to_sandbox(&self, sandbox_key: &str) -> WeftResult<()> {
        tracing::debug!(interface = %self.container, sandbox_key, "Moving veth into sandbox");
        self.exec
            .run("ip", &["link", "set", &self.container, "netns", sandbox_key])?;
        Ok(())
    }

    /// Delete the pair (removing the host side removes both ends).
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be deleted.
    pub fn delete(&self) -> WeftResult<()> {
        tracing::debug!(host = %self.host, "Deleting veth pair");
        self.exec.run("ip", &["link", "delete", &self.host])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MemoryExec;

    #[test]
    fn create_and_delete() {
        let exec = Arc::new(MemoryExec::new());
        let pair = VethPair::create(
            Arc::clone(&exec) as Arc<dyn HostExec>,
            "vethab1",
            "vethab1c",
        )
        .unwrap();
        assert!(exec.has_link("vethab1"));
        assert!(exec.has_link("vethab1c"));

        pair.set_mtu(1450).unwrap();
        pair.set_container_mac(MacAddr::from_ipv4("10.0.0.2".parse().unwrap()))
            .unwrap();

        pair.delete().unwrap();
        assert!(!exec.has_link("vethab1"));
        assert!(!exec.has_link("vethab1c"));
    }
}
