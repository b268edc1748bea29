//! Linux bridge device management.

use std::sync::Arc;

use weft_common::WeftResult;

use crate::exec::HostExec;

/// Manager for one kernel bridge device.
pub struct BridgeDevice {
    name: String,
    exec: Arc<dyn HostExec>,
}

impl BridgeDevice {
    /// Create a manager for the named bridge; no device is touched yet.
    #[must_use]
    pub fn new(name: &str, exec: Arc<dyn HostExec>) -> Self {
        Self {
            name: name.to_string(),
            exec,
        }
    }

    /// The bridge device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the bridge device exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.exec.run("ip", &["link", "show", &self.name]).is_ok()
    }

    /// Create the bridge device if it does not exist, and bring it up.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be created or brought up.
    pub fn ensure(&self) -> WeftResult<()> {
        if !self.exists() {
            tracing::debug!(name = %self.name, "Creating bridge");
            self.exec
                .run("ip", &["link", "add", "name", &self.name, "type", "bridge"])?;
        }
        self.up()
    }

    /// Bring the bridge interface up.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be brought up.
    pub fn up(&self) -> WeftResult<()> {
        self.exec.run("ip", &["link", "set", &self.name, "up"])?;
        Ok(())
    }

    /// Assign an IPv4 address in CIDR form to the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be assigned.
    pub fn set_address(&self, cidr: &str) -> WeftResult<()> {
        tracing::debug!(bridge = %self.name, ip = cidr, "Setting bridge address");
        self.exec
            .run("ip", &["addr", "add", cidr, "dev", &self.name])?;
        Ok(())
    }

    /// Assign an IPv6 address in CIDR form to the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be assigned.
    pub fn set_address_v6(&self, cidr: &str) -> WeftResult<()> {
        tracing::debug!(bridge = %self.name, ip = cidr, "Setting bridge IPv6 address");
        self.exec
            .run("ip", &["-6", "addr", "add", cidr, "dev", &self.name])?;
        Ok(())
    }

    /// Set the bridge MTU.
    ///
    /// # Errors
    ///
    /// Returns an error if the MTU cannot be set.
    pub fn set_mtu(&self, mtu: i32) -> WeftResult<()> {
        self.exec
            .run("ip", &["link", "set", &self.name, "mtu", &mtu.to_string()])?;
        Ok(())
    }

    /// Attach an interface to the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be enslaved.
    pub fn enslave(&self, interface: &str) -> WeftResult<()> {
        tracing::debug!(bridge = %self.name, interface, "Attaching interface to bridge");
        self.exec
            .run("ip", &["link", "set", interface, "master", &self.name])?;
        Ok(())
    }

    /// Delete the bridge device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be deleted.
    pub fn delete(&self) -> WeftResult<()> {
        tracing::debug!(name = %self.name, "Deleting bridge");
        self.exec.run("ip", &["link", "delete", &self.name])?;
        Ok(())
    }
}

/// Enable IPv4 forwarding on the host.
///
/// # Errors
///
/// Returns an error if the sysctl cannot be written.
pub fn enable_ip_forwarding(exec: &dyn HostExec) -> WeftResult<()> {
    exec.write_sysctl("net.ipv4.ip_forward", "1")?;
    tracing::info!("IP forwarding enabled");
    Ok(())
}

/// Enable IPv6 forwarding on the host.
///
/// # Errors
///
/// Returns an error if the sysctl cannot be written.
pub fn enable_ipv6_forwarding(exec: &dyn HostExec) -> WeftResult<()> {
    exec.write_sysctl("net.ipv6.conf.all.forwarding", "1")?;
    tracing::info!("IPv6 forwarding enabled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MemoryExec;

    #[test]
    fn ensure_creates_once() {
        let exec = Arc::new(MemoryExec::new());
        let bridge = BridgeDevice::new("br-test", Arc::clone(&exec) as Arc<dyn HostExec>);

        assert!(!bridge.exists());
        bridge.ensure().unwrap();
        assert!(bridge.exists());
        // A second ensure is a no-op rather than a failure.
        bridge.ensure().unwrap();

        bridge.set_address("10.9.0.1/24").unwrap();
        bridge.delete().unwrap();
        assert!(!bridge.exists());
    }

    #[test]
    fn enslave_requires_both_devices() {
        let exec = Arc::new(MemoryExec::new());
        let bridge = BridgeDevice::new("br-test", Arc::clone(&exec) as Arc<dyn HostExec>);
        bridge.ensure().unwrap();
        assert!(bridge.enslave("veth-missing").is_err());
    }
}
