//! Per-pool lease bookkeeping.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;
use weft_common::{WeftError, WeftResult};

/// Lease state for one address pool.
///
/// The usable range excludes the subnet's network address and its last
/// address (the IPv4 broadcast; the last address is reserved for IPv6 as
/// well so both families share one rule). An optional sub-pool restricts
/// allocation to a carve-out of the subnet.
#[derive(Debug)]
pub(crate) struct PoolData {
    subnet: IpNet,
    range: IpNet,
    allocated: BTreeSet<u128>,
}

impl PoolData {
    pub(crate) fn new(subnet: IpNet, sub_pool: Option<IpNet>) -> Self {
        let subnet = subnet.trunc();
        let range = sub_pool.map_or(subnet, |p| p.trunc());
        Self {
            subnet,
            range,
            allocated: BTreeSet::new(),
        }
    }

    pub(crate) fn subnet(&self) -> IpNet {
        self.subnet
    }

    pub(crate) fn lease_count(&self) -> usize {
        self.allocated.len()
    }

    fn first_usable(&self) -> u128 {
        let pool_first = ip_to_bits(self.subnet.network()) + 1;
        pool_first.max(ip_to_bits(self.range.network()))
    }

    fn last_usable(&self) -> u128 {
        let pool_last = ip_to_bits(self.subnet.broadcast()).saturating_sub(1);
        pool_last.min(ip_to_bits(self.range.broadcast()))
    }

    /// Bounds for explicit pins: anywhere strictly inside the subnet.
    /// The sub-pool restricts automatic assignment only, so a gateway may
    /// be pinned outside the container allocation range.
    fn in_pool_bounds(&self, ip: IpAddr) -> bool {
        if ip.is_ipv6() != matches!(self.subnet, IpNet::V6(_)) {
            return false;
        }
        let v = ip_to_bits(ip);
        v > ip_to_bits(self.subnet.network()) && v < ip_to_bits(self.subnet.broadcast())
    }

    /// Lease the lowest free usable address, or `None` when exhausted.
    pub(crate) fn lease_lowest(&mut self) -> Option<IpAddr> {
        let last = self.last_usable();
        let mut v = self.first_usable();
        loop {
            if v > last {
                return None;
            }
            if !self.allocated.contains(&v) {
                self.allocated.insert(v);
                return Some(bits_to_ip(v, self.subnet.addr().is_ipv6()));
            }
            if v == last {
                return None;
            }
            v += 1;
        }
    }

    /// Lease a caller-requested address.
    pub(crate) fn lease_exact(&mut self, ip: IpAddr) -> WeftResult<()> {
        if !self.in_pool_bounds(ip) {
            return Err(WeftError::Config {
                message: format!("requested address {} is out of range for pool {}", ip, self.subnet),
            });
        }
        let v = ip_to_bits(ip);
        if self.allocated.contains(&v) {
            return Err(WeftError::Conflict {
                message: format!("address {ip} is already in use"),
            });
        }
        self.allocated.insert(v);
        Ok(())
    }

    /// Release a leased address; returns whether it was actually leased.
    pub(crate) fn release(&mut self, ip: IpAddr) -> bool {
        self.allocated.remove(&ip_to_bits(ip))
    }

    /// True if this pool's subnet overlaps `other`.
    pub(crate) fn overlaps(&self, other: &IpNet) -> bool {
        let other = other.trunc();
        self.subnet.contains(&other.network()) || other.contains(&self.subnet.network())
    }
}

fn ip_to_bits(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn bits_to_ip(bits: u128, v6: bool) -> IpAddr {
    if v6 {
        IpAddr::V6(Ipv6Addr::from(bits))
    } else {
        IpAddr::V4(Ipv4Addr::from(bits as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(subnet: &str, sub: Option<&str>) -> PoolData {
        PoolData::new(
            subnet.parse().unwrap(),
            sub.map(|s| s.parse().unwrap()),
        )
    }

    #[test]
    fn skips_network_and_last_address() {
        let mut p = pool("10.1.1.0/30", None);
        assert_eq!(p.lease_lowest(), Some("10.1.1.1".parse().unwrap()));
        assert_eq!(p.lease_lowest(), Some("10.1.1.2".parse().unwrap()));
        assert_eq!(p.lease_lowest(), None);
    }

    #[test]
    fn sub_pool_restricts_automatic_range() {
        let mut p = pool("10.0.0.0/16", Some("10.0.5.0/24"));
        assert_eq!(p.lease_lowest(), Some("10.0.5.0".parse().unwrap()));
        // Explicit pins may land anywhere inside the subnet.
        assert!(p.lease_exact("10.0.6.1".parse().unwrap()).is_ok());
        assert!(p.lease_exact("10.1.0.1".parse().unwrap()).is_err());
    }

    #[test]
    fn release_reports_prior_lease() {
        let mut p = pool("10.1.1.0/29", None);
        let ip = p.lease_lowest().unwrap();
        assert!(p.release(ip));
        assert!(!p.release(ip));
    }

    #[test]
    fn overlap_detection() {
        let p = pool("172.17.0.0/16", None);
        assert!(p.overlaps(&"172.17.5.0/24".parse().unwrap()));
        assert!(p.overlaps(&"172.16.0.0/12".parse().unwrap()));
        assert!(!p.overlaps(&"172.18.0.0/16".parse().unwrap()));
    }
}
