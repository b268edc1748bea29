//! Address space and pool management.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::{IpNet, Ipv4Net};
use parking_lot::Mutex;
use weft_common::{WeftError, WeftResult};

use crate::pool::PoolData;

/// Name of the default local address space.
pub const LOCAL_ADDRESS_SPACE: &str = "LocalDefault";
/// Name of the default global address space.
pub const GLOBAL_ADDRESS_SPACE: &str = "GlobalDefault";

/// A granted address pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAllocation {
    /// Opaque pool id, `space/subnet[/sub-pool]`.
    pub id: String,
    /// The granted subnet.
    pub subnet: IpNet,
}

/// The address pool allocator.
///
/// Pools live inside named address spaces and never overlap within a
/// space. Address grants are deterministic: with no preference, the lowest
/// free usable address is returned, so sequential requests never collide.
pub struct Allocator {
    spaces: Mutex<HashMap<String, HashMap<String, PoolData>>>,
    predefined: Vec<IpNet>,
}

impl Allocator {
    /// Create an allocator with the default predefined IPv4 blocks
    /// (`172.17.0.0/16` through `172.31.0.0/16`, then `192.168.0.0/20`
    /// slices) used to satisfy hint-less pool requests.
    #[must_use]
    pub fn new() -> Self {
        let mut predefined = Vec::new();
        for second in 17..=31u8 {
            if let Ok(net) = Ipv4Net::new(Ipv4Addr::new(172, second, 0, 0), 16) {
                predefined.push(IpNet::V4(net));
            }
        }
        for third in (0..=240u8).step_by(16) {
            if let Ok(net) = Ipv4Net::new(Ipv4Addr::new(192, 168, third, 0), 20) {
                predefined.push(IpNet::V4(net));
            }
        }
        Self {
            spaces: Mutex::new(HashMap::new()),
            predefined,
        }
    }

    /// The local and global default address space names.
    #[must_use]
    pub fn default_address_spaces(&self) -> (&'static str, &'static str) {
        (LOCAL_ADDRESS_SPACE, GLOBAL_ADDRESS_SPACE)
    }

    /// Request a pool in `space`.
    ///
    /// With an explicit `pool` hint (a CIDR string) the pool is granted
    /// unless it is malformed or overlaps a live pool in the space. With no
    /// hint, the first free predefined block is granted. A `sub_pool` hint
    /// carves out the allocation range and must be contained in the pool.
    ///
    /// # Errors
    ///
    /// `Config` on malformed or mismatched hints, `Conflict` on overlap,
    /// `Exhausted` when no predefined block is free (or for hint-less IPv6
    /// requests, which are not supported).
    pub fn request_pool(
        &self,
        space: &str,
        pool: Option<&str>,
        sub_pool: Option<&str>,
        v6: bool,
    ) -> WeftResult<PoolAllocation> {
        if space.is_empty() {
            return Err(WeftError::Config {
                message: "address space name must not be empty".to_string(),
            });
        }
        let pool_hint = pool.map(|p| parse_cidr(p, "pool")).transpose()?;
        let sub_hint = sub_pool.map(|p| parse_cidr(p, "sub-pool")).transpose()?;

        if let Some(hint) = pool_hint {
            if hint.addr().is_ipv6() != v6 {
                return Err(WeftError::Config {
                    message: format!("pool {hint} does not match the requested address family"),
                });
            }
        }
        match (pool_hint, sub_hint) {
            (Some(hint), Some(sub)) if !hint.trunc().contains(&sub.trunc()) => {
                return Err(WeftError::Config {
                    message: format!("sub-pool {sub} is not contained in pool {hint}"),
                });
            }
            (None, Some(sub)) => {
                return Err(WeftError::Config {
                    message: format!("sub-pool {sub} requires an explicit pool"),
                });
            }
            _ => {}
        }

        let mut spaces = self.spaces.lock();
        let pools = spaces.entry(space.to_string()).or_default();

        let subnet = match pool_hint {
            Some(hint) => {
                let hint = hint.trunc();
                if pools.values().any(|p| p.overlaps(&hint)) {
                    return Err(WeftError::Conflict {
                        message: format!("pool {hint} overlaps an existing pool in space {space}"),
                    });
                }
                hint
            }
            None if v6 => {
                return Err(WeftError::Exhausted {
                    resource: "IPv6 address pools (an explicit subnet is required)".to_string(),
                });
            }
            None => self
                .predefined
                .iter()
                .find(|candidate| !pools.values().any(|p| p.overlaps(candidate)))
                .copied()
                .ok_or_else(|| WeftError::Exhausted {
                    resource: format!("address pools in space {space}"),
                })?,
        };

        let id = match sub_hint {
            Some(sub) => format!("{space}/{subnet}/{}", sub.trunc()),
            None => format!("{space}/{subnet}"),
        };
        pools.insert(id.clone(), PoolData::new(subnet, sub_hint));
        tracing::debug!(pool = %id, "Address pool granted");
        Ok(PoolAllocation { id, subnet })
    }

    /// Release the pool identified by `pool_id`.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown id, `Conflict` while the pool still
    /// has outstanding address leases.
    pub fn release_pool(&self, pool_id: &str) -> WeftResult<()> {
        let mut spaces = self.spaces.lock();
        let pools = Self::pools_for(&mut spaces, pool_id)?;
        let data = pools.get(pool_id).ok_or_else(|| WeftError::PoolNotFound {
            id: pool_id.to_string(),
        })?;
        if data.lease_count() > 0 {
            return Err(WeftError::Conflict {
                message: format!(
                    "pool {pool_id} still has {} leased addresses",
                    data.lease_count()
                ),
            });
        }
        pools.remove(pool_id);
        tracing::debug!(pool = pool_id, "Address pool released");
        Ok(())
    }

    /// Request an address from the pool.
    ///
    /// A `preferred` address is granted only if it is free and strictly
    /// inside the pool's subnet (it may sit outside the sub-pool, which
    /// restricts automatic assignment only); otherwise the lowest free
    /// usable address is returned.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown pool, `Config` for an out-of-range
    /// preference, `Conflict` for a leased preference, `Exhausted` when the
    /// pool has no free addresses.
    pub fn request_address(&self, pool_id: &str, preferred: Option<IpAddr>) -> WeftResult<IpAddr> {
        let mut spaces = self.spaces.lock();
        let data = Self::pool_mut(&mut spaces, pool_id)?;
        let ip = match preferred {
            Some(ip) => {
                data.lease_exact(ip)?;
                ip
            }
            None => data.lease_lowest().ok_or_else(|| WeftError::Exhausted {
                resource: format!("addresses in pool {pool_id}"),
            })?,
        };
        tracing::debug!(pool = pool_id, address = %ip, "Address leased");
        Ok(ip)
    }

    /// Release an address back to its pool.
    ///
    /// Releasing an address that is not currently leased is a silent no-op
    /// so that cleanup paths can release unconditionally.
    ///
    /// # Errors
    ///
    /// `PoolNotFound` for an unknown pool id.
    pub fn release_address(&self, pool_id: &str, ip: IpAddr) -> WeftResult<()> {
        let mut spaces = self.spaces.lock();
        let data = Self::pool_mut(&mut spaces, pool_id)?;
        if data.release(ip) {
            tracing::debug!(pool = pool_id, address = %ip, "Address released");
        } else {
            tracing::debug!(pool = pool_id, address = %ip, "Address was not leased");
        }
        Ok(())
    }

    fn pools_for<'a>(
        spaces: &'a mut HashMap<String, HashMap<String, PoolData>>,
        pool_id: &str,
    ) -> WeftResult<&'a mut HashMap<String, PoolData>> {
        let space = pool_id
            .split_once('/')
            .map(|(space, _)| space)
            .ok_or_else(|| WeftError::PoolNotFound {
                id: pool_id.to_string(),
            })?;
        spaces.get_mut(space).ok_or_else(|| WeftError::PoolNotFound {
            id: pool_id.to_string(),
        })
    }

    fn pool_mut<'a>(
        spaces: &'a mut HashMap<String, HashMap<String, PoolData>>,
        pool_id: &str,
    ) -> WeftResult<&'a mut PoolData> {
        Self::pools_for(spaces, pool_id)?
            .get_mut(pool_id)
            .ok_or_else(|| WeftError::PoolNotFound {
                id: pool_id.to_string(),
            })
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cidr(value: &str, what: &str) -> WeftResult<IpNet> {
    value.parse().map_err(|_| WeftError::Config {
        message: format!("invalid {what} {value}"),
    })
}
