//! The bridge network driver.
//!
//! Orchestrates the address allocator, the bridge device manager and the
//! firewall to implement the network lifecycle: create/delete network,
//! create/delete endpoint, join/leave a sandbox, and operational queries.
//! Every multi-step transition registers compensations on a rollback
//! stack, so a failure partway leaves no partial external state.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use parking_lot::{Mutex, RwLock};
use weft_common::{WeftError, WeftResult};
use weft_ipam::{Allocator, LOCAL_ADDRESS_SPACE};

use crate::bridge::{self, BridgeDevice};
use crate::config::{DriverConfig, JoinOptions, NetworkConfig};
use crate::driverapi::Driver;
use crate::endpoint::{
    EndpointInterface, EndpointOperInfo, EndpointSpec, EndpointView, InterfaceSink, MacAddr,
    NetworkSummary, StaticRoute,
};
use crate::exec::HostExec;
use crate::firewall::Firewall;
use crate::portmap::{PortBinding, TransportPort};
use crate::rollback::Rollback;
use crate::veth::VethPair;

/// Driver type name used for registration and views.
pub const DRIVER_TYPE: &str = "bridge";

struct EndpointState {
    mac: MacAddr,
    addr: Ipv4Net,
    addr_v6: Option<Ipv6Net>,
    host_ifname: String,
    container_ifname: String,
    exposed_ports: Vec<TransportPort>,
    port_bindings: Vec<PortBinding>,
    static_routes: Vec<StaticRoute>,
    sandbox_key: Option<String>,
    links: Vec<String>,
    ports_published: bool,
}

struct NetworkState {
    config: NetworkConfig,
    is_default: bool,
    subnet: Ipv4Net,
    gateway: Ipv4Addr,
    pool_id: String,
    subnet_v6: Option<Ipv6Net>,
    gateway_v6: Option<Ipv6Addr>,
    pool_id_v6: Option<String>,
    endpoints: Mutex<HashMap<String, EndpointState>>,
}

/// The bridge network driver.
pub struct BridgeDriver {
    config: DriverConfig,
    exec: Arc<dyn HostExec>,
    ipam: Arc<Allocator>,
    firewall: Firewall,
    networks: RwLock<HashMap<String, NetworkState>>,
}

impl BridgeDriver {
    /// Create a driver, enabling IP forwarding and setting up the
    /// firewall chains according to the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if host preparation fails.
    pub fn new(
        config: DriverConfig,
        exec: Arc<dyn HostExec>,
        ipam: Arc<Allocator>,
    ) -> WeftResult<Self> {
        let firewall = Firewall::new(Arc::clone(&exec));
        if config.enable_ip_forwarding {
            bridge::enable_ip_forwarding(exec.as_ref())?;
        }
        if config.enable_iptables {
            firewall.init_chains()?;
        }
        Ok(Self {
            config,
            exec,
            ipam,
            firewall,
            networks: RwLock::new(HashMap::new()),
        })
    }

    /// The driver-wide configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

#[async_trait]
impl Driver for BridgeDriver {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    async fn create_network(&self, id: &str, mut config: NetworkConfig) -> WeftResult<()> {
        if id.is_empty() {
            return Err(WeftError::Config {
                message: "network id must not be empty".to_string(),
            });
        }
        let mut networks = self.networks.write();
        if networks.contains_key(id) {
            return Err(WeftError::Conflict {
                message: format!("network {id} already exists"),
            });
        }
        if config.bridge_name.is_empty() {
            config.bridge_name = if config.default_bridge {
                self.config.default_bridge_name.clone()
            } else {
                format!("br-{}", short_id(id))
            };
        }
        if let Some((other_id, _)) = networks
            .iter()
            .find(|(_, n)| n.config.bridge_name == config.bridge_name)
        {
            return Err(WeftError::Forbidden {
                operation: format!(
                    "create network {id}: bridge {} already serves network {other_id}",
                    config.bridge_name
                ),
            });
        }
        let is_default =
            config.default_bridge || config.bridge_name == self.config.default_bridge_name;

        let mut rollback = Rollback::new();

        // Address pool, sized to the requested subnet (or any free block).
        let pool_hint = config.address_v4.map(|n| n.trunc().to_string());
        let sub_hint = config.fixed_cidr.map(|n| n.trunc().to_string());
        let pool = self.ipam.request_pool(
            LOCAL_ADDRESS_SPACE,
            pool_hint.as_deref(),
            sub_hint.as_deref(),
            false,
        )?;
        {
            let ipam = Arc::clone(&self.ipam);
            let pool_id = pool.id.clone();
            rollback.push(move || {
                if let Err(err) = ipam.release_pool(&pool_id) {
                    tracing::warn!(error = %err, "Failed to release pool during rollback");
                }
            });
        }
        let subnet = match pool.subnet {
            IpNet::V4(subnet) => subnet,
            IpNet::V6(_) => {
                return Err(WeftError::Internal {
                    message: "allocator returned an IPv6 pool for an IPv4 request".to_string(),
                });
            }
        };
        if config.address_v4.is_none() {
            config.address_v4 = Some(subnet);
        }
        config.validate()?;

        // The bridge address doubles as the default gateway: an explicit
        // gateway or a subnet hint with host bits pins it, otherwise the
        // lowest free address is used.
        let preferred_gw = config.default_gateway_v4.or_else(|| {
            config.address_v4.and_then(|n| {
                let addr = n.addr();
                (addr != n.network()).then_some(addr)
            })
        });
        let gateway = match self
            .ipam
            .request_address(&pool.id, preferred_gw.map(IpAddr::V4))?
        {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => {
                return Err(WeftError::Internal {
                    message: "allocator returned an IPv6 gateway for an IPv4 pool".to_string(),
                });
            }
        };
        {
            let ipam = Arc::clone(&self.ipam);
            let pool_id = pool.id.clone();
            rollback.push(move || {
                let _ = ipam.release_address(&pool_id, IpAddr::V4(gateway));
            });
        }

        let device = BridgeDevice::new(&config.bridge_name, Arc::clone(&self.exec));
        if config.default_bridge {
            if !device.exists() {
                return Err(WeftError::Config {
                    message: format!(
                        "externally managed bridge {} does not exist",
                        config.bridge_name
                    ),
                });
            }
            device.up()?;
        } else {
            let created = !device.exists();
            device.ensure()?;
            if created {
                let exec = Arc::clone(&self.exec);
                let name = config.bridge_name.clone();
                rollback.push(move || {
                    let device = BridgeDevice::new(&name, exec);
                    if let Err(err) = device.delete() {
                        tracing::warn!(error = %err, "Failed to delete bridge during rollback");
                    }
                });
            }
        }
        if config.mtu > 0 {
            device.set_mtu(config.mtu)?;
        }
        device.set_address(&format!("{gateway}/{}", subnet.prefix_len()))?;

        let mut subnet_v6 = None;
        let mut gateway_v6 = None;
        let mut pool_id_v6 = None;
        if config.enable_ipv6 {
            let hint = config
                .address_v6
                .map(|n| n.trunc().to_string())
                .ok_or_else(|| WeftError::Config {
                    message: "IPv6 networks require an explicit subnet".to_string(),
                })?;
            let sub6 = config.fixed_cidr_v6.map(|n| n.trunc().to_string());
            let pool6 =
                self.ipam
                    .request_pool(LOCAL_ADDRESS_SPACE, Some(&hint), sub6.as_deref(), true)?;
            {
                let ipam = Arc::clone(&self.ipam);
                let pool_id = pool6.id.clone();
                rollback.push(move || {
                    if let Err(err) = ipam.release_pool(&pool_id) {
                        tracing::warn!(error = %err, "Failed to release v6 pool during rollback");
                    }
                });
            }
            let net6 = match pool6.subnet {
                IpNet::V6(net6) => net6,
                IpNet::V4(_) => {
                    return Err(WeftError::Internal {
                        message: "allocator returned an IPv4 pool for an IPv6 request".to_string(),
                    });
                }
            };
            let gw6 = match self
                .ipam
                .request_address(&pool6.id, config.default_gateway_v6.map(IpAddr::V6))?
            {
                IpAddr::V6(ip) => ip,
                IpAddr::V4(_) => {
                    return Err(WeftError::Internal {
                        message: "allocator returned an IPv4 gateway for an IPv6 pool".to_string(),
                    });
                }
            };
            {
                let ipam = Arc::clone(&self.ipam);
                let pool_id = pool6.id.clone();
                rollback.push(move || {
                    let _ = ipam.release_address(&pool_id, IpAddr::V6(gw6));
                });
            }
            device.set_address_v6(&format!("{gw6}/{}", net6.prefix_len()))?;
            if self.config.enable_ip_forwarding {
                bridge::enable_ipv6_forwarding(self.exec.as_ref())?;
            }
            subnet_v6 = Some(net6);
            gateway_v6 = Some(gw6);
            pool_id_v6 = Some(pool6.id);
        }

        // Isolation must be complete before this call returns, so a later
        // endpoint is never briefly reachable across networks.
        if self.config.enable_iptables {
            let subnet_net = IpNet::V4(subnet);
            self.firewall.add_network_rules(
                &config.bridge_name,
                &subnet_net,
                config.enable_icc,
                config.enable_ip_masquerade,
            )?;
            {
                let fw = self.firewall.clone();
                let bridge_name = config.bridge_name.clone();
                let icc = config.enable_icc;
                let masq = config.enable_ip_masquerade;
                rollback.push(move || {
                    fw.remove_network_rules(&bridge_name, &IpNet::V4(subnet), icc, masq);
                });
            }
            for peer in networks.values() {
                let peer_subnet = IpNet::V4(peer.subnet);
                self.firewall.add_isolation(&subnet_net, &peer_subnet)?;
                let fw = self.firewall.clone();
                rollback.push(move || fw.remove_isolation(&IpNet::V4(subnet), &peer_subnet));
            }
        }

        let bridge_name = config.bridge_name.clone();
        networks.insert(
            id.to_string(),
            NetworkState {
                config,
                is_default,
                subnet,
                gateway,
                pool_id: pool.id,
                subnet_v6,
                gateway_v6,
                pool_id_v6,
                endpoints: Mutex::new(HashMap::new()),
            },
        );
        rollback.disarm();
        tracing::info!(network = id, bridge = %bridge_name, subnet = %subnet, "Network created");
        Ok(())
    }

    async fn delete_network(&self, id: &str) -> WeftResult<()> {
        let mut networks = self.networks.write();
        {
            let net = networks.get(id).ok_or_else(|| WeftError::NetworkNotFound {
                id: id.to_string(),
            })?;
            if net.is_default {
                return Err(WeftError::Forbidden {
                    operation: format!("delete the default network {id}"),
                });
            }
            if !net.endpoints.lock().is_empty() {
                return Err(WeftError::Conflict {
                    message: format!("network {id} has active endpoints"),
                });
            }
        }
        let net = networks.remove(id).ok_or_else(|| WeftError::NetworkNotFound {
            id: id.to_string(),
        })?;

        let mut first_err = None;
        if self.config.enable_iptables {
            let subnet_net = IpNet::V4(net.subnet);
            for peer in networks.values() {
                self.firewall
                    .remove_isolation(&subnet_net, &IpNet::V4(peer.subnet));
            }
            self.firewall.remove_network_rules(
                &net.config.bridge_name,
                &subnet_net,
                net.config.enable_icc,
                net.config.enable_ip_masquerade,
            );
        }

        if let (Some(pool6), Some(gw6)) = (&net.pool_id_v6, net.gateway_v6) {
            record_err(
                &mut first_err,
                self.ipam.release_address(pool6, IpAddr::V6(gw6)),
            );
            record_err(&mut first_err, self.ipam.release_pool(pool6));
        }
        record_err(
            &mut first_err,
            self.ipam
                .release_address(&net.pool_id, IpAddr::V4(net.gateway)),
        );
        record_err(&mut first_err, self.ipam.release_pool(&net.pool_id));

        if !net.config.default_bridge {
            let device = BridgeDevice::new(&net.config.bridge_name, Arc::clone(&self.exec));
            record_err(&mut first_err, device.delete());
        }

        tracing::info!(network = id, "Network deleted");
        first_err.map_or(Ok(()), Err)
    }

    async fn create_endpoint(
        &self,
        network_id: &str,
        endpoint_id: &str,
        spec: EndpointSpec,
    ) -> WeftResult<EndpointInterface> {
        if endpoint_id.is_empty() {
            return Err(WeftError::Config {
                message: "endpoint id must not be empty".to_string(),
            });
        }
        let networks = self.networks.read();
        let net = networks
            .get(network_id)
            .ok_or_else(|| WeftError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let mut endpoints = net.endpoints.lock();
        if endpoints.contains_key(endpoint_id) {
            return Err(WeftError::Conflict {
                message: format!("endpoint {endpoint_id} already exists on network {network_id}"),
            });
        }
        if let Some(mac) = spec.mac {
            if endpoints.values().any(|ep| ep.mac == mac) {
                return Err(WeftError::Conflict {
                    message: format!("MAC address {mac} is already in use on network {network_id}"),
                });
            }
        }

        let mut rollback = Rollback::new();
        let addr = match self
            .ipam
            .request_address(&net.pool_id, spec.address.map(IpAddr::V4))?
        {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => {
                return Err(WeftError::Internal {
                    message: "allocator returned an IPv6 address for an IPv4 pool".to_string(),
                });
            }
        };
        {
            let ipam = Arc::clone(&self.ipam);
            let pool_id = net.pool_id.clone();
            rollback.push(move || {
                let _ = ipam.release_address(&pool_id, IpAddr::V4(addr));
            });
        }

        let addr_v6 = match (&net.pool_id_v6, net.subnet_v6) {
            (Some(pool6), Some(net6)) => {
                let ip6 = match self
                    .ipam
                    .request_address(pool6, spec.address_v6.map(IpAddr::V6))?
                {
                    IpAddr::V6(ip) => ip,
                    IpAddr::V4(_) => {
                        return Err(WeftError::Internal {
                            message: "allocator returned an IPv4 address for an IPv6 pool"
                                .to_string(),
                        });
                    }
                };
                {
                    let ipam = Arc::clone(&self.ipam);
                    let pool_id = pool6.clone();
                    rollback.push(move || {
                        let _ = ipam.release_address(&pool_id, IpAddr::V6(ip6));
                    });
                }
                Some(
                    Ipv6Net::new(ip6, net6.prefix_len()).map_err(|e| WeftError::Internal {
                        message: format!("invalid IPv6 prefix length: {e}"),
                    })?,
                )
            }
            _ => None,
        };

        let mac = spec.mac.unwrap_or_else(|| MacAddr::from_ipv4(addr));
        let short = short_id(endpoint_id);
        let host_ifname = format!("veth{short}");
        let container_ifname = format!("veth{short}c");
        let address =
            Ipv4Net::new(addr, net.subnet.prefix_len()).map_err(|e| WeftError::Internal {
                message: format!("invalid IPv4 prefix length: {e}"),
            })?;

        endpoints.insert(
            endpoint_id.to_string(),
            EndpointState {
                mac,
                addr: address,
                addr_v6,
                host_ifname: host_ifname.clone(),
                container_ifname: container_ifname.clone(),
                exposed_ports: spec.exposed_ports,
                port_bindings: spec.port_bindings,
                static_routes: spec.static_routes,
                sandbox_key: None,
                links: Vec::new(),
                ports_published: false,
            },
        );
        rollback.disarm();
        tracing::info!(
            network = network_id,
            endpoint = endpoint_id,
            address = %address,
            "Endpoint created"
        );
        Ok(EndpointInterface {
            mac,
            address,
            address_v6: addr_v6,
            host_ifname,
            container_ifname,
        })
    }

    async fn delete_endpoint(&self, network_id: &str, endpoint_id: &str) -> WeftResult<()> {
        let networks = self.networks.read();
        let net = networks
            .get(network_id)
            .ok_or_else(|| WeftError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let mut endpoints = net.endpoints.lock();
        {
            let ep = endpoints
                .get(endpoint_id)
                .ok_or_else(|| WeftError::EndpointNotFound {
                    id: endpoint_id.to_string(),
                })?;
            if ep.sandbox_key.is_some() {
                return Err(WeftError::Conflict {
                    message: format!("endpoint {endpoint_id} is joined to a sandbox"),
                });
            }
        }
        let ep = endpoints
            .remove(endpoint_id)
            .ok_or_else(|| WeftError::EndpointNotFound {
                id: endpoint_id.to_string(),
            })?;

        if ep.ports_published {
            self.firewall.release_ports(
                IpAddr::V4(ep.addr.addr()),
                &ep.port_bindings,
                self.config.enable_userland_proxy,
            );
        }

        let mut first_err = None;
        record_err(
            &mut first_err,
            self.ipam
                .release_address(&net.pool_id, IpAddr::V4(ep.addr.addr())),
        );
        if let (Some(pool6), Some(a6)) = (&net.pool_id_v6, ep.addr_v6) {
            record_err(
                &mut first_err,
                self.ipam.release_address(pool6, IpAddr::V6(a6.addr())),
            );
        }
        tracing::info!(network = network_id, endpoint = endpoint_id, "Endpoint deleted");
        first_err.map_or(Ok(()), Err)
    }

    async fn join(
        &self,
        network_id: &str,
        endpoint_id: &str,
        sandbox_key: &str,
        sink: &mut dyn InterfaceSink,
        options: JoinOptions,
    ) -> WeftResult<()> {
        let networks = self.networks.read();
        let net = networks
            .get(network_id)
            .ok_or_else(|| WeftError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let mut endpoints = net.endpoints.lock();

        let (addr, mac, host_ifname, container_ifname, bindings, routes) = {
            let ep = endpoints
                .get(endpoint_id)
                .ok_or_else(|| WeftError::EndpointNotFound {
                    id: endpoint_id.to_string(),
                })?;
            if ep.sandbox_key.is_some() {
                return Err(WeftError::Forbidden {
                    operation: format!("join endpoint {endpoint_id}: already joined"),
                });
            }
            (
                ep.addr,
                ep.mac,
                ep.host_ifname.clone(),
                ep.container_ifname.clone(),
                ep.port_bindings.clone(),
                ep.static_routes.clone(),
            )
        };

        let mut rollback = Rollback::new();

        let veth = VethPair::create(Arc::clone(&self.exec), &host_ifname, &container_ifname)?;
        {
            let exec = Arc::clone(&self.exec);
            let host = host_ifname.clone();
            let container = container_ifname.clone();
            rollback.push(move || {
                let pair = VethPair::from_existing(exec, &host, &container);
                if let Err(err) = pair.delete() {
                    tracing::warn!(error = %err, "Failed to delete veth during rollback");
                }
            });
        }
        if net.config.mtu > 0 {
            veth.set_mtu(net.config.mtu)?;
        }
        veth.set_container_mac(mac)?;
        let device = BridgeDevice::new(&net.config.bridge_name, Arc::clone(&self.exec));
        device.enslave(&host_ifname)?;
        if !sandbox_key.is_empty() {
            veth.move_to_sandbox(sandbox_key)?;
        }

        sink.set_names(&container_ifname, "eth")?;
        for route in &routes {
            sink.add_static_route(route)?;
        }
        sink.set_gateway(IpAddr::V4(net.gateway))?;
        if let Some(gw6) = net.gateway_v6 {
            sink.set_gateway_v6(IpAddr::V6(gw6))?;
        }

        // Link-scoped exposed-port exceptions. An unresolvable child
        // aborts the join; the rollback stack removes rules already
        // inserted for it.
        let parent_ip = IpAddr::V4(addr.addr());
        let mut resolved_links = Vec::with_capacity(options.links.len());
        for child_name in &options.links {
            let child =
                endpoints
                    .get(child_name)
                    .ok_or_else(|| WeftError::EndpointNotFound {
                        id: child_name.clone(),
                    })?;
            if self.config.enable_iptables && !net.config.enable_icc {
                let child_ip = IpAddr::V4(child.addr.addr());
                self.firewall
                    .add_link(parent_ip, child_ip, &child.exposed_ports)?;
                let fw = self.firewall.clone();
                let ports = child.exposed_ports.clone();
                rollback.push(move || fw.remove_link(parent_ip, child_ip, &ports));
            }
            resolved_links.push(child_name.clone());
        }

        let published = !bindings.is_empty() && self.config.enable_iptables;
        if published {
            self.firewall.publish_ports(
                parent_ip,
                &bindings,
                self.config.enable_userland_proxy,
            )?;
            let fw = self.firewall.clone();
            let proxy = self.config.enable_userland_proxy;
            let bindings = bindings.clone();
            rollback.push(move || fw.release_ports(parent_ip, &bindings, proxy));
        }

        let ep = endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| WeftError::EndpointNotFound {
                id: endpoint_id.to_string(),
            })?;
        ep.sandbox_key = Some(sandbox_key.to_string());
        ep.links = resolved_links;
        ep.ports_published = published;
        rollback.disarm();
        tracing::info!(
            network = network_id,
            endpoint = endpoint_id,
            sandbox_key,
            "Endpoint joined"
        );
        Ok(())
    }

    async fn leave(&self, network_id: &str, endpoint_id: &str) -> WeftResult<()> {
        let networks = self.networks.read();
        let net = networks
            .get(network_id)
            .ok_or_else(|| WeftError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let mut endpoints = net.endpoints.lock();

        let (addr, links, host_ifname, container_ifname) = {
            let ep = endpoints
                .get(endpoint_id)
                .ok_or_else(|| WeftError::EndpointNotFound {
                    id: endpoint_id.to_string(),
                })?;
            if ep.sandbox_key.is_none() {
                return Err(WeftError::Forbidden {
                    operation: format!("leave endpoint {endpoint_id}: not joined"),
                });
            }
            (
                ep.addr,
                ep.links.clone(),
                ep.host_ifname.clone(),
                ep.container_ifname.clone(),
            )
        };

        if self.config.enable_iptables && !net.config.enable_icc {
            let parent_ip = IpAddr::V4(addr.addr());
            for child_name in &links {
                if let Some(child) = endpoints.get(child_name) {
                    self.firewall.remove_link(
                        parent_ip,
                        IpAddr::V4(child.addr.addr()),
                        &child.exposed_ports,
                    );
                }
            }
        }

        let veth = VethPair::from_existing(Arc::clone(&self.exec), &host_ifname, &container_ifname);
        if let Err(err) = veth.delete() {
            tracing::warn!(error = %err, "Failed to delete veth pair on leave");
        }

        let ep = endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| WeftError::EndpointNotFound {
                id: endpoint_id.to_string(),
            })?;
        ep.sandbox_key = None;
        ep.links.clear();
        tracing::info!(network = network_id, endpoint = endpoint_id, "Endpoint left");
        Ok(())
    }

    async fn endpoint_oper_info(
        &self,
        network_id: &str,
        endpoint_id: &str,
    ) -> WeftResult<EndpointOperInfo> {
        let networks = self.networks.read();
        let net = networks
            .get(network_id)
            .ok_or_else(|| WeftError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let endpoints = net.endpoints.lock();
        let ep = endpoints
            .get(endpoint_id)
            .ok_or_else(|| WeftError::EndpointNotFound {
                id: endpoint_id.to_string(),
            })?;
        Ok(EndpointOperInfo {
            mac: ep.mac.to_string(),
            address: ep.addr.to_string(),
            address_v6: ep.addr_v6.map(|a| a.to_string()),
            sandbox_key: ep.sandbox_key.clone(),
            exposed_ports: ep.exposed_ports.clone(),
            port_bindings: ep.port_bindings.clone(),
        })
    }

    async fn network_summary(&self, network_id: &str) -> WeftResult<NetworkSummary> {
        let networks = self.networks.read();
        let net = networks
            .get(network_id)
            .ok_or_else(|| WeftError::NetworkNotFound {
                id: network_id.to_string(),
            })?;
        let endpoints = net.endpoints.lock();
        let containers = endpoints
            .iter()
            .filter(|(_, ep)| ep.sandbox_key.is_some())
            .map(|(id, ep)| {
                (
                    id.clone(),
                    EndpointView {
                        mac: ep.mac.to_string(),
                        ipv4: ep.addr.addr().to_string(),
                        ipv6: ep.addr_v6.map(|a| a.addr().to_string()),
                    },
                )
            })
            .collect();
        Ok(NetworkSummary {
            name: net.config.name.clone(),
            id: network_id.to_string(),
            driver: DRIVER_TYPE.to_string(),
            containers,
        })
    }
}

fn record_err(slot: &mut Option<WeftError>, result: WeftResult<()>) {
    if let Err(err) = result {
        tracing::warn!(error = %err, "Teardown step failed");
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

/// First seven characters of an id, for interface names that must fit in
/// IFNAMSIZ.
fn short_id(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids() {
        assert_eq!(short_id("ep1"), "ep1");
        assert_eq!(short_id("0123456789ab"), "0123456");
    }
}
