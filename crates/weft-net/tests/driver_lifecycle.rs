//! Lifecycle tests for the bridge driver against the in-memory host.

use std::sync::Arc;

use ipnet::Ipv4Net;
use weft_common::WeftError;
use weft_ipam::Allocator;
use weft_net::{
    BridgeDriver, Driver, DriverConfig, EndpointSpec, InterfaceRecord, JoinOptions, MacAddr,
    MemoryExec, NetworkConfig, PortBinding, Protocol, StaticRoute, TransportPort,
};

fn driver() -> (BridgeDriver, MemoryExec) {
    let exec = MemoryExec::new();
    let driver = BridgeDriver::new(
        DriverConfig::default(),
        Arc::new(exec.clone()),
        Arc::new(Allocator::new()),
    )
    .unwrap();
    (driver, exec)
}

fn config_with_subnet(subnet: &str) -> NetworkConfig {
    NetworkConfig {
        address_v4: Some(subnet.parse().unwrap()),
        ..NetworkConfig::named("test")
    }
}

fn forward_matches(exec: &MemoryExec, subnet: &str) -> usize {
    exec.rules()
        .iter()
        .filter(|r| r.starts_with("FORWARD") && r.contains(subnet))
        .count()
}

fn rules_matching(exec: &MemoryExec, needle: &str) -> usize {
    exec.rules().iter().filter(|r| r.contains(needle)).count()
}

#[test_log::test(tokio::test)]
async fn isolation_rule_counts_track_live_networks() {
    let (driver, exec) = driver();
    let subnets = [
        "172.20.0.0/16",
        "172.21.0.0/16",
        "172.22.0.0/16",
        "172.23.0.0/16",
    ];

    for (i, subnet) in subnets.iter().take(3).enumerate() {
        driver
            .create_network(&format!("net{i}"), config_with_subnet(subnet))
            .await
            .unwrap();
    }
    // Three live networks: each subnet appears in 2 x (3 - 1) rules.
    for subnet in &subnets[..3] {
        assert_eq!(forward_matches(&exec, subnet), 4);
    }

    driver
        .create_network("net3", config_with_subnet(subnets[3]))
        .await
        .unwrap();
    for subnet in &subnets {
        assert_eq!(forward_matches(&exec, subnet), 6);
    }

    driver.delete_network("net0").await.unwrap();
    for subnet in &subnets[1..] {
        assert_eq!(forward_matches(&exec, subnet), 4);
    }

    driver.delete_network("net1").await.unwrap();
    assert_eq!(forward_matches(&exec, subnets[2]), 2);
    assert_eq!(forward_matches(&exec, subnets[3]), 2);

    driver.delete_network("net2").await.unwrap();
    assert_eq!(forward_matches(&exec, subnets[3]), 0);
    driver.delete_network("net3").await.unwrap();
}

#[tokio::test]
async fn default_bridge_name_is_protected() {
    let (driver, _exec) = driver();

    let mut config = config_with_subnet("172.20.0.0/16");
    config.bridge_name = "weft0".to_string();
    driver.create_network("default", config).await.unwrap();

    let mut dup = config_with_subnet("172.21.0.0/16");
    dup.bridge_name = "weft0".to_string();
    let err = driver.create_network("second", dup).await.unwrap_err();
    assert!(matches!(err, WeftError::Forbidden { .. }));

    let err = driver.delete_network("default").await.unwrap_err();
    assert!(matches!(err, WeftError::Forbidden { .. }));
}

#[tokio::test]
async fn externally_managed_bridge_must_exist() {
    let (driver, exec) = driver();

    let mut config = config_with_subnet("172.20.0.0/16");
    config.default_bridge = true;
    assert!(driver.create_network("ext", config.clone()).await.is_err());

    // With the device pre-existing the same creation succeeds, so the
    // failed attempt released its address pool.
    exec.add_link("weft0");
    driver.create_network("ext", config).await.unwrap();
    assert!(exec.has_link("weft0"));
}

#[tokio::test]
async fn gateway_outside_fixed_cidr_is_accepted() {
    let (driver, _exec) = driver();

    let mut config = config_with_subnet("172.16.0.10/16");
    config.fixed_cidr = Some("172.16.122.0/24".parse().unwrap());
    config.default_gateway_v4 = Some("172.16.0.1".parse().unwrap());
    driver.create_network("full", config).await.unwrap();

    // Endpoint addresses stay inside the fixed sub-CIDR.
    let fixed: Ipv4Net = "172.16.122.0/24".parse().unwrap();
    let iface = driver
        .create_endpoint("full", "ep1", EndpointSpec::default())
        .await
        .unwrap();
    assert!(fixed.contains(&iface.address.addr()));

    // The relaxed gateway is the one handed to the sandbox.
    let mut sink = InterfaceRecord::default();
    driver
        .join("full", "ep1", "sb1", &mut sink, JoinOptions::default())
        .await
        .unwrap();
    assert_eq!(sink.gateway, Some("172.16.0.1".parse().unwrap()));
}

#[tokio::test]
async fn join_rolls_back_on_unresolvable_link() {
    let (driver, exec) = driver();

    let mut config = config_with_subnet("172.17.0.0/16");
    config.enable_icc = false;
    driver.create_network("net1", config).await.unwrap();

    let exposed = vec![
        TransportPort::new(Protocol::Tcp, 5000),
        TransportPort::new(Protocol::Udp, 400),
        TransportPort::new(Protocol::Tcp, 600),
    ];
    driver
        .create_endpoint(
            "net1",
            "ep1",
            EndpointSpec {
                exposed_ports: exposed.clone(),
                ..EndpointSpec::default()
            },
        )
        .await
        .unwrap();
    driver
        .create_endpoint("net1", "ep2", EndpointSpec::default())
        .await
        .unwrap();

    // A valid link opens one dport and one sport rule per exposed port.
    let mut sink = InterfaceRecord::default();
    driver
        .join(
            "net1",
            "ep2",
            "",
            &mut sink,
            JoinOptions {
                links: vec!["ep1".to_string()],
            },
        )
        .await
        .unwrap();
    for port in &exposed {
        assert_eq!(rules_matching(&exec, &format!("--dport {}", port.port)), 1);
        assert_eq!(rules_matching(&exec, &format!("--sport {}", port.port)), 1);
    }

    // Leave removes exactly those rules.
    driver.leave("net1", "ep2").await.unwrap();
    for port in &exposed {
        assert_eq!(rules_matching(&exec, &format!("--dport {}", port.port)), 0);
        assert_eq!(rules_matching(&exec, &format!("--sport {}", port.port)), 0);
    }

    // One valid and one nonexistent child: the join fails and the rules
    // inserted for the valid child are rolled back.
    let mut sink = InterfaceRecord::default();
    let err = driver
        .join(
            "net1",
            "ep2",
            "",
            &mut sink,
            JoinOptions {
                links: vec!["ep1".to_string(), "ep4".to_string()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WeftError::EndpointNotFound { .. }));
    for port in &exposed {
        assert_eq!(rules_matching(&exec, &format!("--dport {}", port.port)), 0);
        assert_eq!(rules_matching(&exec, &format!("--sport {}", port.port)), 0);
    }
}

#[tokio::test]
async fn lifecycle_containment() {
    let (driver, _exec) = driver();
    driver
        .create_network("net1", config_with_subnet("10.40.0.0/24"))
        .await
        .unwrap();
    let route = StaticRoute {
        destination: "10.99.0.0/16".parse().unwrap(),
        next_hop: Some("10.40.0.1".parse().unwrap()),
    };
    driver
        .create_endpoint(
            "net1",
            "ep1",
            EndpointSpec {
                static_routes: vec![route.clone()],
                ..EndpointSpec::default()
            },
        )
        .await
        .unwrap();

    let err = driver.delete_network("net1").await.unwrap_err();
    assert!(matches!(err, WeftError::Conflict { .. }));

    let mut sink = InterfaceRecord::default();
    driver
        .join(
            "net1",
            "ep1",
            "/var/run/netns/sb1",
            &mut sink,
            JoinOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(sink.gateway, Some("10.40.0.1".parse().unwrap()));
    assert_eq!(sink.src_name.as_deref(), Some("vethep1c"));
    assert_eq!(sink.dst_prefix.as_deref(), Some("eth"));
    assert_eq!(sink.routes, vec![route]);

    let err = driver.delete_endpoint("net1", "ep1").await.unwrap_err();
    assert!(matches!(err, WeftError::Conflict { .. }));

    let mut sink2 = InterfaceRecord::default();
    let err = driver
        .join("net1", "ep1", "sb2", &mut sink2, JoinOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WeftError::Forbidden { .. }));

    driver.leave("net1", "ep1").await.unwrap();

    // ep1 still holds 10.40.0.2, so the next endpoint gets .3; the
    // address is re-leasable only after the endpoint is deleted.
    let ep2 = driver
        .create_endpoint("net1", "ep2", EndpointSpec::default())
        .await
        .unwrap();
    assert_eq!(ep2.address.addr().to_string(), "10.40.0.3");

    driver.delete_endpoint("net1", "ep1").await.unwrap();
    let ep3 = driver
        .create_endpoint("net1", "ep3", EndpointSpec::default())
        .await
        .unwrap();
    assert_eq!(ep3.address.addr().to_string(), "10.40.0.2");
}

#[tokio::test]
async fn oper_info_reports_published_bindings() {
    let (driver, exec) = driver();
    driver
        .create_network("net1", config_with_subnet("10.41.0.0/24"))
        .await
        .unwrap();

    let bindings = vec![PortBinding::tcp(23000, 230), PortBinding::udp(22000, 200)];
    driver
        .create_endpoint(
            "net1",
            "ep1",
            EndpointSpec {
                port_bindings: bindings.clone(),
                ..EndpointSpec::default()
            },
        )
        .await
        .unwrap();

    // Unjoined endpoints stay out of the network summary.
    let summary = driver.network_summary("net1").await.unwrap();
    assert!(summary.containers.is_empty());

    let mut sink = InterfaceRecord::default();
    driver
        .join("net1", "ep1", "sb1", &mut sink, JoinOptions::default())
        .await
        .unwrap();

    let info = driver.endpoint_oper_info("net1", "ep1").await.unwrap();
    assert_eq!(info.port_bindings, bindings);
    assert_eq!(info.sandbox_key.as_deref(), Some("sb1"));
    assert!(
        exec.rules()
            .iter()
            .any(|r| r.contains("DNAT") && r.contains("10.41.0.2:230"))
    );

    let summary = driver.network_summary("net1").await.unwrap();
    assert_eq!(summary.containers.len(), 1);
    assert_eq!(summary.containers["ep1"].ipv4, "10.41.0.2");
    assert_eq!(summary.driver, "bridge");

    // Published rules survive leave and are removed with the endpoint.
    driver.leave("net1", "ep1").await.unwrap();
    assert!(exec.rules().iter().any(|r| r.contains("DNAT")));
    driver.delete_endpoint("net1", "ep1").await.unwrap();
    assert!(!exec.rules().iter().any(|r| r.contains("DNAT")));
}

#[tokio::test]
async fn endpoint_mac_options() {
    let (driver, exec) = driver();
    driver
        .create_network("net1", config_with_subnet("10.42.0.0/24"))
        .await
        .unwrap();

    let mac: MacAddr = "1e:67:66:44:55:66".parse().unwrap();
    let iface = driver
        .create_endpoint(
            "net1",
            "ep1",
            EndpointSpec {
                mac: Some(mac),
                ..EndpointSpec::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(iface.mac, mac);

    let err = driver
        .create_endpoint(
            "net1",
            "ep2",
            EndpointSpec {
                mac: Some(mac),
                ..EndpointSpec::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WeftError::Conflict { .. }));

    // Without a request the MAC is derived from the IPv4 address.
    let derived = driver
        .create_endpoint("net1", "ep3", EndpointSpec::default())
        .await
        .unwrap();
    assert_eq!(derived.mac.octets()[..2], [0x02, 0x42]);

    // An explicit address is honored; a duplicate one is refused.
    let pinned = driver
        .create_endpoint(
            "net1",
            "ep4",
            EndpointSpec {
                address: Some("10.42.0.99".parse().unwrap()),
                ..EndpointSpec::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(pinned.address.addr().to_string(), "10.42.0.99");
    let err = driver
        .create_endpoint(
            "net1",
            "ep5",
            EndpointSpec {
                address: Some("10.42.0.99".parse().unwrap()),
                ..EndpointSpec::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WeftError::Conflict { .. }));

    // Join programs the requested MAC onto the container-side device.
    let mut sink = InterfaceRecord::default();
    driver
        .join("net1", "ep1", "sb1", &mut sink, JoinOptions::default())
        .await
        .unwrap();
    assert!(
        exec.history()
            .iter()
            .any(|line| line.contains("vethep1c address 1e:67:66:44:55:66"))
    );
}

#[test_log::test(tokio::test)]
async fn failed_create_leaves_no_state() {
    let (driver, exec) = driver();
    driver
        .create_network("net1", config_with_subnet("172.20.0.0/16"))
        .await
        .unwrap();

    // The isolation pair for the new network fails to insert.
    exec.fail_matching("-s 172.21.0.0/16 -d 172.20.0.0/16");
    let err = driver
        .create_network("net2", config_with_subnet("172.21.0.0/16"))
        .await
        .unwrap_err();
    assert!(matches!(err, WeftError::Internal { .. }));

    // No rule, device or registry entry survives the failure.
    assert!(
        exec.rules()
            .iter()
            .all(|r| !r.contains("172.21.0.0/16"))
    );
    assert!(!exec.has_link("br-net2"));
    assert!(driver.network_summary("net2").await.is_err());

    // The survivor is untouched.
    assert_eq!(forward_matches(&exec, "172.20.0.0/16"), 0);
    assert!(exec.has_link("br-net1"));
}

#[tokio::test]
async fn ipv6_networks_assign_dual_stack_addresses() {
    let (driver, _exec) = driver();

    let mut config = config_with_subnet("10.43.0.0/24");
    config.enable_ipv6 = true;
    config.address_v6 = Some("fd00:43::/64".parse().unwrap());
    driver.create_network("net1", config).await.unwrap();

    let iface = driver
        .create_endpoint("net1", "ep1", EndpointSpec::default())
        .await
        .unwrap();
    let v6 = iface.address_v6.unwrap();
    assert_eq!(v6.addr().to_string(), "fd00:43::2");

    let mut sink = InterfaceRecord::default();
    driver
        .join("net1", "ep1", "sb1", &mut sink, JoinOptions::default())
        .await
        .unwrap();
    assert_eq!(sink.gateway_v6, Some("fd00:43::1".parse().unwrap()));
}
