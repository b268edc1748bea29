//! # weft-net
//!
//! Bridge networking for Weft containers.
//!
//! This crate implements the bridge network driver and the pieces it
//! orchestrates: the bridge device manager, veth pairs, the firewall rule
//! manager, port publishing, and the controller/registry boundary that
//! dispatches lifecycle calls by driver name.

#![warn(missing_docs)]

pub mod bridge;
pub mod config;
pub mod controller;
pub mod driver;
pub mod driverapi;
pub mod endpoint;
pub mod exec;
pub mod firewall;
pub mod portmap;
pub mod veth;

mod rollback;

pub use bridge::BridgeDevice;
pub use config::{DriverConfig, JoinOptions, NetworkConfig};
pub use controller::{Controller, ControllerConfig};
pub use driver::{BridgeDriver, DRIVER_TYPE};
pub use driverapi::Driver;
pub use endpoint::{
    EndpointInterface, EndpointOperInfo, EndpointSpec, EndpointView, InterfaceRecord,
    InterfaceSink, MacAddr, NetworkSummary, StaticRoute,
};
pub use exec::{HostExec, MemoryExec, SystemExec};
pub use firewall::{Firewall, WEFT_CHAIN};
pub use portmap::{PortBinding, Protocol, TransportPort};
pub use veth::VethPair;
