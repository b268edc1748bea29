//! The driver capability contract.
//!
//! Network drivers implement [`Driver`] and are registered by name in the
//! controller. The controller dispatches every lifecycle call through
//! this trait, so alternative drivers plug into the same lifecycle.

use async_trait::async_trait;
use weft_common::WeftResult;

use crate::config::{JoinOptions, NetworkConfig};
use crate::endpoint::{
    EndpointInterface, EndpointOperInfo, EndpointSpec, InterfaceSink, NetworkSummary,
};

/// Capability contract every network driver satisfies.
#[async_trait]
pub trait Driver: Send + Sync {
    /// The driver type name used for registration and views.
    fn driver_type(&self) -> &'static str;

    /// Create a network under the given id.
    async fn create_network(&self, id: &str, config: NetworkConfig) -> WeftResult<()>;

    /// Delete a network; fails while endpoints remain.
    async fn delete_network(&self, id: &str) -> WeftResult<()>;

    /// Create an endpoint on a network, assigning address and MAC only.
    async fn create_endpoint(
        &self,
        network_id: &str,
        endpoint_id: &str,
        spec: EndpointSpec,
    ) -> WeftResult<EndpointInterface>;

    /// Delete an endpoint; fails while it is joined to a sandbox.
    async fn delete_endpoint(&self, network_id: &str, endpoint_id: &str) -> WeftResult<()>;

    /// Join an endpoint to a sandbox, materializing its device and rules.
    async fn join(
        &self,
        network_id: &str,
        endpoint_id: &str,
        sandbox_key: &str,
        sink: &mut dyn InterfaceSink,
        options: JoinOptions,
    ) -> WeftResult<()>;

    /// Detach an endpoint from its sandbox, inverting the join.
    async fn leave(&self, network_id: &str, endpoint_id: &str) -> WeftResult<()>;

    /// Operational snapshot of one endpoint.
    async fn endpoint_oper_info(
        &self,
        network_id: &str,
        endpoint_id: &str,
    ) -> WeftResult<EndpointOperInfo>;

    /// Upward-facing summary of one network and its joined endpoints.
    async fn network_summary(&self, network_id: &str) -> WeftResult<NetworkSummary>;
}
