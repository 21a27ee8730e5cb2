// ABOUTME: Resource gateway contract consumed by the pipeline steps.
// ABOUTME: Exports the trait, snapshot model, and the HTTP and in-memory implementations.

mod error;
mod http;
mod memory;
mod model;

pub use error::{GatewayError, ResourceKind};
pub use http::{Endpoint, HttpGateway, TransportError};
pub use memory::{Fixture, GatewayCall, MemoryGateway};
pub use model::{
    ComputeGroup, HealthStatus, Instance, LifecycleState, LoadBalancer, Target, TargetGroup,
    TargetStatus,
};

use async_trait::async_trait;
use nonempty::NonEmpty;

use crate::types::{InstanceId, ResourceName};

/// Read and mutate access to compute groups, instances, target groups and
/// load balancers.
///
/// Every call hits the provider; implementations must not cache, since the
/// steps rely on each poll tick seeing fresh state.
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    async fn get_compute_group(&self, name: &ResourceName) -> Result<ComputeGroup, GatewayError>;

    async fn get_target_group(&self, name: &ResourceName) -> Result<TargetGroup, GatewayError>;

    async fn get_load_balancer(&self, name: &ResourceName) -> Result<LoadBalancer, GatewayError>;

    /// Ask the provider to terminate the given instances. Returns once the
    /// request is accepted, not when the instances are gone.
    async fn terminate_instances(&self, ids: &NonEmpty<InstanceId>) -> Result<(), GatewayError>;

    async fn get_instance(&self, id: &InstanceId) -> Result<Instance, GatewayError>;
}
