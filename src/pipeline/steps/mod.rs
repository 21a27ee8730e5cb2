// ABOUTME: Concrete steps of the blue-green swap.
// ABOUTME: Two waits on the new group, then termination of the inactive group.

mod terminate_inactive;
mod wait_healthy;
mod wait_targeted;

pub use terminate_inactive::TerminateInactiveInstances;
pub use wait_healthy::WaitUntilNewInstancesAreHealthy;
pub use wait_targeted::{TargetingSnapshot, WaitUntilNewInstancesAreTargeted};

use crate::gateway::Instance;

/// `i-1 (Unhealthy/Pending), i-2 (Healthy/Pending)`
fn describe_instances(instances: &[&Instance]) -> String {
    instances
        .iter()
        .map(|i| format!("{} ({}/{})", i.id, i.health_status, i.lifecycle_state))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_ids<'a, T: std::fmt::Display + 'a>(ids: impl IntoIterator<Item = &'a T>) -> String {
    ids.into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
