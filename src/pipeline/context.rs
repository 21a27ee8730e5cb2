// ABOUTME: Immutable description of the one blue-green swap a run performs.
// ABOUTME: Names the inactive and new compute groups, their target groups, and the load balancer.

use serde::Serialize;

use super::error::ContextError;
use crate::types::ResourceName;

/// The pair of groups being swapped, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentContext {
    inactive_group: ResourceName,
    inactive_target_group: ResourceName,
    new_group: ResourceName,
    new_target_group: ResourceName,
    load_balancer: ResourceName,
}

impl DeploymentContext {
    /// Build a context, refusing one where both sides name the same group.
    pub fn new(
        inactive_group: ResourceName,
        inactive_target_group: ResourceName,
        new_group: ResourceName,
        new_target_group: ResourceName,
        load_balancer: ResourceName,
    ) -> Result<Self, ContextError> {
        if inactive_group == new_group {
            return Err(ContextError::SameComputeGroup(new_group));
        }
        if inactive_target_group == new_target_group {
            return Err(ContextError::SameTargetGroup(new_target_group));
        }

        Ok(Self {
            inactive_group,
            inactive_target_group,
            new_group,
            new_target_group,
            load_balancer,
        })
    }

    /// The group being drained.
    pub fn inactive_group(&self) -> &ResourceName {
        &self.inactive_group
    }

    pub fn inactive_target_group(&self) -> &ResourceName {
        &self.inactive_target_group
    }

    /// The group being promoted.
    pub fn new_group(&self) -> &ResourceName {
        &self.new_group
    }

    pub fn new_target_group(&self) -> &ResourceName {
        &self.new_target_group
    }

    pub fn load_balancer(&self) -> &ResourceName {
        &self.load_balancer
    }
}
