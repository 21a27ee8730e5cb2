// ABOUTME: Waits until the new group's instances are healthy targets of the new target group.
// ABOUTME: Requires desired capacity, instance count and healthy target count to agree.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::join_ids;
use crate::gateway::{ComputeGroup, GatewayError, ResourceGateway, TargetGroup};
use crate::pipeline::context::DeploymentContext;
use crate::pipeline::error::StepError;
use crate::pipeline::poller::{Poller, Probe};
use crate::pipeline::step::{Execute, PostCheck, PreCheck, Step, StepOutcome};
use crate::types::TargetId;

/// The counts compared while waiting for targeting to settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetingSnapshot {
    pub desired_capacity: usize,
    pub instances: usize,
    pub healthy_targets: usize,
    pub pending_targets: Vec<TargetId>,
}

impl TargetingSnapshot {
    pub fn capture(group: &ComputeGroup, target_group: &TargetGroup) -> Self {
        Self {
            desired_capacity: group.desired_capacity as usize,
            instances: group.instances.len(),
            healthy_targets: target_group.healthy_count(),
            pending_targets: target_group
                .pending_targets()
                .into_iter()
                .map(|t| t.id.clone())
                .collect(),
        }
    }

    /// Guards against a group still scaling while the targets attached so
    /// far already report healthy.
    pub fn counts_agree(&self) -> bool {
        self.desired_capacity == self.instances && self.instances == self.healthy_targets
    }

    pub fn is_settled(&self) -> bool {
        self.pending_targets.is_empty() && self.counts_agree()
    }
}

impl fmt::Display for TargetingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "desired {}, instances {}, healthy targets {}",
            self.desired_capacity, self.instances, self.healthy_targets
        )
    }
}

pub struct WaitUntilNewInstancesAreTargeted {
    gateway: Arc<dyn ResourceGateway>,
    context: Arc<DeploymentContext>,
    poller: Poller,
}

impl WaitUntilNewInstancesAreTargeted {
    pub const NAME: &'static str = "wait-until-new-instances-are-targeted";

    pub fn new(
        gateway: Arc<dyn ResourceGateway>,
        context: Arc<DeploymentContext>,
        poller: Poller,
    ) -> Self {
        Self {
            gateway,
            context,
            poller,
        }
    }

    async fn snapshot(&self) -> Result<TargetingSnapshot, StepError> {
        let (group, target_group) = futures::try_join!(
            self.gateway.get_compute_group(self.context.new_group()),
            self.gateway.get_target_group(self.context.new_target_group()),
        )?;
        Ok(TargetingSnapshot::capture(&group, &target_group))
    }
}

#[async_trait]
impl PreCheck for WaitUntilNewInstancesAreTargeted {
    async fn pre_check(&self) -> Result<StepOutcome, StepError> {
        let (target_group, load_balancer) = futures::try_join!(
            self.gateway.get_target_group(self.context.new_target_group()),
            self.gateway.get_load_balancer(self.context.load_balancer()),
        )?;

        Ok(if target_group.is_attached_to(&load_balancer) {
            StepOutcome::pass(format!(
                "{} is attached to {}",
                target_group.name, load_balancer.name
            ))
        } else {
            StepOutcome::fail(format!(
                "{} is not attached to {}",
                target_group.name, load_balancer.name
            ))
        })
    }
}

#[async_trait]
impl Execute for WaitUntilNewInstancesAreTargeted {
    async fn execute(&self) -> Result<(), StepError> {
        let gateway = &self.gateway;
        let group_name = self.context.new_group();
        let target_group_name = self.context.new_target_group();
        let what = format!("instances of {group_name} to be healthy in {target_group_name}");

        let polled = self
            .poller
            .wait_for(&what, || async move {
                let (group, target_group) = futures::try_join!(
                    gateway.get_compute_group(group_name),
                    gateway.get_target_group(target_group_name),
                )?;
                let snapshot = TargetingSnapshot::capture(&group, &target_group);
                if snapshot.is_settled() {
                    return Ok(Probe::Ready(snapshot));
                }

                if snapshot.pending_targets.is_empty() {
                    tracing::info!("{} still settling ({})", target_group_name, snapshot);
                } else {
                    tracing::info!(
                        "{} pending target(s) in {} ({}): {}",
                        snapshot.pending_targets.len(),
                        target_group_name,
                        snapshot,
                        join_ids(&snapshot.pending_targets)
                    );
                }
                Ok::<_, GatewayError>(Probe::Pending)
            })
            .await?;

        tracing::info!(
            "{} settled after {} attempt(s): {}",
            target_group_name,
            polled.attempts,
            polled.value
        );
        Ok(())
    }
}

#[async_trait]
impl PostCheck for WaitUntilNewInstancesAreTargeted {
    async fn post_check(&self) -> Result<StepOutcome, StepError> {
        let snapshot = self.snapshot().await?;
        Ok(if snapshot.counts_agree() {
            StepOutcome::pass(snapshot.to_string())
        } else {
            StepOutcome::fail(format!("counts disagree: {snapshot}"))
        })
    }
}

impl Step for WaitUntilNewInstancesAreTargeted {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}
