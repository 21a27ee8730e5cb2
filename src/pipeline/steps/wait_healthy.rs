// ABOUTME: Waits until every instance of the new group is healthy and in service.
// ABOUTME: Re-fetches the group on each poll tick; performs no mutation.

use async_trait::async_trait;
use std::sync::Arc;

use super::describe_instances;
use crate::gateway::{GatewayError, ResourceGateway};
use crate::pipeline::context::DeploymentContext;
use crate::pipeline::error::StepError;
use crate::pipeline::poller::{Poller, Probe};
use crate::pipeline::step::{Execute, PostCheck, PreCheck, Step, StepOutcome};

pub struct WaitUntilNewInstancesAreHealthy {
    gateway: Arc<dyn ResourceGateway>,
    context: Arc<DeploymentContext>,
    poller: Poller,
}

impl WaitUntilNewInstancesAreHealthy {
    pub const NAME: &'static str = "wait-until-new-instances-are-healthy";

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
}

#[async_trait]
impl PreCheck for WaitUntilNewInstancesAreHealthy {
    async fn pre_check(&self) -> Result<StepOutcome, StepError> {
        let group = self
            .gateway
            .get_compute_group(self.context.new_group())
            .await?;
        let launched = group.instances.len();
        let message = format!(
            "{} has {} of {} desired instance(s)",
            group.name, launched, group.desired_capacity
        );

        Ok(if launched == group.desired_capacity as usize {
            StepOutcome::pass(message)
        } else {
            StepOutcome::fail(message)
        })
    }
}

#[async_trait]
impl Execute for WaitUntilNewInstancesAreHealthy {
    async fn execute(&self) -> Result<(), StepError> {
        let gateway = &self.gateway;
        let name = self.context.new_group();
        let what = format!("instances in {name} to become healthy");

        let polled = self
            .poller
            .wait_for(&what, || async move {
                let group = gateway.get_compute_group(name).await?;
                let pending = group.pending_instances();
                if pending.is_empty() {
                    return Ok(Probe::Ready(group.instances.len()));
                }

                tracing::info!(
                    "{} of {} instance(s) in {} pending: {}",
                    pending.len(),
                    group.instances.len(),
                    name,
                    describe_instances(&pending)
                );
                Ok::<_, GatewayError>(Probe::Pending)
            })
            .await?;

        tracing::info!(
            "all {} instance(s) in {} healthy and in service after {} attempt(s)",
            polled.value,
            name,
            polled.attempts
        );
        Ok(())
    }
}

#[async_trait]
impl PostCheck for WaitUntilNewInstancesAreHealthy {
    async fn post_check(&self) -> Result<StepOutcome, StepError> {
        let group = self
            .gateway
            .get_compute_group(self.context.new_group())
            .await?;
        let pending = group.pending_instances();

        Ok(if pending.is_empty() {
            StepOutcome::pass(format!(
                "all {} instance(s) in {} are Healthy and InService",
                group.instances.len(),
                group.name
            ))
        } else {
            StepOutcome::fail(format!(
                "{} instance(s) in {} not ready: {}",
                pending.len(),
                group.name,
                describe_instances(&pending)
            ))
        })
    }
}

impl Step for WaitUntilNewInstancesAreHealthy {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}
