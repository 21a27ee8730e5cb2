// ABOUTME: Terminates the in-service instances of the inactive group.
// ABOUTME: A group with nothing in service is a no-op, so re-runs are safe.

use async_trait::async_trait;
use nonempty::NonEmpty;
use parking_lot::Mutex;
use std::sync::Arc;

use super::join_ids;
use crate::gateway::ResourceGateway;
use crate::pipeline::context::DeploymentContext;
use crate::pipeline::error::StepError;
use crate::pipeline::step::{Execute, PostCheck, PreCheck, Step, StepOutcome};
use crate::types::InstanceId;

pub struct TerminateInactiveInstances {
    gateway: Arc<dyn ResourceGateway>,
    context: Arc<DeploymentContext>,
    /// Ids handed to the last terminate call, for the post-check.
    terminated: Mutex<Vec<InstanceId>>,
}

impl TerminateInactiveInstances {
    pub const NAME: &'static str = "terminate-inactive-instances";

    pub fn new(gateway: Arc<dyn ResourceGateway>, context: Arc<DeploymentContext>) -> Self {
        Self {
            gateway,
            context,
            terminated: Mutex::new(Vec::new()),
        }
    }

    /// Instances the last `execute` asked the provider to terminate.
    pub fn terminated(&self) -> Vec<InstanceId> {
        self.terminated.lock().clone()
    }
}

#[async_trait]
impl PreCheck for TerminateInactiveInstances {
    async fn pre_check(&self) -> Result<StepOutcome, StepError> {
        let group = self
            .gateway
            .get_compute_group(self.context.inactive_group())
            .await?;
        Ok(StepOutcome::pass(format!(
            "{} in-service instance(s) in {}",
            group.in_service_ids().len(),
            group.name
        )))
    }
}

#[async_trait]
impl Execute for TerminateInactiveInstances {
    async fn execute(&self) -> Result<(), StepError> {
        let group = self
            .gateway
            .get_compute_group(self.context.inactive_group())
            .await?;

        let Some(ids) = NonEmpty::from_vec(group.in_service_ids()) else {
            tracing::info!("no instance to terminate in {}", group.name);
            self.terminated.lock().clear();
            return Ok(());
        };

        tracing::info!(
            "terminating {} instance(s) in {}: {}",
            ids.len(),
            group.name,
            join_ids(ids.iter())
        );
        self.gateway.terminate_instances(&ids).await?;
        *self.terminated.lock() = ids.into_iter().collect();
        Ok(())
    }
}

#[async_trait]
impl PostCheck for TerminateInactiveInstances {
    /// Reports where each terminated instance is now. Termination is
    /// asynchronous, so this does not assert that it finished.
    async fn post_check(&self) -> Result<StepOutcome, StepError> {
        let ids = self.terminated();
        if ids.is_empty() {
            return Ok(StepOutcome::pass("nothing was terminated"));
        }

        let mut states = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.gateway.get_instance(id).await {
                Ok(instance) => {
                    tracing::info!(
                        "{} is now {} ({})",
                        id,
                        instance.health_status,
                        instance.lifecycle_state
                    );
                    states.push(format!(
                        "{id}: {}/{}",
                        instance.health_status, instance.lifecycle_state
                    ));
                }
                // already gone from the provider's view
                Err(e) if e.is_not_found() => states.push(format!("{id}: gone")),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(StepOutcome::pass(states.join(", ")))
    }
}

impl Step for TerminateInactiveInstances {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}
