// ABOUTME: Drives each step through pre-check, execute and post-check in order.
// ABOUTME: Checks only warn; a failed execute stops the pipeline and is named in the report.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use super::context::DeploymentContext;
use super::error::StepError;
use super::poller::Poller;
use super::step::{Step, StepOutcome};
use super::strategy::Strategy;
use crate::diagnostics::{Diagnostics, Warning};
use crate::gateway::ResourceGateway;
use crate::output::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    NotStarted,
    Running,
    Passed,
    Failed,
}

/// What happened to one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: &'static str,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_check: Option<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_check: Option<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            state: StepState::NotStarted,
            pre_check: None,
            post_check: None,
            error: None,
        }
    }
}

/// Audit trail of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub steps: Vec<StepRecord>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.state == StepState::Passed)
    }

    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.state == StepState::Failed)
    }

    /// Turn a failed report into [`crate::error::Error::PipelineFailed`].
    pub fn into_result(self) -> crate::error::Result<Self> {
        match self.failed_step() {
            Some(failed) => Err(crate::error::Error::PipelineFailed {
                step: failed.name.to_string(),
                reason: failed.error.clone().unwrap_or_default(),
            }),
            None => Ok(self),
        }
    }
}

/// Ordered steps run one at a time.
#[derive(Default)]
pub struct PipelineRunner {
    steps: Vec<Box<dyn Step>>,
    current: Mutex<Option<&'static str>>,
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn for_strategy(
        strategy: Strategy,
        gateway: Arc<dyn ResourceGateway>,
        context: Arc<DeploymentContext>,
        poller: Poller,
    ) -> Self {
        let steps = strategy
            .steps()
            .iter()
            .map(|kind| kind.build(gateway.clone(), context.clone(), poller))
            .collect();
        Self {
            steps,
            current: Mutex::default(),
        }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// The step in progress, readable while [`PipelineRunner::run`] is pending.
    pub fn current_step(&self) -> Option<&'static str> {
        *self.current.lock()
    }

    pub async fn run(&self, output: &Output, diagnostics: &mut Diagnostics) -> PipelineReport {
        let mut records: Vec<StepRecord> =
            self.steps.iter().map(|s| StepRecord::new(s.name())).collect();

        for (step, record) in self.steps.iter().zip(records.iter_mut()) {
            record.state = StepState::Running;
            *self.current.lock() = Some(record.name);
            output.step_started(record.name);

            match drive(step.as_ref(), record, output, diagnostics).await {
                Ok(()) => {
                    record.state = StepState::Passed;
                    output.step_passed(record.name);
                }
                Err(e) => {
                    tracing::error!("step {} failed: {}", record.name, e);
                    record.state = StepState::Failed;
                    record.error = Some(e.to_string());
                    output.step_failed(record.name, &e.to_string());
                    break;
                }
            }
        }

        *self.current.lock() = None;
        PipelineReport { steps: records }
    }
}

async fn drive(
    step: &dyn Step,
    record: &mut StepRecord,
    output: &Output,
    diagnostics: &mut Diagnostics,
) -> Result<(), StepError> {
    let pre = observe(record.name, "pre-check", step.pre_check().await, diagnostics)?;
    output.check(record.name, "pre-check", &pre);
    record.pre_check = Some(pre);

    step.execute().await?;

    let post = observe(record.name, "post-check", step.post_check().await, diagnostics)?;
    output.check(record.name, "post-check", &post);
    record.post_check = Some(post);

    Ok(())
}

/// Fold a check result into an outcome. Only fatal errors escape.
fn observe(
    step: &str,
    check: &str,
    result: Result<StepOutcome, StepError>,
    diagnostics: &mut Diagnostics,
) -> Result<StepOutcome, StepError> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => StepOutcome::fail(e.to_string()),
    };

    if !outcome.ok {
        diagnostics.warn(Warning::verification(format!(
            "{step} {check}: {}",
            outcome.message
        )));
    }
    Ok(outcome)
}
