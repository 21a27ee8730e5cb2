// ABOUTME: Named strategies mapping to an ordered list of steps.
// ABOUTME: Termination, when present, is always the last step.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::context::DeploymentContext;
use super::poller::{Poller, WaitLimit};
use super::step::Step;
use super::steps::{
    TerminateInactiveInstances, WaitUntilNewInstancesAreHealthy, WaitUntilNewInstancesAreTargeted,
};
use crate::gateway::ResourceGateway;

/// Which pipeline a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Wait for the new group, then terminate the inactive one.
    BlueGreen,
    /// Wait for the new group and stop there. Nothing is mutated.
    Verify,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown strategy {0:?} (expected blue-green or verify)")]
pub struct UnknownStrategy(String);

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::BlueGreen => "blue-green",
            Strategy::Verify => "verify",
        }
    }

    pub fn steps(&self) -> &'static [StepKind] {
        match self {
            Strategy::BlueGreen => &[
                StepKind::WaitHealthy,
                StepKind::WaitTargeted,
                StepKind::TerminateInactive,
            ],
            Strategy::Verify => &[StepKind::WaitHealthy, StepKind::WaitTargeted],
        }
    }

    pub fn terminates(&self) -> bool {
        self.steps().contains(&StepKind::TerminateInactive)
    }

    /// Longest this strategy can spend waiting, given a per-wait limit.
    /// `None` when any wait is unbounded.
    pub fn run_limit(&self, limit: WaitLimit) -> Option<Duration> {
        let WaitLimit::Within(per_wait) = limit else {
            return None;
        };
        let waits = self.steps().iter().filter(|kind| kind.waits()).count();
        Some(per_wait.saturating_mul(u32::try_from(waits).unwrap_or(u32::MAX)))
    }
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue-green" => Ok(Strategy::BlueGreen),
            "verify" => Ok(Strategy::Verify),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    WaitHealthy,
    WaitTargeted,
    TerminateInactive,
}

impl StepKind {
    /// Whether the step polls until the provider settles.
    pub fn waits(self) -> bool {
        matches!(self, StepKind::WaitHealthy | StepKind::WaitTargeted)
    }

    pub fn build(
        self,
        gateway: Arc<dyn ResourceGateway>,
        context: Arc<DeploymentContext>,
        poller: Poller,
    ) -> Box<dyn Step> {
        match self {
            StepKind::WaitHealthy => Box::new(WaitUntilNewInstancesAreHealthy::new(
                gateway, context, poller,
            )),
            StepKind::WaitTargeted => Box::new(WaitUntilNewInstancesAreTargeted::new(
                gateway, context, poller,
            )),
            StepKind::TerminateInactive => {
                Box::new(TerminateInactiveInstances::new(gateway, context))
            }
        }
    }
}
