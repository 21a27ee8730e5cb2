// ABOUTME: Error types for pipeline steps and context construction.
// ABOUTME: Distinguishes fatal lookups from exhausted waits and other execution failures.

use std::time::Duration;

use crate::gateway::GatewayError;
use crate::types::ResourceName;

/// Errors that abort a step's `execute`, or a check when fatal.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The configured wait limit ran out before the condition held.
    #[error("gave up waiting for {what} after {}s ({attempts} attempts)", elapsed.as_secs())]
    WaitTimedOut {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("{0}")]
    Failed(String),
}

impl StepError {
    /// Fatal wherever it happens, including inside a check.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepError::Gateway(e) if e.is_not_found())
    }
}

/// Rejected deployment contexts.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("inactive and new compute group are both {0}")]
    SameComputeGroup(ResourceName),

    #[error("inactive and new target group are both {0}")]
    SameTargetGroup(ResourceName),
}
