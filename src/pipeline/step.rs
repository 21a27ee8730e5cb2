// ABOUTME: Capability traits every pipeline step implements.
// ABOUTME: Checks observe and never abort on their own; execute is the only control-flow point.

use async_trait::async_trait;
use serde::Serialize;

use super::error::StepError;

/// Result of a read-only check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub ok: bool,
    pub message: String,
}

impl StepOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Read-only look at the state a step expects to start from.
#[async_trait]
pub trait PreCheck: Send + Sync {
    async fn pre_check(&self) -> Result<StepOutcome, StepError>;
}

/// The mutating or waiting action. `Err` stops the pipeline.
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self) -> Result<(), StepError>;
}

/// Read-only confirmation of what `execute` achieved.
#[async_trait]
pub trait PostCheck: Send + Sync {
    async fn post_check(&self) -> Result<StepOutcome, StepError>;
}

/// A named unit of work in the pipeline.
pub trait Step: PreCheck + Execute + PostCheck {
    fn name(&self) -> &'static str;
}
