// ABOUTME: The step pipeline: context, poller, step contract, concrete steps and runner.
// ABOUTME: Everything here talks to the provider only through the resource gateway.

mod context;
mod error;
mod poller;
mod runner;
mod step;
pub mod steps;
mod strategy;

pub use context::DeploymentContext;
pub use error::{ContextError, StepError};
pub use poller::{Polled, Poller, Probe, WaitLimit};
pub use runner::{PipelineReport, PipelineRunner, StepRecord, StepState};
pub use step::{Execute, PostCheck, PreCheck, Step, StepOutcome};
pub use strategy::{StepKind, Strategy, UnknownStrategy};
