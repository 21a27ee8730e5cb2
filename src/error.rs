// ABOUTME: Application-wide error types for rolling-replacer.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::{GatewayError, TransportError};
use crate::lock::LockError;
use crate::pipeline::ContextError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "no wait timeout configured; set wait_timeout in the config file or pass --wait-timeout (use \"none\" to wait forever)"
    )]
    MissingWaitTimeout,

    #[error("no gateway configured; pass --endpoint, --socket or --fixture, or set gateway in the config file")]
    NoGateway,

    #[error("invalid deployment context: {0}")]
    Context(#[from] ContextError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("gateway error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("hook failed: {0}")]
    Hook(String),

    #[error("pipeline failed at step {step}: {reason}")]
    PipelineFailed { step: String, reason: String },

    #[error(
        "interrupted{}",
        .step.as_deref().map(|s| format!(" during step {s}")).unwrap_or_default()
    )]
    Interrupted { step: Option<String> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Interrupted { .. } => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
