// ABOUTME: Error types for resource gateway calls.
// ABOUTME: Separates fatal lookups of missing resources from transport and protocol failures.

use std::fmt;

use super::http::TransportError;

/// Kind of resource a gateway lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ComputeGroup,
    TargetGroup,
    LoadBalancer,
    Instance,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::ComputeGroup => "compute group",
            ResourceKind::TargetGroup => "target group",
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::Instance => "instance",
        };
        f.write_str(label)
    }
}

/// Errors from resource gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A named resource does not exist. Always a configuration problem.
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("gateway rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn not_found(kind: ResourceKind, name: impl fmt::Display) -> Self {
        GatewayError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}
