// ABOUTME: Snapshot types returned by the resource gateway.
// ABOUTME: Compute groups, instances, target groups, targets and load balancers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{InstanceId, ResourceName, TargetId};

/// Provider-reported instance health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// A value this crate does not model; kept verbatim for logging.
    Other(String),
}

impl From<String> for HealthStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Healthy" => HealthStatus::Healthy,
            "Unhealthy" => HealthStatus::Unhealthy,
            _ => HealthStatus::Other(value),
        }
    }
}

impl From<HealthStatus> for String {
    fn from(value: HealthStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
            HealthStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Where an instance is in the group's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    Pending,
    InService,
    Terminating,
    Terminated,
    Other(String),
}

impl From<String> for LifecycleState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => LifecycleState::Pending,
            "InService" => LifecycleState::InService,
            "Terminating" => LifecycleState::Terminating,
            "Terminated" => LifecycleState::Terminated,
            _ => LifecycleState::Other(value),
        }
    }
}

impl From<LifecycleState> for String {
    fn from(value: LifecycleState) -> Self {
        value.to_string()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Pending => write!(f, "Pending"),
            LifecycleState::InService => write!(f, "InService"),
            LifecycleState::Terminating => write!(f, "Terminating"),
            LifecycleState::Terminated => write!(f, "Terminated"),
            LifecycleState::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Registration status of a target in a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetStatus {
    Healthy,
    Unhealthy,
    Initial,
    Draining,
    Other(String),
}

impl From<String> for TargetStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "healthy" => TargetStatus::Healthy,
            "unhealthy" => TargetStatus::Unhealthy,
            "initial" => TargetStatus::Initial,
            "draining" => TargetStatus::Draining,
            _ => TargetStatus::Other(value),
        }
    }
}

impl From<TargetStatus> for String {
    fn from(value: TargetStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Healthy => write!(f, "healthy"),
            TargetStatus::Unhealthy => write!(f, "unhealthy"),
            TargetStatus::Initial => write!(f, "initial"),
            TargetStatus::Draining => write!(f, "draining"),
            TargetStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub health_status: HealthStatus,
    pub lifecycle_state: LifecycleState,
}

impl Instance {
    pub fn new(
        id: impl Into<String>,
        health_status: HealthStatus,
        lifecycle_state: LifecycleState,
    ) -> Self {
        Self {
            id: InstanceId::new(id),
            health_status,
            lifecycle_state,
        }
    }

    /// Healthy and in service: able to take traffic.
    pub fn is_ready(&self) -> bool {
        self.health_status == HealthStatus::Healthy
            && self.lifecycle_state == LifecycleState::InService
    }

    pub fn is_in_service(&self) -> bool {
        self.lifecycle_state == LifecycleState::InService
    }
}

/// Snapshot of a provider-managed pool of instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeGroup {
    pub name: ResourceName,
    pub desired_capacity: u32,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl ComputeGroup {
    /// Instances that are not yet healthy and in service.
    pub fn pending_instances(&self) -> Vec<&Instance> {
        self.instances.iter().filter(|i| !i.is_ready()).collect()
    }

    pub fn in_service_ids(&self) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|i| i.is_in_service())
            .map(|i| i.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub status: TargetStatus,
}

impl Target {
    pub fn new(id: impl Into<String>, status: TargetStatus) -> Self {
        Self {
            id: TargetId::new(id),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub arn: String,
    pub name: ResourceName,
    #[serde(default)]
    pub load_balancer_arns: Vec<String>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl TargetGroup {
    pub fn pending_targets(&self) -> Vec<&Target> {
        self.targets
            .iter()
            .filter(|t| t.status != TargetStatus::Healthy)
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.status == TargetStatus::Healthy)
            .count()
    }

    pub fn is_attached_to(&self, load_balancer: &LoadBalancer) -> bool {
        self.load_balancer_arns.iter().any(|a| a == &load_balancer.arn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub arn: String,
    pub name: ResourceName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_states_round_trip_verbatim() {
        let state: LifecycleState = serde_json::from_str("\"Warmed:Pending\"").unwrap();
        assert_eq!(state, LifecycleState::Other("Warmed:Pending".to_string()));
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            "\"Warmed:Pending\""
        );
    }

    #[test]
    fn instance_ready_needs_both_signals() {
        let ready = Instance::new("i-1", HealthStatus::Healthy, LifecycleState::InService);
        let launching = Instance::new("i-2", HealthStatus::Healthy, LifecycleState::Pending);
        let sick = Instance::new("i-3", HealthStatus::Unhealthy, LifecycleState::InService);

        assert!(ready.is_ready());
        assert!(!launching.is_ready());
        assert!(!sick.is_ready());
    }

    #[test]
    fn in_service_ids_ignore_terminating_instances() {
        let group = ComputeGroup {
            name: ResourceName::new("blue-asg").unwrap(),
            desired_capacity: 2,
            instances: vec![
                Instance::new("i-1", HealthStatus::Healthy, LifecycleState::InService),
                Instance::new("i-2", HealthStatus::Unhealthy, LifecycleState::Terminating),
                Instance::new("i-3", HealthStatus::Unhealthy, LifecycleState::InService),
            ],
        };

        let ids: Vec<_> = group.in_service_ids();
        assert_eq!(ids, vec![InstanceId::new("i-1"), InstanceId::new("i-3")]);
    }

    #[test]
    fn target_group_counts() {
        let tg = TargetGroup {
            arn: "arn:tg/green".to_string(),
            name: ResourceName::new("green-tg").unwrap(),
            load_balancer_arns: vec!["arn:lb/web".to_string()],
            targets: vec![
                Target::new("t1", TargetStatus::Healthy),
                Target::new("t2", TargetStatus::Initial),
                Target::new("t3", TargetStatus::Draining),
            ],
        };

        assert_eq!(tg.healthy_count(), 1);
        let pending: Vec<_> = tg.pending_targets().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(pending, vec!["t2", "t3"]);
    }
}
