// ABOUTME: In-process resource gateway backed by fixture snapshots.
// ABOUTME: Used for offline rehearsals and as a scripted double in tests.

use async_trait::async_trait;
use nonempty::NonEmpty;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use super::error::{GatewayError, ResourceKind};
use super::model::{ComputeGroup, Instance, LifecycleState, LoadBalancer, TargetGroup};
use super::ResourceGateway;
use crate::types::{InstanceId, ResourceName};

/// Provider state described in YAML, for `--fixture` runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub compute_groups: Vec<ComputeGroup>,
    #[serde(default)]
    pub target_groups: Vec<TargetGroup>,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
}

impl Fixture {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// A call observed by the memory gateway, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    GetComputeGroup(String),
    GetTargetGroup(String),
    GetLoadBalancer(String),
    TerminateInstances(Vec<InstanceId>),
    GetInstance(InstanceId),
}

/// Snapshots served one per fetch; the last one repeats forever.
#[derive(Debug)]
struct Script<T> {
    snapshots: VecDeque<T>,
}

impl<T: Clone> Script<T> {
    fn new(snapshots: NonEmpty<T>) -> Self {
        Self {
            snapshots: snapshots.into_iter().collect(),
        }
    }

    fn fetch(&mut self) -> Option<T> {
        let current = self.snapshots.front().cloned();
        if self.snapshots.len() > 1 {
            self.snapshots.pop_front();
        }
        current
    }

    fn current(&self) -> Option<&T> {
        self.snapshots.front()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    compute_groups: HashMap<String, Script<ComputeGroup>>,
    target_groups: HashMap<String, Script<TargetGroup>>,
    load_balancers: HashMap<String, LoadBalancer>,
    calls: Vec<GatewayCall>,
}

impl MemoryState {
    fn find_instance(&self, id: &InstanceId) -> Option<&Instance> {
        self.compute_groups
            .values()
            .filter_map(Script::current)
            .flat_map(|group| group.instances.iter())
            .find(|instance| &instance.id == id)
    }
}

/// Resource gateway that serves scripted snapshots from memory.
///
/// Terminating an instance moves it to `Terminating` in every queued
/// snapshot of every group, so later fetches observe the mutation.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut gateway = Self::new();
        for group in fixture.compute_groups {
            gateway = gateway.with_compute_group(group);
        }
        for target_group in fixture.target_groups {
            gateway = gateway.with_target_group(target_group);
        }
        for load_balancer in fixture.load_balancers {
            gateway = gateway.with_load_balancer(load_balancer);
        }
        gateway
    }

    pub fn with_compute_group(self, group: ComputeGroup) -> Self {
        self.with_compute_group_sequence(NonEmpty::new(group))
    }

    /// Serve `snapshots` in order, one per fetch of the group.
    pub fn with_compute_group_sequence(self, snapshots: NonEmpty<ComputeGroup>) -> Self {
        let name = snapshots.head.name.to_string();
        self.state
            .lock()
            .compute_groups
            .insert(name, Script::new(snapshots));
        self
    }

    pub fn with_target_group(self, target_group: TargetGroup) -> Self {
        self.with_target_group_sequence(NonEmpty::new(target_group))
    }

    /// Serve `snapshots` in order, one per fetch of the target group.
    pub fn with_target_group_sequence(self, snapshots: NonEmpty<TargetGroup>) -> Self {
        let name = snapshots.head.name.to_string();
        self.state
            .lock()
            .target_groups
            .insert(name, Script::new(snapshots));
        self
    }

    pub fn with_load_balancer(self, load_balancer: LoadBalancer) -> Self {
        let name = load_balancer.name.to_string();
        self.state.lock().load_balancers.insert(name, load_balancer);
        self
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    pub fn terminate_calls(&self) -> Vec<Vec<InstanceId>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::TerminateInstances(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn compute_group_fetches(&self, name: &str) -> usize {
        self.count_calls(|call| matches!(call, GatewayCall::GetComputeGroup(n) if n == name))
    }

    pub fn target_group_fetches(&self, name: &str) -> usize {
        self.count_calls(|call| matches!(call, GatewayCall::GetTargetGroup(n) if n == name))
    }

    fn count_calls(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }
}

#[async_trait]
impl ResourceGateway for MemoryGateway {
    async fn get_compute_group(&self, name: &ResourceName) -> Result<ComputeGroup, GatewayError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::GetComputeGroup(name.to_string()));
        state
            .compute_groups
            .get_mut(name.as_str())
            .and_then(Script::fetch)
            .ok_or_else(|| GatewayError::not_found(ResourceKind::ComputeGroup, name))
    }

    async fn get_target_group(&self, name: &ResourceName) -> Result<TargetGroup, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GetTargetGroup(name.to_string()));
        state
            .target_groups
            .get_mut(name.as_str())
            .and_then(Script::fetch)
            .ok_or_else(|| GatewayError::not_found(ResourceKind::TargetGroup, name))
    }

    async fn get_load_balancer(&self, name: &ResourceName) -> Result<LoadBalancer, GatewayError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(GatewayCall::GetLoadBalancer(name.to_string()));
        state
            .load_balancers
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| GatewayError::not_found(ResourceKind::LoadBalancer, name))
    }

    async fn terminate_instances(&self, ids: &NonEmpty<InstanceId>) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        let ids: Vec<InstanceId> = ids.iter().cloned().collect();
        state
            .calls
            .push(GatewayCall::TerminateInstances(ids.clone()));

        if let Some(missing) = ids.iter().find(|id| state.find_instance(id).is_none()) {
            return Err(GatewayError::not_found(ResourceKind::Instance, missing));
        }

        for script in state.compute_groups.values_mut() {
            for snapshot in script.snapshots.iter_mut() {
                for instance in snapshot.instances.iter_mut() {
                    if ids.contains(&instance.id) {
                        instance.lifecycle_state = LifecycleState::Terminating;
                    }
                }
            }
        }

        Ok(())
    }

    async fn get_instance(&self, id: &InstanceId) -> Result<Instance, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall::GetInstance(id.clone()));
        state
            .find_instance(id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(ResourceKind::Instance, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::HealthStatus;
    use nonempty::nonempty;

    fn group(desired: u32, instances: Vec<Instance>) -> ComputeGroup {
        ComputeGroup {
            name: ResourceName::new("green-asg").unwrap(),
            desired_capacity: desired,
            instances,
        }
    }

    #[tokio::test]
    async fn sequences_advance_per_fetch_and_stick_on_last() {
        let gateway = MemoryGateway::new().with_compute_group_sequence(nonempty![
            group(2, vec![]),
            group(2, vec![Instance::new(
                "i-1",
                HealthStatus::Healthy,
                LifecycleState::InService
            )]),
        ]);
        let name = ResourceName::new("green-asg").unwrap();

        assert!(gateway.get_compute_group(&name).await.unwrap().instances.is_empty());
        assert_eq!(gateway.get_compute_group(&name).await.unwrap().instances.len(), 1);
        assert_eq!(gateway.get_compute_group(&name).await.unwrap().instances.len(), 1);
        assert_eq!(gateway.compute_group_fetches("green-asg"), 3);
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway
            .get_target_group(&ResourceName::new("missing-tg").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("missing-tg"));
    }

    #[tokio::test]
    async fn terminate_marks_instances_terminating() {
        let gateway = MemoryGateway::new().with_compute_group(group(
            1,
            vec![Instance::new(
                "i-1",
                HealthStatus::Healthy,
                LifecycleState::InService,
            )],
        ));

        gateway
            .terminate_instances(&NonEmpty::new(InstanceId::new("i-1")))
            .await
            .unwrap();

        let instance = gateway.get_instance(&InstanceId::new("i-1")).await.unwrap();
        assert_eq!(instance.lifecycle_state, LifecycleState::Terminating);
        assert_eq!(gateway.terminate_calls(), vec![vec![InstanceId::new("i-1")]]);
    }

    #[test]
    fn fixture_parses_yaml() {
        let fixture = Fixture::from_yaml(
            r#"
compute_groups:
  - name: blue-asg
    desired_capacity: 1
    instances:
      - { id: i-1, health_status: Healthy, lifecycle_state: InService }
target_groups:
  - arn: arn:tg/blue
    name: blue-tg
    targets:
      - { id: i-1, status: healthy }
load_balancers:
  - { arn: arn:lb/web, name: web-lb }
"#,
        )
        .unwrap();

        assert_eq!(fixture.compute_groups.len(), 1);
        assert_eq!(fixture.target_groups[0].healthy_count(), 1);
        assert_eq!(fixture.load_balancers[0].name.as_str(), "web-lb");
    }
}
