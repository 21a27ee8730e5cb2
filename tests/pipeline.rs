// ABOUTME: Integration tests for the step pipeline against scripted gateways.
// ABOUTME: Covers the wait steps, termination, runner ordering and check handling.

use async_trait::async_trait;
use nonempty::{NonEmpty, nonempty};
use rolling_replacer::diagnostics::{Diagnostics, WarningKind};
use rolling_replacer::gateway::{
    ComputeGroup, GatewayCall, GatewayError, HealthStatus, Instance, LifecycleState, LoadBalancer,
    MemoryGateway, ResourceGateway, Target, TargetGroup, TargetStatus,
};
use rolling_replacer::output::{Output, OutputMode};
use rolling_replacer::pipeline::{
    DeploymentContext, Execute, PipelineRunner, Poller, PostCheck, PreCheck, StepError, StepState,
    Strategy, WaitLimit,
};
use rolling_replacer::pipeline::steps::{
    TargetingSnapshot, TerminateInactiveInstances, WaitUntilNewInstancesAreHealthy,
    WaitUntilNewInstancesAreTargeted,
};
use rolling_replacer::types::{InstanceId, ResourceName};
use std::sync::Arc;
use std::time::Duration;

fn name(s: &str) -> ResourceName {
    ResourceName::new(s).unwrap()
}

fn context() -> Arc<DeploymentContext> {
    Arc::new(
        DeploymentContext::new(
            name("blue-asg"),
            name("blue-tg"),
            name("green-asg"),
            name("green-tg"),
            name("web-lb"),
        )
        .unwrap(),
    )
}

fn poller() -> Poller {
    Poller::new(
        Duration::from_secs(10),
        WaitLimit::Within(Duration::from_secs(600)),
    )
}

fn ready(id: &str) -> Instance {
    Instance::new(id, HealthStatus::Healthy, LifecycleState::InService)
}

fn group(group_name: &str, desired: u32, instances: Vec<Instance>) -> ComputeGroup {
    ComputeGroup {
        name: name(group_name),
        desired_capacity: desired,
        instances,
    }
}

fn target_group(tg_name: &str, targets: &[(&str, TargetStatus)]) -> TargetGroup {
    TargetGroup {
        arn: format!("arn:tg/{tg_name}"),
        name: name(tg_name),
        load_balancer_arns: vec!["arn:lb/web".to_string()],
        targets: targets
            .iter()
            .map(|(id, status)| Target::new(*id, status.clone()))
            .collect(),
    }
}

fn load_balancer() -> LoadBalancer {
    LoadBalancer {
        arn: "arn:lb/web".to_string(),
        name: name("web-lb"),
    }
}

fn healthy_targets(ids: &[&str]) -> TargetGroup {
    let targets: Vec<(&str, TargetStatus)> =
        ids.iter().map(|id| (*id, TargetStatus::Healthy)).collect();
    target_group("green-tg", &targets)
}

/// Provider state where the new group is already fully serving.
fn settled_gateway() -> MemoryGateway {
    MemoryGateway::new()
        .with_compute_group(group(
            "blue-asg",
            2,
            vec![ready("i-1"), ready("i-2")],
        ))
        .with_compute_group(group("green-asg", 2, vec![ready("i-3"), ready("i-4")]))
        .with_target_group(target_group("blue-tg", &[]))
        .with_target_group(healthy_targets(&["i-3", "i-4"]))
        .with_load_balancer(load_balancer())
}

fn quiet() -> Output {
    Output::new(OutputMode::Quiet)
}

mod terminate {
    use super::*;

    #[tokio::test]
    async fn terminates_all_in_service_instances_in_one_call() {
        let gateway = Arc::new(
            MemoryGateway::new().with_compute_group(group(
                "blue-asg",
                2,
                vec![
                    ready("i-1"),
                    ready("i-2"),
                    Instance::new("i-0", HealthStatus::Unhealthy, LifecycleState::Terminating),
                ],
            )),
        );
        let step = TerminateInactiveInstances::new(gateway.clone(), context());

        step.execute().await.unwrap();

        assert_eq!(
            gateway.terminate_calls(),
            vec![vec![InstanceId::new("i-1"), InstanceId::new("i-2")]]
        );
        assert_eq!(
            step.terminated(),
            vec![InstanceId::new("i-1"), InstanceId::new("i-2")]
        );
    }

    #[tokio::test]
    async fn empty_inactive_group_is_a_repeatable_no_op() {
        let gateway = Arc::new(MemoryGateway::new().with_compute_group(group(
            "blue-asg",
            0,
            vec![Instance::new(
                "i-1",
                HealthStatus::Unhealthy,
                LifecycleState::Terminated,
            )],
        )));
        let step = TerminateInactiveInstances::new(gateway.clone(), context());

        step.execute().await.unwrap();
        step.execute().await.unwrap();

        assert!(gateway.terminate_calls().is_empty());
        let post = step.post_check().await.unwrap();
        assert!(post.ok);
    }

    #[tokio::test]
    async fn post_check_reports_where_terminated_instances_are() {
        let gateway = Arc::new(
            MemoryGateway::new().with_compute_group(group("blue-asg", 1, vec![ready("i-1")])),
        );
        let step = TerminateInactiveInstances::new(gateway.clone(), context());

        let pre = step.pre_check().await.unwrap();
        assert_eq!(pre.message, "1 in-service instance(s) in blue-asg");

        step.execute().await.unwrap();
        let post = step.post_check().await.unwrap();

        assert!(post.ok);
        assert_eq!(post.message, "i-1: Healthy/Terminating");
        assert!(
            gateway
                .calls()
                .contains(&GatewayCall::GetInstance(InstanceId::new("i-1")))
        );
    }

    #[tokio::test]
    async fn missing_inactive_group_is_fatal() {
        let gateway = Arc::new(MemoryGateway::new());
        let step = TerminateInactiveInstances::new(gateway.clone(), context());

        let err = step.execute().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("blue-asg"));
    }
}

mod wait_healthy {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_once_every_instance_is_healthy_and_in_service() {
        let gateway = Arc::new(MemoryGateway::new().with_compute_group_sequence(nonempty![
            group(
                "green-asg",
                2,
                vec![Instance::new(
                    "i-3",
                    HealthStatus::Unhealthy,
                    LifecycleState::Pending
                )]
            ),
            group(
                "green-asg",
                2,
                vec![
                    ready("i-3"),
                    Instance::new("i-4", HealthStatus::Healthy, LifecycleState::Pending),
                ]
            ),
            group("green-asg", 2, vec![ready("i-3"), ready("i-4")]),
        ]));
        let step = WaitUntilNewInstancesAreHealthy::new(gateway.clone(), context(), poller());

        step.execute().await.unwrap();
        assert_eq!(gateway.compute_group_fetches("green-asg"), 3);

        let current = gateway.get_compute_group(&name("green-asg")).await.unwrap();
        assert!(current.instances.iter().all(Instance::is_ready));

        let post = step.post_check().await.unwrap();
        assert!(post.ok, "{}", post.message);
    }

    #[tokio::test]
    async fn pre_check_compares_instances_with_desired_capacity() {
        let gateway = Arc::new(
            MemoryGateway::new().with_compute_group(group("green-asg", 3, vec![ready("i-3")])),
        );
        let step = WaitUntilNewInstancesAreHealthy::new(gateway, context(), poller());

        let pre = step.pre_check().await.unwrap();
        assert!(!pre.ok);
        assert_eq!(pre.message, "green-asg has 1 of 3 desired instance(s)");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_wait_limit() {
        let gateway = Arc::new(MemoryGateway::new().with_compute_group(group(
            "green-asg",
            1,
            vec![Instance::new(
                "i-3",
                HealthStatus::Unhealthy,
                LifecycleState::InService,
            )],
        )));
        let poller = Poller::new(
            Duration::from_secs(10),
            WaitLimit::Within(Duration::from_secs(30)),
        );
        let step = WaitUntilNewInstancesAreHealthy::new(gateway, context(), poller);

        let err = step.execute().await.unwrap_err();
        assert!(matches!(err, StepError::WaitTimedOut { .. }));
        assert!(!err.is_fatal());
    }
}

mod wait_targeted {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_until_pending_targets_turn_healthy() {
        let unsettled = target_group(
            "green-tg",
            &[
                ("t1", TargetStatus::Healthy),
                ("t2", TargetStatus::Initial),
                ("t3", TargetStatus::Unhealthy),
            ],
        );
        let gateway = Arc::new(
            MemoryGateway::new()
                .with_compute_group(group(
                    "green-asg",
                    3,
                    vec![ready("t1"), ready("t2"), ready("t3")],
                ))
                .with_target_group_sequence(nonempty![
                    unsettled.clone(),
                    unsettled.clone(),
                    unsettled.clone(),
                    healthy_targets(&["t1", "t2", "t3"]),
                ]),
        );
        let step = WaitUntilNewInstancesAreTargeted::new(gateway.clone(), context(), poller());

        step.execute().await.unwrap();

        assert!(gateway.target_group_fetches("green-tg") >= 4);
        assert!(gateway.terminate_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_targets_of_a_scaling_group_are_not_enough() {
        let gateway = Arc::new(
            MemoryGateway::new()
                .with_compute_group_sequence(nonempty![
                    group("green-asg", 3, vec![ready("i-3"), ready("i-4")]),
                    group(
                        "green-asg",
                        3,
                        vec![ready("i-3"), ready("i-4"), ready("i-5")]
                    ),
                ])
                .with_target_group_sequence(nonempty![
                    healthy_targets(&["i-3", "i-4"]),
                    healthy_targets(&["i-3", "i-4", "i-5"]),
                ]),
        );
        let step = WaitUntilNewInstancesAreTargeted::new(gateway.clone(), context(), poller());

        step.execute().await.unwrap();
        assert_eq!(gateway.compute_group_fetches("green-asg"), 2);

        let snapshot = TargetingSnapshot::capture(
            &gateway.get_compute_group(&name("green-asg")).await.unwrap(),
            &gateway.get_target_group(&name("green-tg")).await.unwrap(),
        );
        assert!(snapshot.counts_agree());

        let post = step.post_check().await.unwrap();
        assert!(post.ok, "{}", post.message);
    }

    #[tokio::test]
    async fn pre_check_flags_a_detached_target_group() {
        let mut detached = healthy_targets(&["i-3"]);
        detached.load_balancer_arns.clear();
        let gateway = Arc::new(
            MemoryGateway::new()
                .with_target_group(detached)
                .with_load_balancer(load_balancer()),
        );
        let step = WaitUntilNewInstancesAreTargeted::new(gateway, context(), poller());

        let pre = step.pre_check().await.unwrap();
        assert!(!pre.ok);
        assert_eq!(pre.message, "green-tg is not attached to web-lb");
    }
}

mod runner {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn blue_green_terminates_only_after_both_waits() {
        let gateway = Arc::new(settled_gateway());
        let runner =
            PipelineRunner::for_strategy(Strategy::BlueGreen, gateway.clone(), context(), poller());
        let mut diag = Diagnostics::default();

        let report = runner.run(&quiet(), &mut diag).await;

        assert!(report.succeeded(), "{report:?}");
        assert!(!diag.has_warnings());

        let calls = gateway.calls();
        let terminate_at = calls
            .iter()
            .position(|c| matches!(c, GatewayCall::TerminateInstances(_)))
            .unwrap();
        let last_wait_fetch = calls
            .iter()
            .rposition(|c| matches!(c, GatewayCall::GetTargetGroup(n) if n == "green-tg"))
            .unwrap();
        assert!(last_wait_fetch < terminate_at);
        assert_eq!(
            gateway.terminate_calls(),
            vec![vec![InstanceId::new("i-1"), InstanceId::new("i-2")]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn termination_waits_for_a_slowly_settling_group() {
        let starting = Instance::new("i-3", HealthStatus::Unhealthy, LifecycleState::Pending);
        let booting = Instance::new("i-4", HealthStatus::Healthy, LifecycleState::Pending);
        let registering = target_group("green-tg", &[("i-3", TargetStatus::Initial)]);
        let memory = settled_gateway()
            .with_compute_group_sequence(nonempty![
                group("green-asg", 2, vec![starting.clone()]),
                group("green-asg", 2, vec![starting.clone()]),
                group("green-asg", 2, vec![ready("i-3"), booting]),
                group("green-asg", 2, vec![ready("i-3"), ready("i-4")]),
            ])
            .with_target_group_sequence(nonempty![
                registering.clone(),
                registering.clone(),
                registering.clone(),
                target_group(
                    "green-tg",
                    &[("i-3", TargetStatus::Healthy), ("i-4", TargetStatus::Initial)]
                ),
                healthy_targets(&["i-3", "i-4"]),
            ]);
        let gateway = Arc::new(TerminateOnlyWhenSettled(memory));
        let runner =
            PipelineRunner::for_strategy(Strategy::BlueGreen, gateway.clone(), context(), poller());

        let report = runner.run(&quiet(), &mut Diagnostics::default()).await;

        assert!(report.succeeded(), "{report:?}");
        let memory = &gateway.0;
        assert!(memory.compute_group_fetches("green-asg") >= 4);
        assert!(memory.target_group_fetches("green-tg") >= 5);
        assert_eq!(
            memory.terminate_calls(),
            vec![vec![InstanceId::new("i-1"), InstanceId::new("i-2")]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn targeting_timeout_leaves_the_inactive_group_alone() {
        let gateway = Arc::new(settled_gateway().with_target_group(target_group(
            "green-tg",
            &[("i-3", TargetStatus::Healthy), ("i-4", TargetStatus::Unhealthy)],
        )));
        let poller = Poller::new(
            Duration::from_secs(10),
            WaitLimit::Within(Duration::from_secs(30)),
        );
        let runner =
            PipelineRunner::for_strategy(Strategy::BlueGreen, gateway.clone(), context(), poller);

        let report = runner.run(&quiet(), &mut Diagnostics::default()).await;

        assert_eq!(
            report.steps.iter().map(|s| s.state).collect::<Vec<_>>(),
            vec![StepState::Passed, StepState::Failed, StepState::NotStarted]
        );
        let failed = report.failed_step().unwrap();
        assert_eq!(failed.name, "wait-until-new-instances-are-targeted");
        assert!(failed.error.as_deref().unwrap().starts_with("gave up waiting"));
        assert!(gateway.terminate_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn verify_never_terminates() {
        let gateway = Arc::new(settled_gateway());
        let runner =
            PipelineRunner::for_strategy(Strategy::Verify, gateway.clone(), context(), poller());

        let report = runner.run(&quiet(), &mut Diagnostics::default()).await;

        assert!(report.succeeded());
        assert_eq!(report.steps.len(), 2);
        assert!(gateway.terminate_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_new_group_stops_the_pipeline_before_termination() {
        let gateway = Arc::new(
            MemoryGateway::new()
                .with_compute_group(group("blue-asg", 1, vec![ready("i-1")]))
                .with_target_group(healthy_targets(&[]))
                .with_load_balancer(load_balancer()),
        );
        let runner =
            PipelineRunner::for_strategy(Strategy::BlueGreen, gateway.clone(), context(), poller());

        let report = runner.run(&quiet(), &mut Diagnostics::default()).await;

        assert!(!report.succeeded());
        let failed = report.failed_step().unwrap();
        assert_eq!(failed.name, "wait-until-new-instances-are-healthy");
        assert!(failed.error.as_deref().unwrap().contains("green-asg"));
        assert_eq!(
            report
                .steps
                .iter()
                .map(|s| s.state)
                .collect::<Vec<_>>(),
            vec![StepState::Failed, StepState::NotStarted, StepState::NotStarted]
        );
        assert!(gateway.terminate_calls().is_empty());

        let err = report.into_result().unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_checks_warn_without_stopping_the_pipeline() {
        let gateway = Arc::new(LoadBalancerOutage(settled_gateway()));
        let runner =
            PipelineRunner::for_strategy(Strategy::BlueGreen, gateway, context(), poller());
        let mut diag = Diagnostics::default();

        let report = runner.run(&quiet(), &mut diag).await;

        assert!(report.succeeded());
        assert_eq!(diag.count(WarningKind::Verification), 1);
        let targeted = &report.steps[1];
        assert!(!targeted.pre_check.as_ref().unwrap().ok);
        assert!(targeted.post_check.as_ref().unwrap().ok);
    }

    #[test]
    fn blue_green_step_order() {
        let runner = PipelineRunner::for_strategy(
            Strategy::BlueGreen,
            Arc::new(MemoryGateway::new()),
            context(),
            poller(),
        );
        assert_eq!(
            runner.step_names(),
            vec![
                "wait-until-new-instances-are-healthy",
                "wait-until-new-instances-are-targeted",
                "terminate-inactive-instances",
            ]
        );
    }

    /// Memory gateway that refuses to terminate while the new group is unsettled.
    struct TerminateOnlyWhenSettled(MemoryGateway);

    #[async_trait]
    impl ResourceGateway for TerminateOnlyWhenSettled {
        async fn get_compute_group(
            &self,
            name: &ResourceName,
        ) -> Result<ComputeGroup, GatewayError> {
            self.0.get_compute_group(name).await
        }

        async fn get_target_group(&self, name: &ResourceName) -> Result<TargetGroup, GatewayError> {
            self.0.get_target_group(name).await
        }

        async fn get_load_balancer(
            &self,
            name: &ResourceName,
        ) -> Result<LoadBalancer, GatewayError> {
            self.0.get_load_balancer(name).await
        }

        async fn terminate_instances(
            &self,
            ids: &NonEmpty<InstanceId>,
        ) -> Result<(), GatewayError> {
            let group = self.0.get_compute_group(&name("green-asg")).await?;
            let targets = self.0.get_target_group(&name("green-tg")).await?;
            assert!(
                group.instances.iter().all(Instance::is_ready),
                "terminate issued before the new instances were healthy"
            );
            let snapshot = TargetingSnapshot::capture(&group, &targets);
            assert!(
                snapshot.is_settled(),
                "terminate issued before the new instances were targeted: {snapshot}"
            );
            self.0.terminate_instances(ids).await
        }

        async fn get_instance(&self, id: &InstanceId) -> Result<Instance, GatewayError> {
            self.0.get_instance(id).await
        }
    }

    /// Delegates to the memory gateway but cannot reach the load balancer API.
    struct LoadBalancerOutage(MemoryGateway);

    #[async_trait]
    impl ResourceGateway for LoadBalancerOutage {
        async fn get_compute_group(
            &self,
            name: &ResourceName,
        ) -> Result<ComputeGroup, GatewayError> {
            self.0.get_compute_group(name).await
        }

        async fn get_target_group(&self, name: &ResourceName) -> Result<TargetGroup, GatewayError> {
            self.0.get_target_group(name).await
        }

        async fn get_load_balancer(
            &self,
            _name: &ResourceName,
        ) -> Result<LoadBalancer, GatewayError> {
            Err(GatewayError::Rejected {
                status: 503,
                message: "load balancer API unavailable".to_string(),
            })
        }

        async fn terminate_instances(
            &self,
            ids: &NonEmpty<InstanceId>,
        ) -> Result<(), GatewayError> {
            self.0.terminate_instances(ids).await
        }

        async fn get_instance(&self, id: &InstanceId) -> Result<Instance, GatewayError> {
            self.0.get_instance(id).await
        }
    }
}
