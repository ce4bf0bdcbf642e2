use super::*;
use crate::autoscale::{AutoscaleConfig, ConfigValidator};
use crate::capability::{CapabilityInstaller, HelmRuntime, InstallMode, Installable, KedaOperator};
use crate::cluster::Credentials;
use crate::error::FailureClass;
use crate::manifest::ManifestBuilder;
use crate::models::WorkloadSpec;
use crate::retry::cancellation;
use crate::settings::Settings;
use crate::testing::{handle_for, ok, FakeCluster, FakeRunner};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

const ENDPOINT: &str = "https://127.0.0.1:6443";

fn poll_policy(deadline: Duration) -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        max_attempts: 1_000,
        deadline,
    }
}

fn orchestrator(deadline: Duration) -> DeploymentOrchestrator {
    DeploymentOrchestrator::new(
        Duration::from_secs(1),
        poll_policy(deadline),
        StructuredLogger::new("test"),
        OrchestratorMetrics::new(),
    )
}

fn queue_autoscale() -> AutoscaleConfig {
    ConfigValidator::default()
        .validate(&json!({
            "min_replicas": 0,
            "max_replicas": 5,
            "triggers": [{
                "type": "rabbitmq",
                "metadata": {"queueName": "orders", "mode": "QueueLength", "value": "5"}
            }]
        }))
        .unwrap()
}

fn app1_plan() -> DeploymentPlan {
    let workload = WorkloadSpec::new("app1", "nginx").with_replicas(1);
    ManifestBuilder::default().build(&workload, Some(&queue_autoscale()))
}

#[tokio::test]
async fn test_end_to_end_autoscaled_deploy() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.install_keda("2.13.0");
    let handle = handle_for(cluster.clone()).await;

    // Both capabilities already present: ensuring them changes nothing
    let runner = Arc::new(FakeRunner::new());
    runner.respond("helm version", ok("v3.14.2+gc309b6f"));
    let settings = Settings::default();
    let items: Vec<Arc<dyn Installable>> = vec![
        Arc::new(HelmRuntime::new(runner.clone(), &settings.helm)),
        Arc::new(KedaOperator::new(
            runner.clone(),
            "helm",
            &settings.keda,
            settings.helm.command_timeout(),
        )),
    ];
    let installer = CapabilityInstaller::new(StructuredLogger::new("test"), OrchestratorMetrics::new());
    let capabilities = installer
        .ensure_all(&items, &handle, InstallMode::IfNeeded)
        .await
        .unwrap();
    assert!(capabilities.iter().all(|c| c.is_satisfied()));
    assert_eq!(runner.calls_starting_with("helm upgrade"), 0);

    let result = orchestrator(Duration::from_secs(5))
        .apply(app1_plan(), &handle, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(
        result.phases,
        vec![
            DeploymentPhase::Pending,
            DeploymentPhase::Applying,
            DeploymentPhase::Converging,
            DeploymentPhase::Succeeded,
        ]
    );
    assert_eq!(result.phase(), DeploymentPhase::Succeeded);
    assert_eq!(
        result.applied,
        vec!["Deployment/app1", "Service/app1-service", "ScaledObject/app1-scaled"]
    );
    assert_eq!(result.desired_replicas, 1);
    assert_eq!(result.ready_replicas, 1);
    assert!(result.is_ready());
    assert_eq!(result.policy_active, Some(true));
    assert!(result.finished_at >= result.started_at);
}

#[tokio::test]
async fn test_rejected_manifest_is_reported_by_index() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.reject("app1-service");
    let handle = handle_for(cluster.clone()).await;

    let err = orchestrator(Duration::from_secs(5))
        .apply(app1_plan(), &handle, &Cancellation::never())
        .await
        .unwrap_err();

    match &err {
        ApplyError::Rejected {
            index,
            total,
            manifest,
            reason,
        } => {
            assert_eq!(*index, 2);
            assert_eq!(*total, 3);
            assert_eq!(manifest, "Service/app1-service");
            assert!(reason.contains("422"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.stage(), ApplyStage::Applying);
    // Manifest 1 stays applied, manifest 3 is never attempted
    assert_eq!(cluster.applied_names(), vec!["app1"]);
    assert_eq!(FailureClass::of(&err), FailureClass::Apply);
}

#[tokio::test]
async fn test_convergence_timeout_is_not_a_rejection() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.set_converge(false);
    let handle = handle_for(cluster.clone()).await;

    let err = orchestrator(Duration::from_millis(150))
        .apply(app1_plan(), &handle, &Cancellation::never())
        .await
        .unwrap_err();

    match &err {
        ApplyError::Timeout {
            stage,
            index,
            manifest,
            detail,
            ..
        } => {
            assert_eq!(*stage, ApplyStage::Converging);
            assert_eq!(*index, Some(1));
            assert_eq!(manifest.as_deref(), Some("Deployment/app1"));
            assert!(detail.contains("Deployment/app1"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // Everything was accepted; only readiness is missing
    assert_eq!(cluster.applied_names().len(), 3);
}

#[tokio::test]
async fn test_cancellation_during_convergence() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.set_converge(false);
    let handle = handle_for(cluster).await;

    let (cancel_handle, cancel) = cancellation();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_handle.cancel();
    });

    let err = orchestrator(Duration::from_secs(30))
        .apply(app1_plan(), &handle, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApplyError::Cancelled {
            stage: ApplyStage::Converging,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancelled_before_apply_touches_nothing() {
    let cluster = Arc::new(FakeCluster::new());
    let handle = handle_for(cluster.clone()).await;

    let (cancel_handle, cancel) = cancellation();
    cancel_handle.cancel();

    let err = orchestrator(Duration::from_secs(5))
        .apply(app1_plan(), &handle, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApplyError::Cancelled {
            stage: ApplyStage::Applying,
            ..
        }
    ));
    assert!(cluster.applied_names().is_empty());
}

#[tokio::test]
async fn test_unreachable_cluster_stops_apply_as_connectivity_failure() {
    let cluster = Arc::new(FakeCluster::new());
    let handle = handle_for(cluster.clone()).await;
    cluster.set_reachable(false);

    let err = orchestrator(Duration::from_secs(5))
        .apply(app1_plan(), &handle, &Cancellation::never())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApplyError::Connectivity {
            stage: ApplyStage::Applying,
            index: Some(1),
            ..
        }
    ));
    assert_eq!(FailureClass::of(&err), FailureClass::Connectivity);
    assert!(cluster.applied_names().is_empty());
}

#[tokio::test]
async fn test_plan_without_policy_converges_without_policy_status() {
    let cluster = Arc::new(FakeCluster::new());
    let handle = handle_for(cluster.clone()).await;
    let plan = ManifestBuilder::default().build(&WorkloadSpec::new("web", "nginx").with_replicas(2), None);

    let result = orchestrator(Duration::from_secs(5))
        .apply(plan, &handle, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(result.applied, vec!["Deployment/web", "Service/web-service"]);
    assert_eq!(result.ready_replicas, 2);
    assert_eq!(result.policy_active, None);
}

#[tokio::test]
async fn test_reapplying_the_same_plan_succeeds() {
    let cluster = Arc::new(FakeCluster::new());
    let handle = handle_for(cluster.clone()).await;
    let orchestrator = orchestrator(Duration::from_secs(5));

    orchestrator
        .apply(app1_plan(), &handle, &Cancellation::never())
        .await
        .unwrap();
    let second = orchestrator
        .apply(app1_plan(), &handle, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(second.phase(), DeploymentPhase::Succeeded);
    assert_eq!(cluster.applied_names().len(), 6);
}

#[tokio::test]
async fn test_same_workload_applies_are_serialized() {
    let cluster = Arc::new(FakeCluster::new());
    let handle = Arc::new(handle_for(cluster.clone()).await);
    let orchestrator = Arc::new(orchestrator(Duration::from_secs(5)));

    let guard = orchestrator.locks().acquire("default/app1").await;

    let task = {
        let orchestrator = orchestrator.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            orchestrator
                .apply(app1_plan(), &handle, &Cancellation::never())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cluster.applied_names().is_empty());

    drop(guard);
    let result = task.await.unwrap().unwrap();
    assert_eq!(result.phase(), DeploymentPhase::Succeeded);
    assert_eq!(cluster.applied_names().len(), 3);
}

#[test]
fn test_phase_transitions() {
    use DeploymentPhase::*;
    assert!(Pending.can_transition_to(Applying));
    assert!(Applying.can_transition_to(Converging));
    assert!(Converging.can_transition_to(Succeeded));
    assert!(Converging.can_transition_to(Failed));
    assert!(!Pending.can_transition_to(Succeeded));
    assert!(!Succeeded.can_transition_to(Failed));
    assert!(Failed.is_terminal());
    assert!(!Converging.is_terminal());
}

fn connector() -> ClusterConnector {
    ClusterConnector::new(Duration::from_millis(200), Duration::from_secs(1), "kedaflow")
}

#[tokio::test]
async fn test_retry_connect_waits_for_cluster() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.set_reachable(false);
    let connector = connector();
    let calls = AtomicUsize::new(0);

    let handle = retry_connect(&poll_policy(Duration::from_secs(5)), &Cancellation::never(), || {
        if calls.fetch_add(1, Ordering::SeqCst) == 2 {
            cluster.set_reachable(true);
        }
        connector.attach(ENDPOINT, Credentials::default(), cluster.clone())
    })
    .await
    .unwrap();

    assert_eq!(handle.endpoint(), ENDPOINT);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_connect_gives_up_after_max_attempts() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.set_reachable(false);
    let connector = connector();
    let policy = RetryPolicy {
        max_attempts: 3,
        ..poll_policy(Duration::from_secs(5))
    };

    let err = retry_connect(&policy, &Cancellation::never(), || {
        connector.attach(ENDPOINT, Credentials::default(), cluster.clone())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ConnectivityError::Unreachable { .. }));
    assert_eq!(cluster.probe_count(), 3);
}

#[tokio::test]
async fn test_retry_connect_does_not_retry_credential_errors() {
    let calls = AtomicUsize::new(0);
    let err = retry_connect(&poll_policy(Duration::from_secs(5)), &Cancellation::never(), || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(ConnectivityError::Credentials("no kubeconfig found".to_string())) }
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ConnectivityError::Credentials(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
