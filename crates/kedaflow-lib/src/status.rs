//! Live status of a deployed workload

use crate::cluster::{ClusterApiError, ClusterHandle};
use crate::manifest::APP_LABEL;
use crate::models::{policy_name, ResourceKind, ResourceRef};
use crate::orchestrator::{condition, ReplicaCounts};
use serde::Serialize;
use serde_json::Value;

/// One pod of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodStatus {
    pub name: String,
    pub phase: String,
    pub ready: bool,
    pub restarts: i64,
    pub node: Option<String>,
}

/// The ScaledObject attached to a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyStatus {
    pub name: String,
    pub ready: Option<bool>,
    pub active: Option<bool>,
    pub min_replicas: Option<i64>,
    pub max_replicas: Option<i64>,
}

/// Snapshot of a workload as the cluster reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadStatus {
    pub name: String,
    pub namespace: String,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub unavailable_replicas: i32,
    /// Deployment conditions as `(type, status)`
    pub conditions: Vec<(String, String)>,
    pub pods: Vec<PodStatus>,
    pub policy: Option<PolicyStatus>,
}

impl WorkloadStatus {
    pub fn is_ready(&self) -> bool {
        self.ready_replicas >= self.desired_replicas
    }
}

fn pod_status(pod: &Value) -> PodStatus {
    let statuses = pod["status"]["containerStatuses"].as_array();
    let ready = statuses
        .map(|s| !s.is_empty() && s.iter().all(|c| c["ready"].as_bool() == Some(true)))
        .unwrap_or(false);
    let restarts = statuses
        .map(|s| s.iter().filter_map(|c| c["restartCount"].as_i64()).sum())
        .unwrap_or(0);

    PodStatus {
        name: pod["metadata"]["name"].as_str().unwrap_or_default().to_string(),
        phase: pod["status"]["phase"].as_str().unwrap_or("Unknown").to_string(),
        ready,
        restarts,
        node: pod["spec"]["nodeName"].as_str().map(str::to_string),
    }
}

fn policy_status(name: String, doc: &Value) -> PolicyStatus {
    PolicyStatus {
        name,
        ready: condition(doc, "Ready"),
        active: condition(doc, "Active"),
        min_replicas: doc["spec"]["minReplicaCount"].as_i64(),
        max_replicas: doc["spec"]["maxReplicaCount"].as_i64(),
    }
}

/// Read the workload, its pods and its scaling policy; `None` if not deployed
pub async fn workload_status(
    cluster: &ClusterHandle,
    namespace: &str,
    name: &str,
) -> Result<Option<WorkloadStatus>, ClusterApiError> {
    let api = cluster.api();
    let deployment = match api
        .get(&ResourceRef::namespaced(ResourceKind::Deployment, namespace, name))
        .await?
    {
        Some(deployment) => deployment,
        None => return Ok(None),
    };

    let counts = ReplicaCounts::from_deployment(&deployment);
    let conditions = deployment["status"]["conditions"]
        .as_array()
        .map(|list| {
            list.iter()
                .map(|c| {
                    (
                        c["type"].as_str().unwrap_or_default().to_string(),
                        c["status"].as_str().unwrap_or_default().to_string(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let selector = format!("{}={}", APP_LABEL, name);
    let pods = api
        .list(ResourceKind::Pod, namespace, &selector)
        .await?
        .iter()
        .map(pod_status)
        .collect();

    let scaled_name = policy_name(name);
    let policy = api
        .get(&ResourceRef::namespaced(ResourceKind::ScaledObject, namespace, &scaled_name))
        .await?
        .map(|doc| policy_status(scaled_name, &doc));

    Ok(Some(WorkloadStatus {
        name: name.to_string(),
        namespace: namespace.to_string(),
        desired_replicas: counts.desired,
        ready_replicas: counts.ready,
        available_replicas: counts.available,
        unavailable_replicas: deployment["status"]["unavailableReplicas"].as_i64().unwrap_or(0) as i32,
        conditions,
        pods,
        policy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoscale::ConfigValidator;
    use crate::manifest::ManifestBuilder;
    use crate::models::WorkloadSpec;
    use crate::testing::{handle_for, FakeCluster};
    use serde_json::json;
    use std::sync::Arc;

    fn pod(name: &str, app: &str, ready: bool, restarts: i64) -> Value {
        json!({
            "metadata": {"name": name, "namespace": "default", "labels": {"app": app}},
            "spec": {"nodeName": "minikube"},
            "status": {
                "phase": "Running",
                "containerStatuses": [{"name": "app", "ready": ready, "restartCount": restarts}]
            }
        })
    }

    #[tokio::test]
    async fn test_missing_workload_is_none() {
        let handle = handle_for(Arc::new(FakeCluster::new())).await;
        assert!(workload_status(&handle, "default", "app1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reports_replicas_pods_and_policy() {
        let cluster = Arc::new(FakeCluster::new());
        let handle = handle_for(cluster.clone()).await;

        let autoscale = ConfigValidator::default()
            .validate(&json!({
                "min_replicas": 0,
                "max_replicas": 5,
                "triggers": [{"type": "rabbitmq", "metadata": {"queueName": "orders", "value": "5"}}]
            }))
            .unwrap();
        let plan = ManifestBuilder::default().build(&WorkloadSpec::new("app1", "nginx"), Some(&autoscale));
        for manifest in plan.manifests() {
            handle.api().apply(manifest).await.unwrap();
        }
        cluster.insert(
            ResourceRef::namespaced(ResourceKind::Pod, "default", "app1-7d9c-abcde"),
            pod("app1-7d9c-abcde", "app1", true, 2),
        );
        cluster.insert(
            ResourceRef::namespaced(ResourceKind::Pod, "default", "other-5f6b-xyz"),
            pod("other-5f6b-xyz", "other", false, 0),
        );

        let status = workload_status(&handle, "default", "app1").await.unwrap().unwrap();
        assert_eq!(status.desired_replicas, 1);
        assert_eq!(status.ready_replicas, 1);
        assert!(status.is_ready());

        assert_eq!(status.pods.len(), 1);
        assert_eq!(status.pods[0].name, "app1-7d9c-abcde");
        assert!(status.pods[0].ready);
        assert_eq!(status.pods[0].restarts, 2);
        assert_eq!(status.pods[0].node.as_deref(), Some("minikube"));

        let policy = status.policy.unwrap();
        assert_eq!(policy.name, "app1-scaled");
        assert_eq!(policy.ready, Some(true));
        assert_eq!(policy.active, Some(false));
        assert_eq!(policy.min_replicas, Some(0));
        assert_eq!(policy.max_replicas, Some(5));
    }

    #[test]
    fn test_pod_without_container_statuses_is_not_ready() {
        let status = pod_status(&json!({"metadata": {"name": "p"}, "status": {"phase": "Pending"}}));
        assert!(!status.ready);
        assert_eq!(status.phase, "Pending");
        assert_eq!(status.restarts, 0);
    }
}
