//! Manifest generation
//!
//! Builds the ordered resource documents for a deploy. Output depends only
//! on the inputs: labels and maps are ordered, and nothing is read from the
//! cluster or the environment.

use crate::autoscale::{AutoscaleConfig, ScalingTrigger};
use crate::models::{DeploymentPlan, Manifest, ResourceKind, WorkloadSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Label carrying the workload name; also the pod selector
pub const APP_LABEL: &str = "app";
/// Label marking objects this tool manages
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Builds deployment plans
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    managed_by: String,
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new("kedaflow")
    }
}

impl ManifestBuilder {
    pub fn new(managed_by: impl Into<String>) -> Self {
        Self {
            managed_by: managed_by.into(),
        }
    }

    /// Build the plan: Deployment, then Service, then the scaling policy
    ///
    /// The policy references the Deployment by name, so it always comes
    /// last. Without an autoscale config no policy is generated at all.
    pub fn build(&self, workload: &WorkloadSpec, autoscale: Option<&AutoscaleConfig>) -> DeploymentPlan {
        let mut manifests = vec![self.deployment(workload)];
        if !workload.ports.is_empty() {
            manifests.push(self.service(workload));
        }
        if let Some(config) = autoscale {
            manifests.push(self.scaled_object(workload, config));
        }

        DeploymentPlan::new(workload.clone(), autoscale.cloned(), manifests)
    }

    fn labels(&self, workload: &WorkloadSpec) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.to_string(), workload.name.clone()),
            (MANAGED_BY_LABEL.to_string(), self.managed_by.clone()),
        ])
    }

    fn selector(workload: &WorkloadSpec) -> BTreeMap<String, String> {
        BTreeMap::from([(APP_LABEL.to_string(), workload.name.clone())])
    }

    fn deployment(&self, workload: &WorkloadSpec) -> Manifest {
        let resources = &workload.resources;
        let container = Container {
            name: workload.name.clone(),
            image: Some(workload.image_reference()),
            ports: Some(
                workload
                    .ports
                    .iter()
                    .map(|port| ContainerPort {
                        container_port: i32::from(*port),
                        ..Default::default()
                    })
                    .collect(),
            )
            .filter(|ports: &Vec<ContainerPort>| !ports.is_empty()),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(resources.cpu_request.clone())),
                    ("memory".to_string(), Quantity(resources.memory_request.clone())),
                ])),
                limits: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(resources.cpu_limit.clone())),
                    ("memory".to_string(), Quantity(resources.memory_limit.clone())),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some(workload.name.clone()),
                namespace: Some(workload.namespace.clone()),
                labels: Some(self.labels(workload)),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(workload.replicas),
                selector: LabelSelector {
                    match_labels: Some(Self::selector(workload)),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels(workload)),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        Manifest {
            kind: ResourceKind::Deployment,
            name: workload.name.clone(),
            namespace: Some(workload.namespace.clone()),
            document: to_document(&deployment),
        }
    }

    fn service(&self, workload: &WorkloadSpec) -> Manifest {
        let service = Service {
            metadata: ObjectMeta {
                name: Some(workload.service_name()),
                namespace: Some(workload.namespace.clone()),
                labels: Some(self.labels(workload)),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(Self::selector(workload)),
                ports: Some(
                    workload
                        .ports
                        .iter()
                        .map(|port| ServicePort {
                            name: Some(format!("port-{}", port)),
                            port: i32::from(*port),
                            target_port: Some(IntOrString::Int(i32::from(*port))),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        };

        Manifest {
            kind: ResourceKind::Service,
            name: workload.service_name(),
            namespace: Some(workload.namespace.clone()),
            document: to_document(&service),
        }
    }

    fn scaled_object(&self, workload: &WorkloadSpec, config: &AutoscaleConfig) -> Manifest {
        let mut spec = Map::new();
        spec.insert(
            "scaleTargetRef".to_string(),
            json!({
                "apiVersion": ResourceKind::Deployment.api_version(),
                "kind": ResourceKind::Deployment.kind(),
                "name": workload.name,
            }),
        );
        spec.insert("pollingInterval".to_string(), json!(config.polling_interval.as_secs()));
        spec.insert("cooldownPeriod".to_string(), json!(config.cooldown_period.as_secs()));
        spec.insert("minReplicaCount".to_string(), json!(config.min_replicas()));
        spec.insert("maxReplicaCount".to_string(), json!(config.max_replicas()));
        if let Some(fallback) = &config.fallback {
            spec.insert(
                "fallback".to_string(),
                json!({
                    "failureThreshold": fallback.failure_threshold,
                    "replicas": fallback.replicas,
                }),
            );
        }
        spec.insert(
            "triggers".to_string(),
            Value::Array(config.triggers.iter().map(trigger_document).collect()),
        );

        let name = workload.policy_name();
        let document = json!({
            "apiVersion": ResourceKind::ScaledObject.api_version(),
            "kind": ResourceKind::ScaledObject.kind(),
            "metadata": {
                "name": name,
                "namespace": workload.namespace,
                "labels": self.labels(workload),
            },
            "spec": spec,
        });

        Manifest {
            kind: ResourceKind::ScaledObject,
            name,
            namespace: Some(workload.namespace.clone()),
            document,
        }
    }
}

fn trigger_document(trigger: &ScalingTrigger) -> Value {
    let mut doc = Map::new();
    doc.insert("type".to_string(), json!(trigger.kind));
    if let Some(name) = &trigger.name {
        doc.insert("name".to_string(), json!(name));
    }
    doc.insert("metadata".to_string(), json!(trigger.metadata));
    if let Some(metric_type) = trigger.metric_type {
        doc.insert("metricType".to_string(), json!(metric_type.as_str()));
    }
    if let Some(auth) = &trigger.authentication_ref {
        doc.insert("authenticationRef".to_string(), json!({ "name": auth }));
    }
    Value::Object(doc)
}

fn to_document<T: Serialize>(resource: &T) -> Value {
    // k8s-openapi objects only hold string-keyed maps, so this cannot fail
    serde_json::to_value(resource).expect("Kubernetes objects serialize to JSON")
}
