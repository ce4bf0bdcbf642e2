//! Core data models shared across the orchestration pipeline

use crate::autoscale::AutoscaleConfig;
use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static DNS_LABEL: OnceLock<Regex> = OnceLock::new();
static QUANTITY: OnceLock<Regex> = OnceLock::new();

fn dns_label() -> &'static Regex {
    DNS_LABEL.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label pattern is valid")
    })
}

fn quantity() -> &'static Regex {
    QUANTITY.get_or_init(|| {
        Regex::new(r"^[0-9]+(\.[0-9]+)?(m|k|M|G|T|P|E|Ki|Mi|Gi|Ti|Pi|Ei)?$")
            .expect("quantity pattern is valid")
    })
}

/// Check a name against the RFC 1123 label rules the API server enforces
pub fn validate_dns_label(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.len() > 63 {
        return Err(format!("must be at most 63 characters (got {})", value.len()));
    }
    if !dns_label().is_match(value) {
        return Err(
            "must consist of lower case alphanumeric characters or '-', and start and end with an alphanumeric character"
                .to_string(),
        );
    }
    Ok(())
}

/// Longest name the API server accepts for a Service or a label value
const MAX_NAME_LEN: usize = 63;

/// Service names are RFC 1035 labels: an RFC 1123 label that starts with a letter
fn validate_service_name(value: &str) -> Result<(), String> {
    validate_dns_label(value)?;
    if !value.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err("must start with a lower case letter".to_string());
    }
    Ok(())
}

/// Name of the Service fronting `workload`
pub fn service_name(workload: &str) -> String {
    format!("{}-service", workload)
}

/// Name of the ScaledObject attached to `workload`
pub fn policy_name(workload: &str) -> String {
    format!("{}-scaled", workload)
}

/// Resource kinds the orchestrator writes or reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Deployment,
    Service,
    ScaledObject,
    Pod,
    CustomResourceDefinition,
}

impl ResourceKind {
    pub fn group(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "apps",
            ResourceKind::Service | ResourceKind::Pod => "",
            ResourceKind::ScaledObject => "keda.sh",
            ResourceKind::CustomResourceDefinition => "apiextensions.k8s.io",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            ResourceKind::ScaledObject => "v1alpha1",
            _ => "v1",
        }
    }

    pub fn api_version(&self) -> String {
        match self.group() {
            "" => self.version().to_string(),
            group => format!("{}/{}", group, self.version()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::ScaledObject => "ScaledObject",
            ResourceKind::Pod => "Pod",
            ResourceKind::CustomResourceDefinition => "CustomResourceDefinition",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
            ResourceKind::ScaledObject => "scaledobjects",
            ResourceKind::Pod => "pods",
            ResourceKind::CustomResourceDefinition => "customresourcedefinitions",
        }
    }

    pub fn namespaced(&self) -> bool {
        !matches!(self, ResourceKind::CustomResourceDefinition)
    }

    /// Whether this is an autoscaling-policy document
    pub fn is_policy(&self) -> bool {
        matches!(self, ResourceKind::ScaledObject)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Address of a single object in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }

    pub fn cluster_scoped(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            namespace: None,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// One resource document in a deployment plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    pub document: serde_json::Value,
}

impl Manifest {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            kind: self.kind,
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Container resource requests and limits as Kubernetes quantities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResources {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

impl Default for ContainerResources {
    fn default() -> Self {
        Self {
            cpu_request: "100m".to_string(),
            cpu_limit: "500m".to_string(),
            memory_request: "128Mi".to_string(),
            memory_limit: "512Mi".to_string(),
        }
    }
}

/// The workload to deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub image: String,
    pub tag: String,
    pub namespace: String,
    pub replicas: i32,
    pub ports: Vec<u16>,
    pub resources: ContainerResources,
}

impl WorkloadSpec {
    /// A spec with the defaults of the `deploy` command
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            tag: "latest".to_string(),
            namespace: "default".to_string(),
            replicas: 1,
            ports: vec![80],
            resources: ContainerResources::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Full image reference; keeps an explicit tag or digest on `image`
    pub fn image_reference(&self) -> String {
        let last_segment = self.image.rsplit('/').next().unwrap_or(&self.image);
        if self.image.contains('@') || last_segment.contains(':') || self.tag.is_empty() {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.tag)
        }
    }

    pub fn service_name(&self) -> String {
        service_name(&self.name)
    }

    pub fn policy_name(&self) -> String {
        policy_name(&self.name)
    }

    /// Key for serializing concurrent applies of the same workload
    pub fn lock_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Check every field, reporting all violations at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = ConfigError::new();

        match validate_dns_label(&self.name) {
            Err(reason) => errors.push("name", reason),
            // The Service is only generated when ports are exposed
            Ok(()) if !self.ports.is_empty() => {
                let service = self.service_name();
                if let Err(reason) = validate_service_name(&service) {
                    errors.push("name", format!("derived Service name '{}' {}", service, reason));
                }
            }
            Ok(()) => {}
        }
        if let Err(reason) = validate_dns_label(&self.namespace) {
            errors.push("namespace", reason);
        }
        if self.image.trim().is_empty() {
            errors.push("image", "must not be empty");
        } else if self.image.chars().any(char::is_whitespace) {
            errors.push("image", "must not contain whitespace");
        }
        if self.replicas < 0 {
            errors.push("replicas", format!("must be non-negative (got {})", self.replicas));
        }
        for (i, port) in self.ports.iter().enumerate() {
            if *port == 0 {
                errors.push(format!("ports[{}]", i), "must be between 1 and 65535");
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for port in &self.ports {
            if !seen.insert(port) {
                errors.push("ports", format!("port {} is listed more than once", port));
            }
        }

        let quantities = [
            ("cpu_request", &self.resources.cpu_request),
            ("cpu_limit", &self.resources.cpu_limit),
            ("memory_request", &self.resources.memory_request),
            ("memory_limit", &self.resources.memory_limit),
        ];
        for (field, value) in quantities {
            if !quantity().is_match(value) {
                errors.push(field, format!("'{}' is not a valid resource quantity", value));
            }
        }

        errors.into_result()
    }

    /// [`validate`](Self::validate) plus the limits of the ScaledObject name
    ///
    /// KEDA copies the ScaledObject name into a label value on the HPA it
    /// creates, so it is held to the label length limit.
    pub fn validate_autoscaled(&self) -> Result<(), ConfigError> {
        let mut errors = match self.validate() {
            Ok(()) => ConfigError::new(),
            Err(e) => e,
        };
        let policy = self.policy_name();
        if validate_dns_label(&self.name).is_ok() && policy.len() > MAX_NAME_LEN {
            errors.push(
                "name",
                format!(
                    "derived ScaledObject name '{}' must be at most {} characters (got {})",
                    policy,
                    MAX_NAME_LEN,
                    policy.len()
                ),
            );
        }
        errors.into_result()
    }
}

/// The immutable, ordered manifest set for one deploy invocation
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPlan {
    workload: WorkloadSpec,
    autoscale: Option<AutoscaleConfig>,
    manifests: Vec<Manifest>,
}

impl DeploymentPlan {
    pub(crate) fn new(
        workload: WorkloadSpec,
        autoscale: Option<AutoscaleConfig>,
        manifests: Vec<Manifest>,
    ) -> Self {
        Self {
            workload,
            autoscale,
            manifests,
        }
    }

    pub fn workload(&self) -> &WorkloadSpec {
        &self.workload
    }

    pub fn autoscale(&self) -> Option<&AutoscaleConfig> {
        self.autoscale.as_ref()
    }

    pub fn manifests(&self) -> &[Manifest] {
        &self.manifests
    }

    pub fn has_policy(&self) -> bool {
        self.manifests.iter().any(|m| m.kind.is_policy())
    }

    /// Render the plan as a multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut out = String::new();
        for manifest in &self.manifests {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(&manifest.document)?);
        }
        Ok(out)
    }
}
