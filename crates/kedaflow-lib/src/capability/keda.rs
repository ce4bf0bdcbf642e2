//! KEDA, the autoscaler-operator capability
//!
//! Installed through its Helm chart. Counted as installed only once the
//! operator deployment has a ready replica and both custom resource
//! definitions are registered.

use super::command::{run_checked, CommandRunner};
use super::{CapabilityKind, Installable};
use crate::cluster::ClusterHandle;
use crate::error::InstallCause;
use crate::models::{ResourceKind, ResourceRef};
use crate::settings::KedaSettings;
use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const OPERATOR_DEPLOYMENT: &str = "keda-operator";
const VERSION_LABEL: &str = "app.kubernetes.io/version";

/// Custom resource definitions the operator must have registered
pub const REQUIRED_CRDS: &[&str] = &["scaledobjects.keda.sh", "triggerauthentications.keda.sh"];

/// The KEDA operator running in the cluster
pub struct KedaOperator {
    runner: Arc<dyn CommandRunner>,
    helm_binary: String,
    settings: KedaSettings,
    constraint: VersionReq,
    command_timeout: Duration,
}

impl KedaOperator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        helm_binary: impl Into<String>,
        settings: &KedaSettings,
        command_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            helm_binary: helm_binary.into(),
            constraint: settings.version_constraint.clone(),
            settings: settings.clone(),
            command_timeout,
        }
    }

    pub fn with_constraint(mut self, constraint: VersionReq) -> Self {
        self.constraint = constraint;
        self
    }

    fn repo_add_args(&self) -> Vec<String> {
        vec![
            "repo".to_string(),
            "add".to_string(),
            self.settings.repo_name.clone(),
            self.settings.repo_url.clone(),
            "--force-update".to_string(),
        ]
    }

    fn repo_update_args(&self) -> Vec<String> {
        vec![
            "repo".to_string(),
            "update".to_string(),
            self.settings.repo_name.clone(),
        ]
    }

    fn operator_ref(&self) -> ResourceRef {
        ResourceRef::namespaced(ResourceKind::Deployment, &self.settings.namespace, OPERATOR_DEPLOYMENT)
    }

    async fn operator_deployment(&self, cluster: &ClusterHandle) -> Result<Option<Value>, InstallCause> {
        cluster
            .api()
            .get(&self.operator_ref())
            .await
            .map_err(|e| InstallCause::Cluster(e.to_string()))
    }

    /// Refuse a pinned chart version older than what is running
    fn check_pin(&self, current: Option<&Version>) -> Result<(), InstallCause> {
        let (Some(current), Some(pin)) = (current, &self.settings.chart_version) else {
            return Ok(());
        };
        let Ok(pinned) = Version::parse(pin.trim_start_matches('v')) else {
            return Ok(());
        };
        if pinned < *current {
            let required = VersionReq::parse(&format!("={}", pinned))
                .map_err(|e| InstallCause::Detection(format!("chart version {:?}: {}", pin, e)))?;
            return Err(InstallCause::WouldDowngrade {
                installed: current.clone(),
                required,
            });
        }
        Ok(())
    }

    pub(crate) fn upgrade_args(&self, cluster: &ClusterHandle) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.settings.release.clone(),
            self.settings.chart.clone(),
            "--namespace".to_string(),
            self.settings.namespace.clone(),
            "--create-namespace".to_string(),
            "--wait".to_string(),
            "--timeout".to_string(),
            format!("{}s", self.command_timeout.as_secs()),
        ];
        if let Some(version) = &self.settings.chart_version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        for (key, value) in &self.settings.values {
            args.push("--set".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.extend(cluster.credentials().helm_args());
        args
    }
}

/// Version of a running operator, from its label or else its image tag
pub(crate) fn operator_version(deployment: &Value) -> Option<String> {
    if let Some(label) = deployment["metadata"]["labels"][VERSION_LABEL].as_str() {
        return Some(label.to_string());
    }
    let image = deployment["spec"]["template"]["spec"]["containers"][0]["image"].as_str()?;
    let name = image.rsplit('/').next()?;
    let (_, tag) = name.split_once(':')?;
    Some(tag.to_string())
}

fn parse_operator_version(target: &ResourceRef, deployment: &Value) -> Result<Version, InstallCause> {
    let raw = operator_version(deployment).ok_or_else(|| {
        InstallCause::Detection(format!("{} carries no version label or image tag", target))
    })?;
    Version::parse(raw.trim_start_matches('v'))
        .map_err(|e| InstallCause::Detection(format!("operator version {:?}: {}", raw, e)))
}

fn ready_replicas(deployment: &Value) -> i64 {
    deployment["status"]["readyReplicas"].as_i64().unwrap_or(0)
}

#[async_trait]
impl Installable for KedaOperator {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::AutoscalerOperator
    }

    fn name(&self) -> &str {
        "keda"
    }

    fn constraint(&self) -> &VersionReq {
        &self.constraint
    }

    fn prerequisites(&self) -> &[CapabilityKind] {
        &[CapabilityKind::PackageManager]
    }

    async fn installed_version(&self, cluster: &ClusterHandle) -> Result<Option<Version>, InstallCause> {
        let api = cluster.api();
        let target = self.operator_ref();
        let deployment = match self.operator_deployment(cluster).await? {
            Some(deployment) => deployment,
            None => return Ok(None),
        };

        if ready_replicas(&deployment) < 1 {
            debug!(deployment = %target, "Operator deployment has no ready replica");
            return Ok(None);
        }

        for crd in REQUIRED_CRDS {
            let crd_ref = ResourceRef::cluster_scoped(ResourceKind::CustomResourceDefinition, *crd);
            let found = api
                .get(&crd_ref)
                .await
                .map_err(|e| InstallCause::Cluster(e.to_string()))?;
            if found.is_none() {
                debug!(crd = %crd, "Required CRD missing");
                return Ok(None);
            }
        }

        parse_operator_version(&target, &deployment).map(Some)
    }

    async fn present_version(&self, cluster: &ClusterHandle) -> Result<Option<Version>, InstallCause> {
        match self.operator_deployment(cluster).await? {
            Some(deployment) => match parse_operator_version(&self.operator_ref(), &deployment) {
                Ok(version) => Ok(Some(version)),
                Err(e) => {
                    debug!(error = %e, "Operator deployment present without a readable version");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn install(&self, cluster: &ClusterHandle, current: Option<&Version>) -> Result<(), InstallCause> {
        debug!(current = ?current.map(|v| v.to_string()), "Installing KEDA through helm");
        self.check_pin(current)?;
        let runner = self.runner.as_ref();

        run_checked(runner, &self.helm_binary, &self.repo_add_args(), self.command_timeout).await?;
        run_checked(runner, &self.helm_binary, &self.repo_update_args(), self.command_timeout).await?;
        run_checked(runner, &self.helm_binary, &self.upgrade_args(cluster), self.command_timeout).await?;
        Ok(())
    }
}
