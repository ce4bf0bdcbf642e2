//! Helm, the package-manager capability

use super::command::{display_command, run_checked, CommandRunner};
use super::{CapabilityKind, Installable};
use crate::cluster::ClusterHandle;
use crate::error::InstallCause;
use crate::settings::HelmSettings;
use async_trait::async_trait;
use semver::{Version, VersionReq};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Local Helm client installation
pub struct HelmRuntime {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    constraint: VersionReq,
    install_command: Vec<String>,
    command_timeout: Duration,
}

impl HelmRuntime {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: &HelmSettings) -> Self {
        Self {
            runner,
            binary: settings.binary.clone(),
            constraint: settings.version_constraint.clone(),
            install_command: settings.install_command.clone(),
            command_timeout: settings.command_timeout(),
        }
    }

    pub fn with_constraint(mut self, constraint: VersionReq) -> Self {
        self.constraint = constraint;
        self
    }

    fn version_args() -> Vec<String> {
        vec!["version".to_string(), "--short".to_string()]
    }
}

/// Parse `helm version --short` output such as `v3.14.2+gc309b6f`
pub(crate) fn parse_helm_version(output: &str) -> Option<Version> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    Version::parse(line.trim_start_matches('v')).ok()
}

#[async_trait]
impl Installable for HelmRuntime {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::PackageManager
    }

    fn name(&self) -> &str {
        "helm"
    }

    fn constraint(&self) -> &VersionReq {
        &self.constraint
    }

    async fn installed_version(&self, _cluster: &ClusterHandle) -> Result<Option<Version>, InstallCause> {
        let args = Self::version_args();
        let output = match self.runner.run(&self.binary, &args, self.command_timeout).await {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(binary = %self.binary, "Helm binary not found");
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(InstallCause::CommandTimeout {
                    command: display_command(&self.binary, &args),
                    timeout: self.command_timeout,
                })
            }
            Err(e) => return Err(InstallCause::Detection(e.to_string())),
        };

        if !output.success() {
            debug!(stderr = %output.stderr.trim(), "helm version failed, treating as not installed");
            return Ok(None);
        }

        parse_helm_version(&output.stdout)
            .map(Some)
            .ok_or_else(|| {
                InstallCause::Detection(format!(
                    "unrecognised `helm version` output: {:?}",
                    output.stdout.trim()
                ))
            })
    }

    async fn install(&self, _cluster: &ClusterHandle, _current: Option<&Version>) -> Result<(), InstallCause> {
        let (program, args) = self.install_command.split_first().ok_or_else(|| {
            InstallCause::Detection("no helm install command is configured".to_string())
        })?;
        run_checked(self.runner.as_ref(), program, args, self.command_timeout).await?;
        Ok(())
    }
}
