//! Capability installation
//!
//! A capability is a cluster-side or local component the orchestrator needs
//! (Helm, KEDA). This module provides:
//! - The [`Installable`] seam each capability implements
//! - [`CapabilityInstaller`], which probes, installs and verifies idempotently
//! - The process runner used to shell out

mod command;
mod helm;
mod keda;

pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use helm::HelmRuntime;
pub use keda::{KedaOperator, REQUIRED_CRDS};

use crate::cluster::ClusterHandle;
use crate::error::{InstallCause, InstallError};
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use crate::retry::Cancellation;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use semver::{Op, Version, VersionReq};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What a capability provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    PackageManager,
    AutoscalerOperator,
}

impl CapabilityKind {
    /// Label value for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::PackageManager => "package_manager",
            CapabilityKind::AutoscalerOperator => "autoscaler_operator",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::PackageManager => write!(f, "package manager"),
            CapabilityKind::AutoscalerOperator => write!(f, "autoscaler operator"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    NotInstalled,
    Installing,
    Installed,
    Failed,
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityStatus::NotInstalled => write!(f, "not installed"),
            CapabilityStatus::Installing => write!(f, "installing"),
            CapabilityStatus::Installed => write!(f, "installed"),
            CapabilityStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Last known state of one capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub kind: CapabilityKind,
    pub name: String,
    pub constraint: VersionReq,
    pub installed_version: Option<Version>,
    pub status: CapabilityStatus,
}

impl Capability {
    /// Installed at a version the constraint accepts
    pub fn is_satisfied(&self) -> bool {
        self.status == CapabilityStatus::Installed
            && self
                .installed_version
                .as_ref()
                .map(|v| self.constraint.matches(v))
                .unwrap_or(false)
    }
}

/// Something the installer can detect and install
#[async_trait]
pub trait Installable: Send + Sync {
    fn kind(&self) -> CapabilityKind;

    /// Short human name (`helm`, `keda`)
    fn name(&self) -> &str;

    fn constraint(&self) -> &VersionReq;

    /// Capabilities that must be satisfied before this one installs
    fn prerequisites(&self) -> &[CapabilityKind] {
        &[]
    }

    /// Detect what is currently installed; `None` when absent or unhealthy
    async fn installed_version(&self, cluster: &ClusterHandle) -> Result<Option<Version>, InstallCause>;

    /// Version of an installation that exists but is not healthy
    ///
    /// Only consulted when [`installed_version`](Self::installed_version)
    /// reports nothing, so that a broken install is still guarded against
    /// downgrades.
    async fn present_version(&self, _cluster: &ClusterHandle) -> Result<Option<Version>, InstallCause> {
        Ok(None)
    }

    /// Install or upgrade; `current` is the detected version, if any
    async fn install(&self, cluster: &ClusterHandle, current: Option<&Version>) -> Result<(), InstallCause>;
}

/// Whether an already-satisfied capability is reinstalled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    /// Do nothing when the constraint already holds
    #[default]
    IfNeeded,
    /// Run the installer again to move to the newest allowed version
    Upgrade,
}

/// Attempts per install: the first try plus one retry
const INSTALL_ATTEMPTS: u32 = 2;

/// Brings capabilities to `Installed`, idempotently
pub struct CapabilityInstaller {
    records: DashMap<CapabilityKind, Capability>,
    logger: StructuredLogger,
    metrics: OrchestratorMetrics,
    cancel: Cancellation,
}

impl CapabilityInstaller {
    pub fn new(logger: StructuredLogger, metrics: OrchestratorMetrics) -> Self {
        Self {
            records: DashMap::new(),
            logger,
            metrics,
            cancel: Cancellation::never(),
        }
    }

    /// Abort probes and installs when `cancel` fires
    ///
    /// The in-flight future is dropped, which kills any running command.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    async fn guarded<T>(&self, work: impl Future<Output = Result<T, InstallCause>>) -> Result<T, InstallCause> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(InstallCause::Cancelled),
            result = work => result,
        }
    }

    /// Last recorded state of a capability, if it has been probed
    pub fn record(&self, kind: CapabilityKind) -> Option<Capability> {
        self.records.get(&kind).map(|r| r.value().clone())
    }

    fn is_satisfied(&self, kind: CapabilityKind) -> bool {
        self.record(kind).map(|c| c.is_satisfied()).unwrap_or(false)
    }

    fn store(&self, item: &dyn Installable, installed: Option<Version>, status: CapabilityStatus) -> Capability {
        let capability = Capability {
            kind: item.kind(),
            name: item.name().to_string(),
            constraint: item.constraint().clone(),
            installed_version: installed,
            status,
        };
        self.records.insert(capability.kind, capability.clone());
        capability
    }

    /// Probe a capability without changing anything
    pub async fn check(&self, item: &dyn Installable, cluster: &ClusterHandle) -> Result<Capability, InstallError> {
        let kind = item.kind();
        cluster.ensure_reachable().await.map_err(|e| {
            self.metrics.inc_probe_failures();
            InstallError::new(kind, e)
        })?;

        let installed = self
            .guarded(item.installed_version(cluster))
            .await
            .map_err(|cause| InstallError::new(kind, cause))?;

        let status = if installed.is_some() {
            CapabilityStatus::Installed
        } else {
            CapabilityStatus::NotInstalled
        };
        let capability = self.store(item, installed, status);
        self.logger.log_capability_checked(
            kind,
            item.name(),
            capability.installed_version.as_ref(),
            capability.is_satisfied(),
        );
        Ok(capability)
    }

    /// Make sure the capability is installed at a version the constraint accepts
    pub async fn ensure(&self, item: &dyn Installable, cluster: &ClusterHandle) -> Result<Capability, InstallError> {
        self.ensure_with(item, cluster, InstallMode::IfNeeded).await
    }

    pub async fn ensure_with(
        &self,
        item: &dyn Installable,
        cluster: &ClusterHandle,
        mode: InstallMode,
    ) -> Result<Capability, InstallError> {
        let kind = item.kind();
        let current = self.check(item, cluster).await?;

        let present = match &current.installed_version {
            Some(version) => Some(version.clone()),
            None => self
                .guarded(item.present_version(cluster))
                .await
                .map_err(|cause| InstallError::new(kind, cause))?,
        };

        if let Some(version) = &present {
            if current.is_satisfied() && mode == InstallMode::IfNeeded {
                self.logger.log_capability_noop(kind, item.name(), version);
                self.metrics.inc_capability(kind, "noop");
                return Ok(current);
            }
            if !current.constraint.matches(version) && exceeds_upper_bound(&current.constraint, version) {
                self.metrics.inc_capability(kind, "failed");
                return Err(InstallError::new(
                    kind,
                    InstallCause::WouldDowngrade {
                        installed: version.clone(),
                        required: current.constraint.clone(),
                    },
                ));
            }
        }

        for prerequisite in item.prerequisites() {
            if !self.is_satisfied(*prerequisite) {
                return Err(InstallError::new(kind, InstallCause::Prerequisite(*prerequisite)));
            }
        }

        self.install_verified(item, cluster, present).await
    }

    async fn install_verified(
        &self,
        item: &dyn Installable,
        cluster: &ClusterHandle,
        previous: Option<Version>,
    ) -> Result<Capability, InstallError> {
        let kind = item.kind();
        self.store(item, previous.clone(), CapabilityStatus::Installing);

        let mut attempt = 1;
        loop {
            self.logger.log_capability_installing(kind, item.name(), attempt);
            match self.guarded(self.attempt(item, cluster, previous.as_ref())).await {
                Ok(version) => {
                    self.logger.log_capability_installed(kind, item.name(), &version);
                    self.metrics.inc_capability(kind, "installed");
                    return Ok(self.store(item, Some(version), CapabilityStatus::Installed));
                }
                Err(cause) => {
                    self.logger
                        .log_capability_failed(kind, item.name(), attempt, &cause.to_string());
                    let final_cause = matches!(
                        cause,
                        InstallCause::Connectivity(_) | InstallCause::Cancelled | InstallCause::WouldDowngrade { .. }
                    );
                    if attempt >= INSTALL_ATTEMPTS || final_cause {
                        self.store(item, previous, CapabilityStatus::Failed);
                        self.metrics.inc_capability(kind, "failed");
                        return Err(InstallError::new(kind, cause));
                    }
                }
            }
            attempt += 1;
        }
    }

    /// One install plus re-detection
    async fn attempt(
        &self,
        item: &dyn Installable,
        cluster: &ClusterHandle,
        previous: Option<&Version>,
    ) -> Result<Version, InstallCause> {
        cluster.ensure_reachable().await?;
        item.install(cluster, previous).await?;

        let constraint = item.constraint();
        match item.installed_version(cluster).await? {
            Some(version) if constraint.matches(&version) => Ok(version),
            Some(version) => Err(InstallCause::Unsatisfied {
                installed: version,
                required: constraint.clone(),
            }),
            None => Err(InstallCause::Verification(format!(
                "{} was not detected after installing",
                item.name()
            ))),
        }
    }

    /// Ensure several capabilities, honouring prerequisites
    ///
    /// Probes run concurrently. Installs run in waves, each wave holding the
    /// capabilities whose prerequisites are already satisfied.
    pub async fn ensure_all(
        &self,
        items: &[Arc<dyn Installable>],
        cluster: &ClusterHandle,
        mode: InstallMode,
    ) -> Result<Vec<Capability>, InstallError> {
        let probes = join_all(items.iter().map(|item| self.check(item.as_ref(), cluster))).await;
        for probe in probes {
            probe?;
        }

        let mut pending: Vec<&Arc<dyn Installable>> = items
            .iter()
            .filter(|item| mode == InstallMode::Upgrade || !self.is_satisfied(item.kind()))
            .collect();

        while !pending.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = pending.iter().copied().partition(|item| {
                item.prerequisites()
                    .iter()
                    .all(|p| !pending.iter().any(|other| other.kind() == *p))
            });

            if ready.is_empty() {
                let stuck = blocked[0];
                let missing = stuck.prerequisites()[0];
                return Err(InstallError::new(stuck.kind(), InstallCause::Prerequisite(missing)));
            }

            let results = join_all(
                ready
                    .iter()
                    .map(|item| self.ensure_with(item.as_ref(), cluster, mode)),
            )
            .await;
            for result in results {
                result?;
            }
            pending = blocked;
        }

        Ok(items.iter().filter_map(|item| self.record(item.kind())).collect())
    }
}

/// True when `version` sits above everything `req` allows
///
/// Such a version can only be satisfied by a downgrade.
pub(crate) fn exceeds_upper_bound(req: &VersionReq, version: &Version) -> bool {
    req.comparators.iter().any(|comparator| {
        let single = VersionReq {
            comparators: vec![comparator.clone()],
        };
        if single.matches(version) {
            return false;
        }
        let floor = Version::new(
            comparator.major,
            comparator.minor.unwrap_or(0),
            comparator.patch.unwrap_or(0),
        );
        match comparator.op {
            Op::Less | Op::LessEq | Op::Exact | Op::Tilde | Op::Caret | Op::Wildcard => *version > floor,
            _ => false,
        }
    })
}
