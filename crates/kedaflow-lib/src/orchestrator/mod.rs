//! Deployment orchestration
//!
//! Applies a [`DeploymentPlan`] manifest by manifest and waits for the
//! cluster to converge. Each plan walks the phase machine
//! `Pending -> Applying -> Converging -> Succeeded | Failed`.

mod convergence;
mod lock;

pub use convergence::{condition, evaluate, Readiness, ReplicaCounts};
pub use lock::WorkloadLocks;

use crate::cluster::{ClusterApiError, ClusterConnector, ClusterHandle, EndpointHint};
use crate::error::{ApplyError, ApplyStage, ConnectivityError};
use crate::models::{DeploymentPlan, Manifest, ResourceKind};
use crate::observability::{OrchestratorMetrics, StructuredLogger};
use crate::retry::{Cancellation, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Lifecycle of one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPhase {
    Pending,
    Applying,
    Converging,
    Succeeded,
    Failed,
}

impl DeploymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentPhase::Pending => "pending",
            DeploymentPhase::Applying => "applying",
            DeploymentPhase::Converging => "converging",
            DeploymentPhase::Succeeded => "succeeded",
            DeploymentPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentPhase::Succeeded | DeploymentPhase::Failed)
    }

    pub fn can_transition_to(&self, next: DeploymentPhase) -> bool {
        use DeploymentPhase::*;
        matches!(
            (self, next),
            (Pending, Applying)
                | (Applying, Converging)
                | (Converging, Succeeded)
                | (Pending | Applying | Converging, Failed)
        )
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a converged deployment
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    pub workload: String,
    pub namespace: String,
    /// Every phase the plan passed through, in order
    pub phases: Vec<DeploymentPhase>,
    /// Applied manifests as `Kind/name`, in apply order
    pub applied: Vec<String>,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    /// ScaledObject reports Ready; `None` without a policy
    pub policy_active: Option<bool>,
    /// Triggers are currently driving scale; `None` when unreported
    pub scaling_active: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentResult {
    pub fn phase(&self) -> DeploymentPhase {
        self.phases.last().copied().unwrap_or(DeploymentPhase::Pending)
    }

    pub fn is_ready(&self) -> bool {
        self.ready_replicas >= self.desired_replicas
    }
}

struct PhaseTracker<'a> {
    workload: String,
    phases: Vec<DeploymentPhase>,
    logger: &'a StructuredLogger,
}

impl<'a> PhaseTracker<'a> {
    fn new(workload: String, logger: &'a StructuredLogger) -> Self {
        Self {
            workload,
            phases: vec![DeploymentPhase::Pending],
            logger,
        }
    }

    fn current(&self) -> DeploymentPhase {
        self.phases.last().copied().unwrap_or(DeploymentPhase::Pending)
    }

    fn advance(&mut self, next: DeploymentPhase) {
        let from = self.current();
        debug_assert!(from.can_transition_to(next), "{} -> {}", from, next);
        self.logger.log_phase(&self.workload, from, next);
        self.phases.push(next);
    }
}

/// State observed once every applied object reported ready
#[derive(Debug, Default)]
struct Converged {
    counts: ReplicaCounts,
    policy_active: Option<bool>,
    scaling_active: Option<bool>,
}

/// Result of one convergence poll
enum Poll {
    Converged(Converged),
    /// 1-based index of the first object not ready, and why
    Pending(usize, String),
}

/// Applies plans and waits for convergence
pub struct DeploymentOrchestrator {
    apply_timeout: Duration,
    convergence: RetryPolicy,
    locks: Arc<WorkloadLocks>,
    logger: StructuredLogger,
    metrics: OrchestratorMetrics,
}

impl DeploymentOrchestrator {
    pub fn new(
        apply_timeout: Duration,
        convergence: RetryPolicy,
        logger: StructuredLogger,
        metrics: OrchestratorMetrics,
    ) -> Self {
        Self {
            apply_timeout,
            convergence,
            locks: Arc::new(WorkloadLocks::new()),
            logger,
            metrics,
        }
    }

    /// Share workload locks with other orchestrators
    pub fn with_locks(mut self, locks: Arc<WorkloadLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &Arc<WorkloadLocks> {
        &self.locks
    }

    /// Apply every manifest in order, then wait until the workload converges
    ///
    /// Manifests accepted before a failure stay applied. Re-running the same
    /// plan is safe because applies are declarative.
    pub async fn apply(
        &self,
        plan: DeploymentPlan,
        cluster: &ClusterHandle,
        cancel: &Cancellation,
    ) -> Result<DeploymentResult, ApplyError> {
        let started_at = Utc::now();
        let workload = plan.workload();
        let mut tracker = PhaseTracker::new(workload.name.clone(), &self.logger);

        let key = workload.lock_key();
        let _guard = tokio::select! {
            guard = self.locks.acquire(&key) => guard,
            _ = cancel.cancelled() => {
                tracker.advance(DeploymentPhase::Failed);
                self.metrics.inc_deployments(DeploymentPhase::Failed);
                return Err(ApplyError::Cancelled { stage: ApplyStage::Applying, index: None });
            }
        };

        let mut applied = Vec::with_capacity(plan.manifests().len());
        let outcome = match self.apply_all(&plan, cluster, cancel, &mut tracker, &mut applied).await {
            Ok(()) => {
                tracker.advance(DeploymentPhase::Converging);
                self.converge(&plan, cluster, cancel).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(converged) => {
                tracker.advance(DeploymentPhase::Succeeded);
                self.metrics.inc_deployments(DeploymentPhase::Succeeded);
                Ok(DeploymentResult {
                    workload: workload.name.clone(),
                    namespace: workload.namespace.clone(),
                    phases: tracker.phases,
                    applied,
                    desired_replicas: converged.counts.desired,
                    ready_replicas: converged.counts.ready,
                    policy_active: converged.policy_active,
                    scaling_active: converged.scaling_active,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(e) => {
                tracker.advance(DeploymentPhase::Failed);
                self.metrics.inc_deployments(DeploymentPhase::Failed);
                Err(e)
            }
        }
    }

    async fn apply_all(
        &self,
        plan: &DeploymentPlan,
        cluster: &ClusterHandle,
        cancel: &Cancellation,
        tracker: &mut PhaseTracker<'_>,
        applied: &mut Vec<String>,
    ) -> Result<(), ApplyError> {
        tracker.advance(DeploymentPhase::Applying);
        let total = plan.manifests().len();

        for (i, manifest) in plan.manifests().iter().enumerate() {
            let index = i + 1;
            if cancel.is_cancelled() {
                return Err(ApplyError::Cancelled {
                    stage: ApplyStage::Applying,
                    index: Some(index),
                });
            }

            cluster
                .ensure_reachable()
                .await
                .map_err(|source| ApplyError::Connectivity {
                    stage: ApplyStage::Applying,
                    index: Some(index),
                    source,
                })?;

            self.apply_one(manifest, index, total, cluster, cancel).await?;
            applied.push(manifest.to_string());
        }
        Ok(())
    }

    async fn apply_one(
        &self,
        manifest: &Manifest,
        index: usize,
        total: usize,
        cluster: &ClusterHandle,
        cancel: &Cancellation,
    ) -> Result<(), ApplyError> {
        let started = Instant::now();
        let kind = manifest.kind.kind();

        let response = tokio::select! {
            response = tokio::time::timeout(self.apply_timeout, cluster.api().apply(manifest)) => response,
            _ = cancel.cancelled() => {
                return Err(ApplyError::Cancelled { stage: ApplyStage::Applying, index: Some(index) });
            }
        };

        match response {
            Ok(Ok(())) => {
                self.metrics.observe_apply(kind, started.elapsed(), true);
                self.logger
                    .log_manifest_applied(index, total, &manifest.to_string(), started.elapsed());
                Ok(())
            }
            Ok(Err(ClusterApiError::Rejected { code, message })) => {
                self.metrics.observe_apply(kind, started.elapsed(), false);
                let reason = format!("{} (HTTP {})", message, code);
                self.logger
                    .log_manifest_rejected(index, total, &manifest.to_string(), &reason);
                Err(ApplyError::Rejected {
                    index,
                    total,
                    manifest: manifest.to_string(),
                    reason,
                })
            }
            Ok(Err(ClusterApiError::Transport(reason))) => {
                cluster.mark_unreachable().await;
                self.metrics.inc_probe_failures();
                Err(ApplyError::Connectivity {
                    stage: ApplyStage::Applying,
                    index: Some(index),
                    source: ConnectivityError::Stale {
                        endpoint: cluster.endpoint().to_string(),
                        reason,
                    },
                })
            }
            Err(_) => Err(ApplyError::Timeout {
                stage: ApplyStage::Applying,
                index: Some(index),
                manifest: Some(manifest.to_string()),
                waited: self.apply_timeout,
                detail: "the API server did not answer".to_string(),
            }),
        }
    }

    async fn converge(
        &self,
        plan: &DeploymentPlan,
        cluster: &ClusterHandle,
        cancel: &Cancellation,
    ) -> Result<Converged, ApplyError> {
        let workload = &plan.workload().name;
        let mut backoff = self.convergence.backoff();
        let mut last_pending: Option<(usize, String)> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled_converging(&last_pending));
            }

            match self.poll(plan, cluster).await {
                Ok(Poll::Converged(converged)) => {
                    self.metrics.observe_convergence(backoff.elapsed());
                    self.logger.log_converged(
                        workload,
                        converged.counts.ready,
                        converged.counts.desired,
                        converged.policy_active,
                        backoff.elapsed(),
                    );
                    return Ok(converged);
                }
                Ok(Poll::Pending(index, detail)) => {
                    self.logger
                        .log_convergence_pending(workload, backoff.attempts() + 1, &detail);
                    last_pending = Some((index, detail));
                }
                Err(e) => {
                    // Tolerated until the deadline, the next poll may get through
                    warn!(workload = %workload, error = %e, "Convergence poll failed");
                    last_pending = Some((
                        last_pending.as_ref().map(|(i, _)| *i).unwrap_or(1),
                        format!("poll failed: {}", e),
                    ));
                }
            }

            match backoff.next_delay() {
                Some(delay) => {
                    if !cancel.sleep(delay).await {
                        return Err(self.cancelled_converging(&last_pending));
                    }
                }
                None => {
                    let (index, detail) = last_pending
                        .map(|(i, d)| (Some(i), d))
                        .unwrap_or((None, "not converged".to_string()));
                    return Err(ApplyError::Timeout {
                        stage: ApplyStage::Converging,
                        index,
                        manifest: index
                            .and_then(|i| plan.manifests().get(i - 1))
                            .map(|m| m.to_string()),
                        waited: backoff.elapsed(),
                        detail,
                    });
                }
            }
        }
    }

    fn cancelled_converging(&self, last_pending: &Option<(usize, String)>) -> ApplyError {
        ApplyError::Cancelled {
            stage: ApplyStage::Converging,
            index: last_pending.as_ref().map(|(i, _)| *i),
        }
    }

    /// Read back every applied object once
    async fn poll(&self, plan: &DeploymentPlan, cluster: &ClusterHandle) -> Result<Poll, ClusterApiError> {
        let mut converged = Converged::default();

        for (i, manifest) in plan.manifests().iter().enumerate() {
            let live = tokio::time::timeout(self.apply_timeout, cluster.api().get(&manifest.reference()))
                .await
                .map_err(|_| ClusterApiError::Transport(format!("reading {} timed out", manifest)))??;

            if let Readiness::Pending(detail) = evaluate(manifest.kind, live.as_ref()) {
                return Ok(Poll::Pending(i + 1, format!("{}: {}", manifest, detail)));
            }

            if let Some(doc) = live.as_ref() {
                match manifest.kind {
                    ResourceKind::Deployment => converged.counts = ReplicaCounts::from_deployment(doc),
                    ResourceKind::ScaledObject => {
                        converged.policy_active = condition(doc, "Ready");
                        converged.scaling_active = condition(doc, "Active");
                    }
                    _ => {}
                }
            }
        }

        debug!(workload = %plan.workload().name, "All applied objects report ready");
        Ok(Poll::Converged(converged))
    }
}

/// Retry `attempt` with bounded backoff while the cluster is unreachable
///
/// Credential errors are returned at once. Cancellation returns the last
/// probe failure.
pub async fn retry_connect<F, Fut>(
    policy: &RetryPolicy,
    cancel: &Cancellation,
    mut attempt: F,
) -> Result<ClusterHandle, ConnectivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ClusterHandle, ConnectivityError>>,
{
    let mut backoff = policy.backoff();
    loop {
        let err = match attempt().await {
            Ok(handle) => return Ok(handle),
            Err(e @ ConnectivityError::Credentials(_)) => return Err(e),
            Err(e) => e,
        };

        match backoff.next_delay() {
            Some(delay) => {
                warn!(
                    attempt = backoff.attempts(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "Cluster unreachable, retrying"
                );
                if !cancel.sleep(delay).await {
                    return Err(err);
                }
            }
            None => return Err(err),
        }
    }
}

/// Connect through `connector`, retrying unreachable clusters per `policy`
pub async fn connect_with_retry(
    connector: &ClusterConnector,
    hint: &EndpointHint,
    policy: &RetryPolicy,
    cancel: &Cancellation,
) -> Result<ClusterHandle, ConnectivityError> {
    retry_connect(policy, cancel, || connector.connect(hint)).await
}

#[cfg(test)]
mod tests;
