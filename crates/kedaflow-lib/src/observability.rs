//! Observability infrastructure for the orchestrator
//!
//! Provides:
//! - Prometheus metrics (apply latency, convergence time, install outcomes)
//! - Structured logging with tracing, one event name per pipeline step

use crate::capability::CapabilityKind;
use crate::orchestrator::DeploymentPhase;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use semver::Version;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for API round trips (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Histogram buckets for convergence waits (in seconds)
const CONVERGENCE_BUCKETS: &[f64] = &[1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OrchestratorMetricsInner> = OnceLock::new();

struct OrchestratorMetricsInner {
    apply_latency_seconds: HistogramVec,
    convergence_seconds: Histogram,
    manifests_applied: IntCounterVec,
    manifests_rejected: IntCounterVec,
    deployments: IntCounterVec,
    capability_installs: IntCounterVec,
    probe_failures: IntCounter,
}

impl OrchestratorMetricsInner {
    fn new() -> Self {
        Self {
            apply_latency_seconds: register_histogram_vec!(
                "kedaflow_apply_latency_seconds",
                "Time spent in one server-side apply call",
                &["kind"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register apply_latency_seconds"),

            convergence_seconds: register_histogram!(
                "kedaflow_convergence_seconds",
                "Time from last apply until the workload reported ready",
                CONVERGENCE_BUCKETS.to_vec()
            )
            .expect("Failed to register convergence_seconds"),

            manifests_applied: register_int_counter_vec!(
                "kedaflow_manifests_applied_total",
                "Manifests accepted by the API server",
                &["kind"]
            )
            .expect("Failed to register manifests_applied"),

            manifests_rejected: register_int_counter_vec!(
                "kedaflow_manifests_rejected_total",
                "Manifests refused by the API server",
                &["kind"]
            )
            .expect("Failed to register manifests_rejected"),

            deployments: register_int_counter_vec!(
                "kedaflow_deployments_total",
                "Deployments by final phase",
                &["phase"]
            )
            .expect("Failed to register deployments"),

            capability_installs: register_int_counter_vec!(
                "kedaflow_capability_installs_total",
                "Capability install attempts by outcome",
                &["capability", "outcome"]
            )
            .expect("Failed to register capability_installs"),

            probe_failures: register_int_counter!(
                "kedaflow_probe_failures_total",
                "Cluster liveness probes that failed"
            )
            .expect("Failed to register probe_failures"),
        }
    }
}

/// Orchestrator metrics
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct OrchestratorMetrics {
    _private: (),
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OrchestratorMetricsInner {
        GLOBAL_METRICS.get_or_init(OrchestratorMetricsInner::new)
    }

    pub fn observe_apply(&self, kind: &str, elapsed: Duration, accepted: bool) {
        let inner = self.inner();
        inner
            .apply_latency_seconds
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
        if accepted {
            inner.manifests_applied.with_label_values(&[kind]).inc();
        } else {
            inner.manifests_rejected.with_label_values(&[kind]).inc();
        }
    }

    pub fn observe_convergence(&self, elapsed: Duration) {
        self.inner().convergence_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn inc_deployments(&self, phase: DeploymentPhase) {
        self.inner()
            .deployments
            .with_label_values(&[phase.as_str()])
            .inc();
    }

    /// `outcome` is one of `noop`, `installed`, `failed`
    pub fn inc_capability(&self, kind: CapabilityKind, outcome: &str) {
        self.inner()
            .capability_installs
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
    }

    pub fn inc_probe_failures(&self) {
        self.inner().probe_failures.inc();
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for orchestration events
///
/// Every event carries the command that produced it so one log stream can
/// interleave several invocations.
#[derive(Clone)]
pub struct StructuredLogger {
    command: String,
}

impl StructuredLogger {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Log the result of a capability probe
    pub fn log_capability_checked(
        &self,
        kind: CapabilityKind,
        name: &str,
        installed: Option<&Version>,
        satisfied: bool,
    ) {
        info!(
            event = "capability_checked",
            command = %self.command,
            capability = %kind,
            name = %name,
            installed = ?installed.map(|v| v.to_string()),
            satisfied = satisfied,
            "Checked capability"
        );
    }

    /// Log a skipped install because the constraint already holds
    pub fn log_capability_noop(&self, kind: CapabilityKind, name: &str, version: &Version) {
        info!(
            event = "capability_noop",
            command = %self.command,
            capability = %kind,
            name = %name,
            version = %version,
            "Capability already satisfied, nothing to do"
        );
    }

    pub fn log_capability_installing(&self, kind: CapabilityKind, name: &str, attempt: u32) {
        info!(
            event = "capability_installing",
            command = %self.command,
            capability = %kind,
            name = %name,
            attempt = attempt,
            "Installing capability"
        );
    }

    pub fn log_capability_installed(&self, kind: CapabilityKind, name: &str, version: &Version) {
        info!(
            event = "capability_installed",
            command = %self.command,
            capability = %kind,
            name = %name,
            version = %version,
            "Capability installed and verified"
        );
    }

    pub fn log_capability_failed(&self, kind: CapabilityKind, name: &str, attempt: u32, cause: &str) {
        warn!(
            event = "capability_failed",
            command = %self.command,
            capability = %kind,
            name = %name,
            attempt = attempt,
            cause = %cause,
            "Capability install attempt failed"
        );
    }

    /// Log a phase transition of a deployment
    pub fn log_phase(&self, workload: &str, from: DeploymentPhase, to: DeploymentPhase) {
        info!(
            event = "phase_changed",
            command = %self.command,
            workload = %workload,
            from = %from,
            to = %to,
            "Deployment phase changed"
        );
    }

    pub fn log_manifest_applied(&self, index: usize, total: usize, manifest: &str, elapsed: Duration) {
        info!(
            event = "manifest_applied",
            command = %self.command,
            index = index,
            total = total,
            manifest = %manifest,
            elapsed_ms = elapsed.as_millis() as u64,
            "Manifest applied"
        );
    }

    pub fn log_manifest_rejected(&self, index: usize, total: usize, manifest: &str, reason: &str) {
        warn!(
            event = "manifest_rejected",
            command = %self.command,
            index = index,
            total = total,
            manifest = %manifest,
            reason = %reason,
            "Manifest rejected"
        );
    }

    /// Log one convergence poll that did not pass yet
    pub fn log_convergence_pending(&self, workload: &str, attempt: u32, detail: &str) {
        debug!(
            event = "convergence_pending",
            command = %self.command,
            workload = %workload,
            attempt = attempt,
            detail = %detail,
            "Workload not ready yet"
        );
    }

    pub fn log_converged(
        &self,
        workload: &str,
        ready_replicas: i32,
        desired_replicas: i32,
        policy_active: Option<bool>,
        elapsed: Duration,
    ) {
        info!(
            event = "workload_converged",
            command = %self.command,
            workload = %workload,
            ready_replicas = ready_replicas,
            desired_replicas = desired_replicas,
            policy_active = ?policy_active,
            elapsed_ms = elapsed.as_millis() as u64,
            "Workload converged"
        );
    }

    /// Log invocation startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "kedaflow_started",
            command = %self.command,
            kedaflow_version = %version,
            "kedaflow started"
        );
    }

    /// Log invocation end
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "kedaflow_shutdown",
            command = %self.command,
            reason = %reason,
            "kedaflow shutting down"
        );
    }
}
