//! Cluster bootstrap and autoscaled deployment library
//!
//! This crate provides the core functionality for:
//! - Connecting to a Kubernetes cluster and keeping the session honest
//! - Installing Helm and KEDA idempotently
//! - Validating autoscaling configuration
//! - Building and applying Deployment, Service and ScaledObject manifests
//! - Settings, metrics and structured logging

pub mod autoscale;
pub mod capability;
pub mod cluster;
pub mod error;
pub mod manifest;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod retry;
pub mod settings;
pub mod status;

#[cfg(test)]
mod testing;

pub use autoscale::{AutoscaleConfig, ConfigValidator, DocumentFormat, ScalingTrigger, TriggerRegistry};
pub use capability::{
    Capability, CapabilityInstaller, CapabilityKind, CapabilityStatus, HelmRuntime, InstallMode,
    Installable, KedaOperator, SystemRunner,
};
pub use cluster::{ClusterApi, ClusterConnector, ClusterHandle, Credentials, EndpointHint, Reachability};
pub use error::{ApplyError, ApplyStage, ConfigError, ConnectivityError, FailureClass, InstallCause, InstallError};
pub use manifest::ManifestBuilder;
pub use models::*;
pub use observability::{OrchestratorMetrics, StructuredLogger};
pub use orchestrator::{connect_with_retry, DeploymentOrchestrator, DeploymentPhase, DeploymentResult};
pub use retry::{cancellation, CancelHandle, Cancellation, RetryPolicy};
pub use settings::Settings;
pub use status::{workload_status, PodStatus, PolicyStatus, WorkloadStatus};
