//! Cluster connectivity
//!
//! This module provides:
//! - The [`ClusterApi`] seam over the control plane (apply, get, list)
//! - [`ClusterConnector`], which resolves credentials and probes liveness
//! - [`ClusterHandle`], the session's view of one reachable cluster

mod kube_api;

pub use kube_api::KubeClusterApi;

use crate::error::ConnectivityError;
use crate::models::{Manifest, ResourceKind, ResourceRef};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Errors returned by a [`ClusterApi`] call
#[derive(Debug, Clone, Error)]
pub enum ClusterApiError {
    /// The request never got an answer (connection refused, TLS, DNS)
    #[error("transport error: {0}")]
    Transport(String),

    /// The API server answered and refused the request
    #[error("rejected by the API server ({code}): {message}")]
    Rejected { code: u16, message: String },
}

/// Declarative access to a cluster's resource model
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Version string reported by the API server; doubles as liveness probe
    async fn server_version(&self) -> Result<String, ClusterApiError>;

    /// Server-side apply one manifest
    async fn apply(&self, manifest: &Manifest) -> Result<(), ClusterApiError>;

    /// Read one object, `None` if it does not exist
    async fn get(&self, target: &ResourceRef) -> Result<Option<Value>, ClusterApiError>;

    /// List objects of a kind in a namespace matching a label selector
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Value>, ClusterApiError>;
}

/// Last known liveness of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Unknown,
    Reachable,
    Unreachable,
}

/// Where the credentials for a handle came from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

impl Credentials {
    /// Flags that point `helm` at the same cluster
    pub fn helm_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        if let Some(context) = &self.context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        args
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kubeconfig, &self.context) {
            (None, None) => write!(f, "inferred"),
            (Some(path), None) => write!(f, "{}", path.display()),
            (None, Some(context)) => write!(f, "context {}", context),
            (Some(path), Some(context)) => write!(f, "{} (context {})", path.display(), context),
        }
    }
}

/// Explicit cluster selection; empty means infer from the environment
pub type EndpointHint = Credentials;

/// A connected cluster for the duration of one session
///
/// Endpoint and credentials are fixed at connect time. Once a probe fails
/// the handle stays unreachable and the caller has to reconnect.
pub struct ClusterHandle {
    endpoint: String,
    credentials: Credentials,
    server_version: String,
    api: Arc<dyn ClusterApi>,
    probe_timeout: Duration,
    reachability: RwLock<Reachability>,
}

impl fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

impl ClusterHandle {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn api(&self) -> &dyn ClusterApi {
        self.api.as_ref()
    }

    pub async fn reachability(&self) -> Reachability {
        *self.reachability.read().await
    }

    /// Re-probe before a mutating step
    ///
    /// Fails with [`ConnectivityError::Stale`] if the probe fails, and keeps
    /// failing without probing once the handle has gone stale.
    pub async fn ensure_reachable(&self) -> Result<(), ConnectivityError> {
        if self.reachability().await == Reachability::Unreachable {
            return Err(ConnectivityError::Stale {
                endpoint: self.endpoint.clone(),
                reason: "handle was already marked unreachable".to_string(),
            });
        }

        match probe(self.api.as_ref(), self.probe_timeout).await {
            Ok(_) => {
                *self.reachability.write().await = Reachability::Reachable;
                Ok(())
            }
            Err(reason) => {
                warn!(endpoint = %self.endpoint, reason = %reason, "Cluster probe failed");
                self.mark_unreachable().await;
                Err(ConnectivityError::Stale {
                    endpoint: self.endpoint.clone(),
                    reason,
                })
            }
        }
    }

    /// Record that the cluster stopped answering
    pub async fn mark_unreachable(&self) {
        *self.reachability.write().await = Reachability::Unreachable;
    }
}

async fn probe(api: &dyn ClusterApi, timeout: Duration) -> Result<String, String> {
    match tokio::time::timeout(timeout, api.server_version()).await {
        Ok(Ok(version)) => Ok(version),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no answer within {:?}", timeout)),
    }
}

/// Resolves cluster credentials and hands out probed handles
#[derive(Debug, Clone)]
pub struct ClusterConnector {
    probe_timeout: Duration,
    request_timeout: Duration,
    field_manager: String,
}

impl ClusterConnector {
    pub fn new(probe_timeout: Duration, request_timeout: Duration, field_manager: impl Into<String>) -> Self {
        Self {
            probe_timeout,
            request_timeout,
            field_manager: field_manager.into(),
        }
    }

    /// Resolve the cluster from the hint (or the environment) and probe it once
    pub async fn connect(&self, hint: &EndpointHint) -> Result<ClusterHandle, ConnectivityError> {
        let config = self.resolve_config(hint).await?;
        let endpoint = config.cluster_url.to_string();
        debug!(endpoint = %endpoint, credentials = %hint, "Resolved cluster configuration");

        let client = kube::Client::try_from(config)
            .map_err(|e| ConnectivityError::Credentials(format!("failed to build client: {}", e)))?;
        let api = Arc::new(KubeClusterApi::new(client, self.field_manager.clone()));

        self.attach(endpoint, hint.clone(), api).await
    }

    /// Probe an existing API and wrap it in a handle
    pub async fn attach(
        &self,
        endpoint: impl Into<String>,
        credentials: Credentials,
        api: Arc<dyn ClusterApi>,
    ) -> Result<ClusterHandle, ConnectivityError> {
        let endpoint = endpoint.into();
        let server_version = probe(api.as_ref(), self.probe_timeout)
            .await
            .map_err(|reason| ConnectivityError::Unreachable {
                endpoint: endpoint.clone(),
                reason,
            })?;

        info!(
            event = "cluster_connected",
            endpoint = %endpoint,
            server_version = %server_version,
            "Connected to cluster"
        );

        Ok(ClusterHandle {
            endpoint,
            credentials,
            server_version,
            api,
            probe_timeout: self.probe_timeout,
            reachability: RwLock::new(Reachability::Reachable),
        })
    }

    async fn resolve_config(&self, hint: &EndpointHint) -> Result<kube::Config, ConnectivityError> {
        use kube::config::{KubeConfigOptions, Kubeconfig};

        let options = KubeConfigOptions {
            context: hint.context.clone(),
            ..Default::default()
        };

        let mut config = match (&hint.kubeconfig, &hint.context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ConnectivityError::Credentials(format!("{}: {}", path.display(), e))
                })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| ConnectivityError::Credentials(e.to_string()))?
            }
            (None, Some(_)) => kube::Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ConnectivityError::Credentials(e.to_string()))?,
            (None, None) => kube::Config::infer()
                .await
                .map_err(|e| ConnectivityError::Credentials(e.to_string()))?,
        };

        config.connect_timeout = Some(self.probe_timeout);
        config.read_timeout = Some(self.request_timeout);
        Ok(config)
    }
}
