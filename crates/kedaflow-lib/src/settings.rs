//! Orchestrator settings
//!
//! Loaded in layers: built-in defaults, then an optional config file, then
//! `KEDAFLOW__<SECTION>__<KEY>` environment variables.

use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use semver::VersionReq;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "KEDAFLOW";

/// All tunables, grouped by concern
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cluster: ClusterSettings,
    pub retry: RetrySettings,
    pub convergence: ConvergenceSettings,
    pub helm: HelmSettings,
    pub keda: KedaSettings,
}

/// Control-plane timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Liveness probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// Read timeout for API requests in seconds
    pub request_timeout_secs: u64,
    /// Timeout for a single manifest apply in seconds
    pub apply_timeout_secs: u64,
    /// Field manager name used for server-side apply
    pub field_manager: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 10,
            request_timeout_secs: 30,
            apply_timeout_secs: 30,
            field_manager: "kedaflow".to_string(),
        }
    }
}

impl ClusterSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }
}

/// Backoff for connectivity probes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_attempts: u32,
    pub deadline_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            max_attempts: 5,
            deadline_secs: 60,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_attempts: self.max_attempts,
            deadline: Duration::from_secs(self.deadline_secs),
        }
    }
}

/// Backoff and deadline for convergence polling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvergenceSettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for ConvergenceSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 15_000,
            max_attempts: 120,
            timeout_secs: 300,
        }
    }
}

impl ConvergenceSettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_attempts: self.max_attempts,
            deadline: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Helm runtime detection and installation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HelmSettings {
    pub binary: String,
    pub version_constraint: VersionReq,
    /// Program and arguments that install Helm on this machine
    pub install_command: Vec<String>,
    pub command_timeout_secs: u64,
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            binary: "helm".to_string(),
            version_constraint: VersionReq::parse(">=3.8.0").unwrap_or(VersionReq::STAR),
            install_command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "curl -fsSL https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3 | bash"
                    .to_string(),
            ],
            command_timeout_secs: 600,
        }
    }
}

impl HelmSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// KEDA operator chart and expected version
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KedaSettings {
    pub namespace: String,
    pub release: String,
    pub repo_name: String,
    pub repo_url: String,
    pub chart: String,
    /// Pin the chart version; latest when unset
    pub chart_version: Option<String>,
    pub version_constraint: VersionReq,
    /// `--set` overrides passed to the chart
    pub values: BTreeMap<String, String>,
}

impl Default for KedaSettings {
    fn default() -> Self {
        Self {
            namespace: "keda".to_string(),
            release: "keda".to_string(),
            repo_name: "kedacore".to_string(),
            repo_url: "https://kedacore.github.io/charts".to_string(),
            chart: "kedacore/keda".to_string(),
            chart_version: None,
            version_constraint: VersionReq::parse(">=2.10.0").unwrap_or(VersionReq::STAR),
            values: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (required if given) or the default file, plus environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// `~/.config/kedaflow/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("kedaflow").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.cluster.probe_timeout_secs == 0 {
            anyhow::bail!("cluster.probe_timeout_secs must be greater than 0");
        }
        if self.cluster.apply_timeout_secs == 0 {
            anyhow::bail!("cluster.apply_timeout_secs must be greater than 0");
        }
        if self.retry.max_attempts == 0 || self.convergence.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.convergence.timeout_secs == 0 {
            anyhow::bail!("convergence.timeout_secs must be greater than 0");
        }
        if self.cluster.field_manager.is_empty() {
            anyhow::bail!("cluster.field_manager must not be empty");
        }
        Ok(())
    }
}
