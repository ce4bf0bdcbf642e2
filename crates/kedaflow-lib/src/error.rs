//! Error taxonomy for the orchestration pipeline
//!
//! Every failure a deploy can hit falls into one of four classes, and the
//! CLI maps each class to its own exit code.

use crate::capability::CapabilityKind;
use semver::{Version, VersionReq};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure to reach or keep reaching the cluster control plane
#[derive(Debug, Clone, Error)]
pub enum ConnectivityError {
    /// Credentials or endpoint could not be resolved
    #[error("could not resolve cluster credentials: {0}")]
    Credentials(String),

    /// The liveness probe failed or timed out
    #[error("cluster at {endpoint} is unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// A previously reachable cluster stopped answering
    #[error("cluster at {endpoint} became unreachable ({reason}); reconnect before retrying")]
    Stale { endpoint: String, reason: String },
}

/// Why a capability could not be brought to `Installed`
#[derive(Debug, Clone, Error)]
pub enum InstallCause {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("could not determine installed version: {0}")]
    Detection(String),

    #[error("cluster request failed: {0}")]
    Cluster(String),

    #[error("installation could not be verified: {0}")]
    Verification(String),

    #[error("installed version {installed} does not satisfy {required} after install")]
    Unsatisfied { installed: Version, required: VersionReq },

    #[error("installed version {installed} is newer than {required} allows; refusing to downgrade")]
    WouldDowngrade { installed: Version, required: VersionReq },

    #[error("requires {0}, which is not installed")]
    Prerequisite(CapabilityKind),

    /// Cancelled by the caller; a running command is killed
    #[error("cancelled before the install finished")]
    Cancelled,
}

/// A capability failed to install, upgrade or verify
#[derive(Debug, Clone, Error)]
#[error("installing {capability} failed: {cause}")]
pub struct InstallError {
    pub capability: CapabilityKind,
    #[source]
    pub cause: InstallCause,
}

impl InstallError {
    pub fn new(capability: CapabilityKind, cause: impl Into<InstallCause>) -> Self {
        Self {
            capability,
            cause: cause.into(),
        }
    }
}

/// One violated field in an input document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Aggregated validation failure listing every violated field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigError {
    violations: Vec<FieldViolation>,
}

impl ConfigError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single-field error
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(field, reason);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            reason: reason.into(),
        });
    }

    pub fn extend(&mut self, other: ConfigError) {
        self.violations.extend(other.violations);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Names of the violated fields, in report order
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// `Ok(())` when nothing was recorded, otherwise the whole error
    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration ({} problem", self.violations.len())?;
        if self.violations.len() != 1 {
            write!(f, "s")?;
        }
        write!(f, ")")?;
        for violation in &self.violations {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

/// Stage of the apply state machine an error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Applying,
    Converging,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyStage::Applying => write!(f, "applying"),
            ApplyStage::Converging => write!(f, "converging"),
        }
    }
}

/// Failure while applying a plan or waiting for it to converge
///
/// Manifest indices are 1-based positions in the plan.
#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    /// The cluster refused a manifest; retrying unchanged will not help
    #[error("manifest {index}/{total} ({manifest}) was rejected: {reason}")]
    Rejected {
        index: usize,
        total: usize,
        manifest: String,
        reason: String,
    },

    /// The cluster did not answer or converge in time
    #[error("timed out while {stage} {}after {waited:?}: {detail}", .manifest.as_ref().map(|m| format!("{} ", m)).unwrap_or_default())]
    Timeout {
        stage: ApplyStage,
        index: Option<usize>,
        manifest: Option<String>,
        waited: Duration,
        detail: String,
    },

    /// Cancelled by the caller at a blocking wait
    #[error("cancelled while {stage}{}", .index.map(|i| format!(" (at manifest {})", i)).unwrap_or_default())]
    Cancelled {
        stage: ApplyStage,
        index: Option<usize>,
    },

    /// The handle went stale mid-apply
    #[error("lost the cluster while {stage}: {source}")]
    Connectivity {
        stage: ApplyStage,
        index: Option<usize>,
        #[source]
        source: ConnectivityError,
    },
}

impl ApplyError {
    pub fn stage(&self) -> ApplyStage {
        match self {
            ApplyError::Rejected { .. } => ApplyStage::Applying,
            ApplyError::Timeout { stage, .. }
            | ApplyError::Cancelled { stage, .. }
            | ApplyError::Connectivity { stage, .. } => *stage,
        }
    }

    /// 1-based manifest index the failure is attributed to, if any
    pub fn manifest_index(&self) -> Option<usize> {
        match self {
            ApplyError::Rejected { index, .. } => Some(*index),
            ApplyError::Timeout { index, .. }
            | ApplyError::Cancelled { index, .. }
            | ApplyError::Connectivity { index, .. } => *index,
        }
    }
}

/// Coarse failure class used for process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Connectivity,
    Install,
    Validation,
    Apply,
    Cancelled,
    Other,
}

impl FailureClass {
    pub fn exit_code(self) -> u8 {
        match self {
            FailureClass::Other => 1,
            FailureClass::Connectivity => 3,
            FailureClass::Install => 4,
            FailureClass::Validation => 5,
            FailureClass::Apply => 6,
            FailureClass::Cancelled => 130,
        }
    }

    /// Classify an error by walking its source chain
    pub fn of(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = current {
            if e.is::<ConnectivityError>() {
                return FailureClass::Connectivity;
            }
            if let Some(install) = e.downcast_ref::<InstallError>() {
                return match install.cause {
                    InstallCause::Cancelled => FailureClass::Cancelled,
                    _ => FailureClass::Install,
                };
            }
            if e.is::<ConfigError>() {
                return FailureClass::Validation;
            }
            if let Some(apply) = e.downcast_ref::<ApplyError>() {
                return match apply {
                    ApplyError::Connectivity { .. } => FailureClass::Connectivity,
                    ApplyError::Cancelled { .. } => FailureClass::Cancelled,
                    _ => FailureClass::Apply,
                };
            }
            current = e.source();
        }
        FailureClass::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_every_field() {
        let mut err = ConfigError::new();
        err.push("triggers", "at least one trigger is required");
        err.push("polling_interval", "must be greater than 0");

        let message = err.to_string();
        assert!(message.contains("2 problems"));
        assert!(message.contains("triggers"));
        assert!(message.contains("polling_interval"));
        assert_eq!(err.fields(), vec!["triggers", "polling_interval"]);
    }

    #[test]
    fn test_config_error_into_result() {
        assert!(ConfigError::new().into_result().is_ok());
        assert!(ConfigError::single("name", "bad").into_result().is_err());
    }

    #[test]
    fn test_apply_error_reports_stage_and_index() {
        let err = ApplyError::Rejected {
            index: 2,
            total: 3,
            manifest: "Service/app1-service".to_string(),
            reason: "port out of range".to_string(),
        };
        assert_eq!(err.stage(), ApplyStage::Applying);
        assert_eq!(err.manifest_index(), Some(2));
        assert!(err.to_string().contains("manifest 2/3"));
    }

    #[test]
    fn test_failure_class_exit_codes_are_distinct() {
        let codes = [
            FailureClass::Connectivity.exit_code(),
            FailureClass::Install.exit_code(),
            FailureClass::Validation.exit_code(),
            FailureClass::Apply.exit_code(),
            FailureClass::Cancelled.exit_code(),
            FailureClass::Other.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_failure_class_walks_source_chain() {
        let err = InstallError::new(
            CapabilityKind::AutoscalerOperator,
            ConnectivityError::Stale {
                endpoint: "https://127.0.0.1:6443".to_string(),
                reason: "connection refused".to_string(),
            },
        );
        assert_eq!(FailureClass::of(&err), FailureClass::Install);

        let apply = ApplyError::Connectivity {
            stage: ApplyStage::Applying,
            index: Some(1),
            source: ConnectivityError::Stale {
                endpoint: "https://127.0.0.1:6443".to_string(),
                reason: "timeout".to_string(),
            },
        };
        assert_eq!(FailureClass::of(&apply), FailureClass::Connectivity);
    }

    #[test]
    fn test_cancellation_has_its_own_class() {
        let install = InstallError::new(CapabilityKind::AutoscalerOperator, InstallCause::Cancelled);
        assert_eq!(FailureClass::of(&install), FailureClass::Cancelled);

        let apply = ApplyError::Cancelled {
            stage: ApplyStage::Converging,
            index: Some(3),
        };
        assert_eq!(FailureClass::of(&apply), FailureClass::Cancelled);
        assert_eq!(FailureClass::Cancelled.exit_code(), 130);
    }
}
