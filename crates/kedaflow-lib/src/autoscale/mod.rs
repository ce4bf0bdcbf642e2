//! Autoscaling configuration
//!
//! Validated, immutable description of how a workload scales: which
//! event sources drive it, within which replica bounds, and how often
//! the operator polls them.

mod registry;
mod validator;

pub use registry::{TriggerDefinition, TriggerRegistry};
pub use validator::{ConfigValidator, DocumentFormat};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// How a resource trigger measures its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricType {
    Utilization,
    AverageValue,
    Value,
}

impl MetricType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Utilization" => Some(MetricType::Utilization),
            "AverageValue" => Some(MetricType::AverageValue),
            "Value" => Some(MetricType::Value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Utilization => "Utilization",
            MetricType::AverageValue => "AverageValue",
            MetricType::Value => "Value",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event source that drives replica scaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingTrigger {
    /// Registered scaler type, e.g. `rabbitmq` or `cpu`
    pub kind: String,
    pub name: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub metric_type: Option<MetricType>,
    pub authentication_ref: Option<String>,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

/// Behaviour when the scaler keeps failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fallback {
    pub failure_threshold: u32,
    pub replicas: u32,
}

/// Validated autoscaling configuration for one workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoscaleConfig {
    /// Workload the document was written for, if it names one
    pub workload: Option<String>,
    pub triggers: Vec<ScalingTrigger>,
    pub polling_interval: Duration,
    pub cooldown_period: Duration,
    pub allow_scale_to_zero: bool,
    pub fallback: Option<Fallback>,
}

impl AutoscaleConfig {
    /// Smallest minimum across all triggers
    pub fn min_replicas(&self) -> u32 {
        self.triggers
            .iter()
            .map(|t| t.min_replicas)
            .min()
            .unwrap_or(0)
    }

    /// Largest maximum across all triggers
    pub fn max_replicas(&self) -> u32 {
        self.triggers
            .iter()
            .map(|t| t.max_replicas)
            .max()
            .unwrap_or(0)
    }
}
