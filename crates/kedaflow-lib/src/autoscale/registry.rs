//! Closed registry of supported trigger types

/// What a trigger type requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDefinition {
    pub kind: &'static str,
    /// Metadata keys that must be present
    pub required_metadata: &'static [&'static str],
    /// Resource triggers need an explicit metric type
    pub requires_metric_type: bool,
    /// Whether the trigger can activate a workload from zero replicas
    pub supports_scale_to_zero: bool,
}

const BUILTIN: &[TriggerDefinition] = &[
    TriggerDefinition {
        kind: "cpu",
        required_metadata: &["value"],
        requires_metric_type: true,
        supports_scale_to_zero: false,
    },
    TriggerDefinition {
        kind: "memory",
        required_metadata: &["value"],
        requires_metric_type: true,
        supports_scale_to_zero: false,
    },
    TriggerDefinition {
        kind: "rabbitmq",
        required_metadata: &["queueName"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
    TriggerDefinition {
        kind: "kafka",
        required_metadata: &["bootstrapServers", "consumerGroup"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
    TriggerDefinition {
        kind: "redis",
        required_metadata: &["listName"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
    TriggerDefinition {
        kind: "aws-sqs-queue",
        required_metadata: &["queueURL"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
    TriggerDefinition {
        kind: "azure-queue",
        required_metadata: &["queueName"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
    TriggerDefinition {
        kind: "prometheus",
        required_metadata: &["serverAddress", "query", "threshold"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
    TriggerDefinition {
        kind: "cron",
        required_metadata: &["timezone", "start", "end", "desiredReplicas"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
    TriggerDefinition {
        kind: "metrics-api",
        required_metadata: &["url", "valueLocation"],
        requires_metric_type: false,
        supports_scale_to_zero: true,
    },
];

/// Trigger types the validator accepts
#[derive(Debug, Clone)]
pub struct TriggerRegistry {
    definitions: Vec<TriggerDefinition>,
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TriggerRegistry {
    /// Scalers shipped with the KEDA operator that kedaflow knows how to check
    pub fn builtin() -> Self {
        Self {
            definitions: BUILTIN.to_vec(),
        }
    }

    pub fn get(&self, kind: &str) -> Option<&TriggerDefinition> {
        self.definitions.iter().find(|d| d.kind == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.definitions.iter().map(|d| d.kind)
    }
}
