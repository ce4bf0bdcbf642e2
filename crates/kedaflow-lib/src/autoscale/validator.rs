//! Autoscaling configuration validation
//!
//! Walks the whole document once and records every problem it finds, so a
//! single run reports all of them together.

use super::{AutoscaleConfig, Fallback, MetricType, ScalingTrigger, TriggerRegistry};
use crate::error::ConfigError;
use crate::models::validate_dns_label;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MIN_REPLICAS: u32 = 1;
const DEFAULT_MAX_REPLICAS: u32 = 10;
const DEFAULT_POLLING_INTERVAL_SECS: u64 = 30;
const DEFAULT_COOLDOWN_PERIOD_SECS: u64 = 300;

/// Field name used for problems with the document as a whole
const DOCUMENT: &str = "<document>";

const TOP_LEVEL_KEYS: &[&str] = &[
    "workload",
    "min_replicas",
    "max_replicas",
    "polling_interval",
    "cooldown_period",
    "allow_scale_to_zero",
    "fallback",
    "triggers",
];

const TRIGGER_KEYS: &[&str] = &[
    "type",
    "name",
    "metadata",
    "metricType",
    "metric_type",
    "authenticationRef",
    "authentication_ref",
    "min_replicas",
    "max_replicas",
];

/// Input document syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick the format from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }
}

/// Turns raw autoscaling documents into [`AutoscaleConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConfigValidator {
    registry: TriggerRegistry,
}

impl ConfigValidator {
    pub fn new(registry: TriggerRegistry) -> Self {
        Self { registry }
    }

    /// Read and validate a configuration file
    pub fn load(&self, path: &Path) -> Result<AutoscaleConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::single(DOCUMENT, format!("could not read {}: {}", path.display(), e))
        })?;
        self.parse(&text, DocumentFormat::from_path(path))
    }

    /// Parse and validate a document
    pub fn parse(&self, text: &str, format: DocumentFormat) -> Result<AutoscaleConfig, ConfigError> {
        let raw: Value = match format {
            DocumentFormat::Json => serde_json::from_str(text)
                .map_err(|e| ConfigError::single(DOCUMENT, format!("invalid JSON: {}", e)))?,
            DocumentFormat::Yaml => serde_yaml::from_str(text)
                .map_err(|e| ConfigError::single(DOCUMENT, format!("invalid YAML: {}", e)))?,
        };
        self.validate(&raw)
    }

    /// Validate an already-parsed document
    pub fn validate(&self, raw: &Value) -> Result<AutoscaleConfig, ConfigError> {
        let root = raw
            .as_object()
            .ok_or_else(|| ConfigError::single(DOCUMENT, "expected a mapping at the top level"))?;

        let mut errors = ConfigError::new();
        report_unknown_keys(root, TOP_LEVEL_KEYS, "", &mut errors);

        let workload = match root.get("workload") {
            None => None,
            Some(Value::String(name)) => {
                if let Err(reason) = validate_dns_label(name) {
                    errors.push("workload", reason);
                }
                Some(name.clone())
            }
            Some(_) => {
                errors.push("workload", "must be a string");
                None
            }
        };

        let allow_scale_to_zero = match root.get("allow_scale_to_zero") {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                errors.push("allow_scale_to_zero", "must be a boolean");
                false
            }
        };

        let polling_interval = match integer(root.get("polling_interval"), "polling_interval", &mut errors) {
            Field::Missing => Some(DEFAULT_POLLING_INTERVAL_SECS),
            Field::Value(v) if v > 0 => Some(v as u64),
            Field::Value(v) => {
                errors.push("polling_interval", format!("must be greater than 0 (got {})", v));
                None
            }
            Field::Invalid => None,
        };

        let cooldown_period = match integer(root.get("cooldown_period"), "cooldown_period", &mut errors) {
            Field::Missing => Some(DEFAULT_COOLDOWN_PERIOD_SECS),
            Field::Value(v) if v >= 0 => Some(v as u64),
            Field::Value(v) => {
                errors.push("cooldown_period", format!("must not be negative (got {})", v));
                None
            }
            Field::Invalid => None,
        };

        let fallback = root
            .get("fallback")
            .and_then(|value| validate_fallback(value, &mut errors));

        let default_min = replica_count(root.get("min_replicas"), "min_replicas", &mut errors)
            .resolve(DEFAULT_MIN_REPLICAS);
        let default_max = replica_count(root.get("max_replicas"), "max_replicas", &mut errors)
            .resolve(DEFAULT_MAX_REPLICAS);
        if let (Some(min), Some(max)) = (default_min, default_max) {
            check_bounds("", min, max, allow_scale_to_zero, &mut errors);
        }

        let mut triggers = Vec::new();
        match root.get("triggers") {
            None => errors.push("triggers", "required field is missing"),
            Some(Value::Array(items)) if items.is_empty() => {
                errors.push("triggers", "at least one trigger is required")
            }
            Some(Value::Array(items)) => {
                let defaults = Defaults {
                    min: default_min,
                    max: default_max,
                    allow_scale_to_zero,
                };
                let mut names = HashSet::new();
                for (index, item) in items.iter().enumerate() {
                    if let Some(trigger) = self.validate_trigger(index, item, &defaults, &mut errors) {
                        if let Some(name) = &trigger.name {
                            if !names.insert(name.clone()) {
                                errors.push(
                                    format!("triggers[{}].name", index),
                                    format!("trigger name '{}' is used more than once", name),
                                );
                            }
                        }
                        triggers.push(trigger);
                    }
                }
            }
            Some(_) => errors.push("triggers", "must be a list"),
        }

        if !errors.is_empty() {
            debug!(
                problems = errors.violations().len(),
                "Autoscale configuration rejected"
            );
            return Err(errors);
        }

        Ok(AutoscaleConfig {
            workload,
            triggers,
            polling_interval: Duration::from_secs(polling_interval.unwrap_or(DEFAULT_POLLING_INTERVAL_SECS)),
            cooldown_period: Duration::from_secs(cooldown_period.unwrap_or(DEFAULT_COOLDOWN_PERIOD_SECS)),
            allow_scale_to_zero,
            fallback,
        })
    }

    fn validate_trigger(
        &self,
        index: usize,
        value: &Value,
        defaults: &Defaults,
        errors: &mut ConfigError,
    ) -> Option<ScalingTrigger> {
        let path = format!("triggers[{}]", index);
        let Some(obj) = value.as_object() else {
            errors.push(path, "must be a mapping");
            return None;
        };
        let before = errors.violations().len();
        report_unknown_keys(obj, TRIGGER_KEYS, &path, errors);

        let kind = match obj.get("type") {
            None => {
                errors.push(format!("{}.type", path), "required field is missing");
                None
            }
            Some(Value::String(kind)) => match self.registry.get(kind) {
                Some(definition) => Some(*definition),
                None => {
                    let known: Vec<_> = self.registry.kinds().collect();
                    errors.push(
                        format!("{}.type", path),
                        format!("unknown trigger type '{}' (expected one of: {})", kind, known.join(", ")),
                    );
                    None
                }
            },
            Some(_) => {
                errors.push(format!("{}.type", path), "must be a string");
                None
            }
        };

        let name = match obj.get("name") {
            None => None,
            Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
            Some(_) => {
                errors.push(format!("{}.name", path), "must be a non-empty string");
                None
            }
        };

        let mut metadata = BTreeMap::new();
        match obj.get("metadata") {
            None => {}
            Some(Value::Object(entries)) => {
                for (key, value) in entries {
                    match scalar_to_string(value) {
                        Some(s) => {
                            metadata.insert(key.clone(), s);
                        }
                        None => errors.push(
                            format!("{}.metadata.{}", path, key),
                            "must be a string, number or boolean",
                        ),
                    }
                }
            }
            Some(_) => errors.push(format!("{}.metadata", path), "must be a mapping"),
        }

        let (metric_key, metric_value) = first_present(obj, "metricType", "metric_type");
        let metric_type = match metric_value {
            None => None,
            Some(Value::String(s)) => match MetricType::parse(s) {
                Some(m) => Some(m),
                None => {
                    errors.push(
                        format!("{}.{}", path, metric_key),
                        "must be one of Utilization, AverageValue, Value",
                    );
                    None
                }
            },
            Some(_) => {
                errors.push(format!("{}.{}", path, metric_key), "must be a string");
                None
            }
        };

        let (auth_key, auth_value) = first_present(obj, "authenticationRef", "authentication_ref");
        let authentication_ref = match auth_value {
            None => None,
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Object(o)) => match o.get("name") {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => {
                    errors.push(format!("{}.{}.name", path, auth_key), "required field is missing");
                    None
                }
            },
            Some(_) => {
                errors.push(
                    format!("{}.{}", path, auth_key),
                    "must be a name or a mapping with a name",
                );
                None
            }
        };

        let min_override = replica_count(obj.get("min_replicas"), &format!("{}.min_replicas", path), errors);
        let max_override = replica_count(obj.get("max_replicas"), &format!("{}.max_replicas", path), errors);
        let overrides_bounds = min_override.is_present() || max_override.is_present();
        let min_replicas = min_override.or(defaults.min);
        let max_replicas = max_override.or(defaults.max);

        if let (Some(min), Some(max)) = (min_replicas, max_replicas) {
            let bounds_ok = if overrides_bounds {
                check_bounds(&format!("{}.", path), min, max, defaults.allow_scale_to_zero, errors)
            } else {
                min <= max && (max > 0 || defaults.allow_scale_to_zero)
            };
            if let Some(definition) = &kind {
                if bounds_ok && min == 0 && !definition.supports_scale_to_zero {
                    errors.push(
                        format!("{}.min_replicas", path),
                        format!(
                            "{} triggers cannot scale to zero; min_replicas must be at least 1",
                            definition.kind
                        ),
                    );
                }
            }
        }

        if let Some(definition) = &kind {
            for key in definition.required_metadata {
                let present = metadata.get(*key).map(|v| !v.is_empty()).unwrap_or(false);
                if !present {
                    errors.push(
                        format!("{}.metadata.{}", path, key),
                        format!("required by the {} trigger", definition.kind),
                    );
                }
            }
            if definition.requires_metric_type && metric_value.is_none() {
                errors.push(
                    format!("{}.metricType", path),
                    format!("required for {} triggers", definition.kind),
                );
            }
        }

        if errors.violations().len() > before {
            return None;
        }

        Some(ScalingTrigger {
            kind: kind.map(|d| d.kind.to_string())?,
            name,
            metadata,
            metric_type,
            authentication_ref,
            min_replicas: min_replicas?,
            max_replicas: max_replicas?,
        })
    }
}

/// Bounds inherited by triggers that do not set their own
struct Defaults {
    min: Option<u32>,
    max: Option<u32>,
    allow_scale_to_zero: bool,
}

/// Outcome of reading an optional field
enum Field<T> {
    Missing,
    Invalid,
    Value(T),
}

impl Field<u32> {
    fn is_present(&self) -> bool {
        !matches!(self, Field::Missing)
    }

    /// Explicit value, else `fallback`; `None` if the value was invalid
    fn resolve(self, fallback: u32) -> Option<u32> {
        match self {
            Field::Missing => Some(fallback),
            Field::Invalid => None,
            Field::Value(v) => Some(v),
        }
    }

    /// Explicit value, else the inherited one
    fn or(self, inherited: Option<u32>) -> Option<u32> {
        match self {
            Field::Missing => inherited,
            Field::Invalid => None,
            Field::Value(v) => Some(v),
        }
    }
}

fn integer(value: Option<&Value>, field: &str, errors: &mut ConfigError) -> Field<i64> {
    match value {
        None => Field::Missing,
        Some(v) => match v.as_i64() {
            Some(n) => Field::Value(n),
            None => {
                errors.push(field, "must be an integer");
                Field::Invalid
            }
        },
    }
}

fn replica_count(value: Option<&Value>, field: &str, errors: &mut ConfigError) -> Field<u32> {
    match integer(value, field, errors) {
        Field::Missing => Field::Missing,
        Field::Invalid => Field::Invalid,
        Field::Value(n) => match u32::try_from(n) {
            Ok(n) => Field::Value(n),
            Err(_) => {
                errors.push(field, format!("must be a non-negative integer (got {})", n));
                Field::Invalid
            }
        },
    }
}

/// Check min/max ordering and the scale-to-zero rule; true when both hold
fn check_bounds(prefix: &str, min: u32, max: u32, allow_scale_to_zero: bool, errors: &mut ConfigError) -> bool {
    if min > max {
        errors.push(
            format!("{}min_replicas", prefix),
            format!("min_replicas ({}) must not exceed max_replicas ({})", min, max),
        );
        return false;
    }
    if max == 0 && !allow_scale_to_zero {
        errors.push(
            format!("{}max_replicas", prefix),
            "min_replicas and max_replicas are both 0; set allow_scale_to_zero to permit this",
        );
        return false;
    }
    true
}

fn validate_fallback(value: &Value, errors: &mut ConfigError) -> Option<Fallback> {
    let Some(obj) = value.as_object() else {
        errors.push("fallback", "must be a mapping");
        return None;
    };
    report_unknown_keys(obj, &["failure_threshold", "replicas"], "fallback", errors);

    let failure_threshold = match integer(obj.get("failure_threshold"), "fallback.failure_threshold", errors) {
        Field::Missing => {
            errors.push("fallback.failure_threshold", "required field is missing");
            None
        }
        Field::Value(n) if n > 0 => u32::try_from(n).ok(),
        Field::Value(n) => {
            errors.push(
                "fallback.failure_threshold",
                format!("must be greater than 0 (got {})", n),
            );
            None
        }
        Field::Invalid => None,
    };
    let replicas = match replica_count(obj.get("replicas"), "fallback.replicas", errors) {
        Field::Missing => {
            errors.push("fallback.replicas", "required field is missing");
            None
        }
        Field::Value(n) => Some(n),
        Field::Invalid => None,
    };

    Some(Fallback {
        failure_threshold: failure_threshold?,
        replicas: replicas?,
    })
}

fn report_unknown_keys(obj: &Map<String, Value>, allowed: &[&str], path: &str, errors: &mut ConfigError) {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            let field = if path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", path, key)
            };
            errors.push(field, "unknown field");
        }
    }
}

/// Look a field up under either of its accepted spellings
fn first_present<'a>(
    obj: &'a Map<String, Value>,
    primary: &'static str,
    alternate: &'static str,
) -> (&'static str, Option<&'a Value>) {
    match obj.get(primary) {
        Some(v) => (primary, Some(v)),
        None => match obj.get(alternate) {
            Some(v) => (alternate, Some(v)),
            None => (primary, None),
        },
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> ConfigValidator {
        ConfigValidator::default()
    }

    fn queue_trigger() -> Value {
        json!({
            "type": "rabbitmq",
            "metadata": {"queueName": "orders", "mode": "QueueLength", "value": 5}
        })
    }

    #[test]
    fn test_valid_queue_length_config() {
        let raw = json!({
            "min_replicas": 0,
            "max_replicas": 5,
            "triggers": [queue_trigger()]
        });

        let config = validator().validate(&raw).unwrap();
        assert_eq!(config.triggers.len(), 1);
        let trigger = &config.triggers[0];
        assert_eq!(trigger.kind, "rabbitmq");
        assert_eq!(trigger.min_replicas, 0);
        assert_eq!(trigger.max_replicas, 5);
        assert_eq!(trigger.metadata["value"], "5");
        assert_eq!(config.polling_interval, Duration::from_secs(30));
        assert_eq!(config.cooldown_period, Duration::from_secs(300));
        assert!(!config.allow_scale_to_zero);
    }

    #[test]
    fn test_defaults_apply_when_bounds_omitted() {
        let raw = json!({"triggers": [queue_trigger()]});
        let config = validator().validate(&raw).unwrap();
        assert_eq!(config.min_replicas(), 1);
        assert_eq!(config.max_replicas(), 10);
    }

    #[test]
    fn test_two_missing_required_fields_are_reported_together() {
        let raw = json!({
            "triggers": [
                {"type": "rabbitmq", "metadata": {}},
                {"metadata": {"value": "50"}}
            ]
        });

        let err = validator().validate(&raw).unwrap_err();
        assert_eq!(err.violations().len(), 2, "{}", err);
        assert!(err.has_field("triggers[0].metadata.queueName"));
        assert!(err.has_field("triggers[1].type"));
    }

    #[test]
    fn test_missing_triggers_and_bad_interval_are_both_reported() {
        let raw = json!({"polling_interval": 0});
        let err = validator().validate(&raw).unwrap_err();
        assert!(err.has_field("triggers"));
        assert!(err.has_field("polling_interval"));
    }

    #[test]
    fn test_empty_trigger_list_rejected() {
        let err = validator().validate(&json!({"triggers": []})).unwrap_err();
        assert_eq!(err.fields(), vec!["triggers"]);
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let raw = json!({
            "triggers": [{
                "type": "rabbitmq",
                "metadata": {"queueName": "orders"},
                "min_replicas": 6,
                "max_replicas": 5
            }]
        });
        let err = validator().validate(&raw).unwrap_err();
        assert_eq!(err.fields(), vec!["triggers[0].min_replicas"]);
    }

    #[test]
    fn test_min_equal_max_accepted() {
        let raw = json!({
            "triggers": [{
                "type": "rabbitmq",
                "metadata": {"queueName": "orders"},
                "min_replicas": 3,
                "max_replicas": 3
            }]
        });
        assert!(validator().validate(&raw).is_ok());
    }

    #[test]
    fn test_zero_zero_bounds_need_explicit_scale_to_zero() {
        let trigger = json!({
            "type": "rabbitmq",
            "metadata": {"queueName": "orders"},
            "min_replicas": 0,
            "max_replicas": 0
        });

        let err = validator()
            .validate(&json!({"triggers": [trigger.clone()]}))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["triggers[0].max_replicas"]);

        let config = validator()
            .validate(&json!({"allow_scale_to_zero": true, "triggers": [trigger]}))
            .unwrap();
        assert_eq!(config.min_replicas(), 0);
        assert_eq!(config.max_replicas(), 0);
    }

    #[test]
    fn test_negative_bounds_rejected() {
        let raw = json!({"min_replicas": -1, "triggers": [queue_trigger()]});
        let err = validator().validate(&raw).unwrap_err();
        assert_eq!(err.fields(), vec!["min_replicas"]);
    }

    #[test]
    fn test_unknown_trigger_type_rejected() {
        let raw = json!({"triggers": [{"type": "carrier-pigeon", "metadata": {}}]});
        let err = validator().validate(&raw).unwrap_err();
        assert_eq!(err.fields(), vec!["triggers[0].type"]);
        assert!(err.violations()[0].reason.contains("rabbitmq"));
    }

    #[test]
    fn test_cpu_trigger_needs_metric_type_and_cannot_scale_to_zero() {
        let raw = json!({
            "min_replicas": 0,
            "max_replicas": 4,
            "triggers": [{"type": "cpu", "metadata": {"value": "60"}}]
        });
        let err = validator().validate(&raw).unwrap_err();
        assert!(err.has_field("triggers[0].metricType"));
        assert!(err.has_field("triggers[0].min_replicas"));

        let raw = json!({
            "min_replicas": 1,
            "max_replicas": 4,
            "triggers": [{"type": "cpu", "metricType": "Utilization", "metadata": {"value": "60"}}]
        });
        let config = validator().validate(&raw).unwrap();
        assert_eq!(config.triggers[0].metric_type, Some(MetricType::Utilization));
    }

    #[test]
    fn test_unknown_keys_and_nested_metadata_rejected() {
        let raw = json!({
            "replicas": 3,
            "triggers": [{
                "type": "rabbitmq",
                "metadata": {"queueName": "orders", "nested": {"a": 1}},
                "extra": true
            }]
        });
        let err = validator().validate(&raw).unwrap_err();
        assert!(err.has_field("replicas"));
        assert!(err.has_field("triggers[0].extra"));
        assert!(err.has_field("triggers[0].metadata.nested"));
    }

    #[test]
    fn test_authentication_ref_spellings() {
        let raw = json!({
            "triggers": [
                {"type": "rabbitmq", "metadata": {"queueName": "a"}, "authenticationRef": {"name": "rabbit-auth"}},
                {"type": "redis", "metadata": {"listName": "jobs"}, "authentication_ref": "redis-auth"}
            ]
        });
        let config = validator().validate(&raw).unwrap();
        assert_eq!(config.triggers[0].authentication_ref.as_deref(), Some("rabbit-auth"));
        assert_eq!(config.triggers[1].authentication_ref.as_deref(), Some("redis-auth"));
    }

    #[test]
    fn test_fallback_validation() {
        let raw = json!({
            "fallback": {"failure_threshold": 0},
            "triggers": [queue_trigger()]
        });
        let err = validator().validate(&raw).unwrap_err();
        assert!(err.has_field("fallback.failure_threshold"));
        assert!(err.has_field("fallback.replicas"));

        let raw = json!({
            "fallback": {"failure_threshold": 3, "replicas": 2},
            "triggers": [queue_trigger()]
        });
        let config = validator().validate(&raw).unwrap();
        assert_eq!(
            config.fallback,
            Some(Fallback {
                failure_threshold: 3,
                replicas: 2
            })
        );
    }

    #[test]
    fn test_duplicate_trigger_names_rejected() {
        let raw = json!({
            "triggers": [
                {"type": "rabbitmq", "name": "q", "metadata": {"queueName": "a"}},
                {"type": "rabbitmq", "name": "q", "metadata": {"queueName": "b"}}
            ]
        });
        let err = validator().validate(&raw).unwrap_err();
        assert_eq!(err.fields(), vec!["triggers[1].name"]);
    }

    #[test]
    fn test_parse_yaml_document() {
        let text = r#"
workload: app1
min_replicas: 0
max_replicas: 5
polling_interval: 15
cooldown_period: 0
triggers:
  - type: rabbitmq
    metadata:
      queueName: orders
      mode: QueueLength
      value: "5"
"#;
        let config = validator().parse(text, DocumentFormat::Yaml).unwrap();
        assert_eq!(config.workload.as_deref(), Some("app1"));
        assert_eq!(config.polling_interval, Duration::from_secs(15));
        assert_eq!(config.cooldown_period, Duration::ZERO);
    }

    #[test]
    fn test_parse_failure_is_a_document_error() {
        let err = validator().parse("{not json", DocumentFormat::Json).unwrap_err();
        assert_eq!(err.fields(), vec![DOCUMENT]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keda.json");
        std::fs::write(
            &path,
            r#"{"max_replicas": 5, "triggers": [{"type": "redis", "metadata": {"listName": "jobs"}}]}"#,
        )
        .unwrap();

        let config = validator().load(&path).unwrap();
        assert_eq!(config.triggers[0].kind, "redis");
        assert_eq!(config.max_replicas(), 5);

        let missing = validator().load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(missing.fields(), vec![DOCUMENT]);
    }

    #[test]
    fn test_document_format_from_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("a.yaml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("a.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("a.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("config")), DocumentFormat::Json);
    }
}
