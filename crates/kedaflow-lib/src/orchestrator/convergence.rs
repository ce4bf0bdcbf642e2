//! Readiness checks on live objects

use crate::models::ResourceKind;
use serde_json::Value;

/// Replica counts read from a Deployment's status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaCounts {
    pub desired: i32,
    pub updated: i32,
    pub ready: i32,
    pub available: i32,
    /// The controller has observed the latest spec
    pub observed: bool,
}

impl ReplicaCounts {
    pub fn from_deployment(doc: &Value) -> Self {
        let int = |v: &Value| v.as_i64().unwrap_or(0) as i32;
        let generation = doc["metadata"]["generation"].as_i64().unwrap_or(0);
        let observed_generation = doc["status"]["observedGeneration"].as_i64().unwrap_or(0);

        Self {
            desired: doc["spec"]["replicas"].as_i64().map(|r| r as i32).unwrap_or(1),
            updated: int(&doc["status"]["updatedReplicas"]),
            ready: int(&doc["status"]["readyReplicas"]),
            available: int(&doc["status"]["availableReplicas"]),
            observed: observed_generation >= generation,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.observed && self.updated >= self.desired && self.ready >= self.desired
    }
}

/// Status of a named condition: `Some(true)` for `"True"`, `None` when absent
pub fn condition(doc: &Value, kind: &str) -> Option<bool> {
    doc["status"]["conditions"]
        .as_array()?
        .iter()
        .find(|c| c["type"].as_str() == Some(kind))
        .map(|c| c["status"].as_str() == Some("True"))
}

fn condition_message(doc: &Value, kind: &str) -> Option<String> {
    doc["status"]["conditions"]
        .as_array()?
        .iter()
        .find(|c| c["type"].as_str() == Some(kind))
        .and_then(|c| c["message"].as_str().or_else(|| c["reason"].as_str()))
        .map(str::to_string)
}

/// Outcome of one readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Not ready yet, with what is still missing
    Pending(String),
}

/// Decide whether one applied object has converged
pub fn evaluate(kind: ResourceKind, live: Option<&Value>) -> Readiness {
    let doc = match live {
        Some(doc) => doc,
        None => return Readiness::Pending("not found".to_string()),
    };

    match kind {
        ResourceKind::Deployment => {
            let counts = ReplicaCounts::from_deployment(doc);
            if counts.is_converged() {
                Readiness::Ready
            } else if !counts.observed {
                Readiness::Pending("controller has not observed the latest spec".to_string())
            } else {
                Readiness::Pending(format!(
                    "{}/{} ready, {} updated",
                    counts.ready, counts.desired, counts.updated
                ))
            }
        }
        ResourceKind::ScaledObject => match condition(doc, "Ready") {
            Some(true) => Readiness::Ready,
            Some(false) => Readiness::Pending(
                condition_message(doc, "Ready").unwrap_or_else(|| "Ready=False".to_string()),
            ),
            None => Readiness::Pending("no Ready condition reported".to_string()),
        },
        _ => Readiness::Ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deployment_ready_when_replicas_caught_up() {
        let doc = json!({
            "metadata": {"generation": 2},
            "spec": {"replicas": 3},
            "status": {"observedGeneration": 2, "updatedReplicas": 3, "readyReplicas": 3}
        });
        assert_eq!(evaluate(ResourceKind::Deployment, Some(&doc)), Readiness::Ready);
    }

    #[test]
    fn test_deployment_pending_on_stale_generation() {
        let doc = json!({
            "metadata": {"generation": 3},
            "spec": {"replicas": 1},
            "status": {"observedGeneration": 2, "updatedReplicas": 1, "readyReplicas": 1}
        });
        assert!(matches!(
            evaluate(ResourceKind::Deployment, Some(&doc)),
            Readiness::Pending(_)
        ));
    }

    #[test]
    fn test_deployment_pending_reports_counts() {
        let doc = json!({
            "metadata": {"generation": 1},
            "spec": {"replicas": 3},
            "status": {"observedGeneration": 1, "updatedReplicas": 3, "readyReplicas": 1}
        });
        assert_eq!(
            evaluate(ResourceKind::Deployment, Some(&doc)),
            Readiness::Pending("1/3 ready, 3 updated".to_string())
        );
    }

    #[test]
    fn test_scaled_to_zero_counts_as_converged() {
        let doc = json!({
            "metadata": {"generation": 2},
            "spec": {"replicas": 0},
            "status": {"observedGeneration": 2}
        });
        assert_eq!(evaluate(ResourceKind::Deployment, Some(&doc)), Readiness::Ready);
    }

    #[test]
    fn test_scaled_object_needs_ready_condition() {
        let ready = json!({"status": {"conditions": [{"type": "Ready", "status": "True"}]}});
        let failing = json!({"status": {"conditions": [
            {"type": "Ready", "status": "False", "message": "ScaledObject doesn't have correct scaleTargetRef"}
        ]}});
        let fresh = json!({"status": {}});

        assert_eq!(evaluate(ResourceKind::ScaledObject, Some(&ready)), Readiness::Ready);
        assert_eq!(
            evaluate(ResourceKind::ScaledObject, Some(&failing)),
            Readiness::Pending("ScaledObject doesn't have correct scaleTargetRef".to_string())
        );
        assert!(matches!(
            evaluate(ResourceKind::ScaledObject, Some(&fresh)),
            Readiness::Pending(_)
        ));
    }

    #[test]
    fn test_missing_object_is_pending() {
        assert!(matches!(evaluate(ResourceKind::Service, None), Readiness::Pending(_)));
        assert_eq!(
            evaluate(ResourceKind::Service, Some(&json!({"metadata": {"name": "app1-service"}}))),
            Readiness::Ready
        );
    }

    #[test]
    fn test_condition_lookup() {
        let doc = json!({"status": {"conditions": [
            {"type": "Ready", "status": "True"},
            {"type": "Active", "status": "False"}
        ]}});
        assert_eq!(condition(&doc, "Ready"), Some(true));
        assert_eq!(condition(&doc, "Active"), Some(false));
        assert_eq!(condition(&doc, "Fallback"), None);
    }
}
