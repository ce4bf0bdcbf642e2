//! In-memory fakes for unit tests

use crate::capability::{CommandOutput, CommandRunner};
use crate::cluster::{ClusterApi, ClusterApiError, ClusterConnector, ClusterHandle, Credentials};
use crate::models::{Manifest, ResourceKind, ResourceRef};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A cluster that stores applied documents and fakes controller status
pub struct FakeCluster {
    reachable: AtomicBool,
    converge: AtomicBool,
    probes: AtomicUsize,
    probe_delay: Mutex<Duration>,
    objects: Mutex<HashMap<ResourceRef, Value>>,
    applied: Mutex<Vec<Manifest>>,
    reject: Mutex<HashSet<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            converge: AtomicBool::new(true),
            probes: AtomicUsize::new(0),
            probe_delay: Mutex::new(Duration::ZERO),
            objects: Mutex::new(HashMap::new()),
            applied: Mutex::new(Vec::new()),
            reject: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Whether applied objects immediately report ready status
    pub fn set_converge(&self, converge: bool) {
        self.converge.store(converge, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = delay;
    }

    /// Reject any manifest with this name
    pub fn reject(&self, name: &str) {
        self.reject.lock().unwrap().insert(name.to_string());
    }

    pub fn insert(&self, target: ResourceRef, value: Value) {
        self.objects.lock().unwrap().insert(target, value);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Names of accepted manifests, in apply order
    pub fn applied_names(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    /// Seed a healthy KEDA installation at `version`
    pub fn install_keda(&self, version: &str) {
        self.insert(
            ResourceRef::namespaced(ResourceKind::Deployment, "keda", "keda-operator"),
            json!({
                "metadata": {
                    "name": "keda-operator",
                    "namespace": "keda",
                    "labels": {"app.kubernetes.io/version": version}
                },
                "spec": {"replicas": 1},
                "status": {"readyReplicas": 1}
            }),
        );
        for crd in ["scaledobjects.keda.sh", "triggerauthentications.keda.sh"] {
            self.insert(
                ResourceRef::cluster_scoped(ResourceKind::CustomResourceDefinition, crd),
                json!({"metadata": {"name": crd}}),
            );
        }
    }

    fn with_status(&self, manifest: &Manifest) -> Value {
        let mut doc = manifest.document.clone();
        if !self.converge.load(Ordering::SeqCst) {
            return doc;
        }
        match manifest.kind {
            ResourceKind::Deployment => {
                let replicas = doc["spec"]["replicas"].as_i64().unwrap_or(1);
                doc["metadata"]["generation"] = json!(1);
                doc["status"] = json!({
                    "observedGeneration": 1,
                    "replicas": replicas,
                    "updatedReplicas": replicas,
                    "readyReplicas": replicas,
                    "availableReplicas": replicas
                });
            }
            ResourceKind::ScaledObject => {
                doc["status"] = json!({
                    "conditions": [
                        {"type": "Ready", "status": "True", "reason": "ScaledObjectReady"},
                        {"type": "Active", "status": "False"}
                    ]
                });
            }
            _ => {}
        }
        doc
    }

    async fn check_reachable(&self) -> Result<(), ClusterApiError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClusterApiError::Transport("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn server_version(&self) -> Result<String, ClusterApiError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable().await?;
        Ok("v1.28.3".to_string())
    }

    async fn apply(&self, manifest: &Manifest) -> Result<(), ClusterApiError> {
        self.check_reachable().await?;
        if self.reject.lock().unwrap().contains(&manifest.name) {
            return Err(ClusterApiError::Rejected {
                code: 422,
                message: format!("{} is invalid", manifest),
            });
        }
        let stored = self.with_status(manifest);
        self.objects.lock().unwrap().insert(manifest.reference(), stored);
        self.applied.lock().unwrap().push(manifest.clone());
        Ok(())
    }

    async fn get(&self, target: &ResourceRef) -> Result<Option<Value>, ClusterApiError> {
        self.check_reachable().await?;
        Ok(self.objects.lock().unwrap().get(target).cloned())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Value>, ClusterApiError> {
        self.check_reachable().await?;
        let wanted: Vec<(&str, &str)> = label_selector
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let objects = self.objects.lock().unwrap();
        let mut found: Vec<_> = objects
            .iter()
            .filter(|(r, _)| r.kind == kind && r.namespace.as_deref() == Some(namespace))
            .filter(|(_, v)| {
                wanted
                    .iter()
                    .all(|(k, val)| v["metadata"]["labels"][*k].as_str() == Some(*val))
            })
            .map(|(r, v)| (r.name.clone(), v.clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, v)| v).collect())
    }
}

/// Attach a handle to a fake cluster
pub async fn handle_for(cluster: Arc<FakeCluster>) -> ClusterHandle {
    ClusterConnector::new(Duration::from_millis(500), Duration::from_secs(1), "kedaflow-test")
        .attach("https://127.0.0.1:6443", Credentials::default(), cluster)
        .await
        .unwrap()
}

/// Scripted command runner that records every invocation
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for commands whose joined argv starts with `prefix`
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .entry(prefix.to_string())
            .or_default()
            .push_back(output);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|argv| argv.join(" "))
            .collect()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String], _timeout: Duration) -> std::io::Result<CommandOutput> {
        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().cloned());
        let joined = argv.join(" ");
        self.calls.lock().unwrap().push(argv);

        let mut responses = self.responses.lock().unwrap();
        let mut prefixes: Vec<_> = responses
            .keys()
            .filter(|p| joined.starts_with(p.as_str()))
            .cloned()
            .collect();
        // Longest matching prefix wins
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        for prefix in prefixes {
            if let Some(queue) = responses.get_mut(&prefix) {
                if queue.len() > 1 {
                    return Ok(queue.pop_front().unwrap());
                }
                if let Some(last) = queue.front() {
                    return Ok(last.clone());
                }
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{}: command not found", program),
        ))
    }
}
