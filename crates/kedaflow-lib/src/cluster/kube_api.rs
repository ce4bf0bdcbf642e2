//! `kube`-backed implementation of [`ClusterApi`]
//!
//! Works on dynamic objects so one code path handles built-in kinds and
//! KEDA's custom resources alike.

use super::{ClusterApi, ClusterApiError};
use crate::models::{Manifest, ResourceKind, ResourceRef};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use serde_json::Value;
use tracing::debug;

/// Control-plane access through a `kube::Client`
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    field_manager: String,
}

impl KubeClusterApi {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn resource(kind: ResourceKind) -> ApiResource {
        let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.kind());
        ApiResource::from_gvk_with_plural(&gvk, kind.plural())
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = Self::resource(kind);
        match namespace {
            Some(ns) if kind.namespaced() => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn map_error(err: kube::Error) -> ClusterApiError {
    match err {
        kube::Error::Api(response) => ClusterApiError::Rejected {
            code: response.code,
            message: response.message,
        },
        other => ClusterApiError::Transport(other.to_string()),
    }
}

fn to_value(object: DynamicObject) -> Result<Value, ClusterApiError> {
    serde_json::to_value(object)
        .map_err(|e| ClusterApiError::Transport(format!("undecodable object: {}", e)))
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn server_version(&self) -> Result<String, ClusterApiError> {
        let info = self.client.apiserver_version().await.map_err(map_error)?;
        Ok(info.git_version)
    }

    async fn apply(&self, manifest: &Manifest) -> Result<(), ClusterApiError> {
        let api = self.api(manifest.kind, manifest.namespace.as_deref());
        let params = PatchParams::apply(&self.field_manager).force();

        api.patch(&manifest.name, &params, &Patch::Apply(&manifest.document))
            .await
            .map_err(map_error)?;

        debug!(manifest = %manifest, "Server-side apply accepted");
        Ok(())
    }

    async fn get(&self, target: &ResourceRef) -> Result<Option<Value>, ClusterApiError> {
        let api = self.api(target.kind, target.namespace.as_deref());
        match api.get_opt(&target.name).await.map_err(map_error)? {
            Some(object) => Ok(Some(to_value(object)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Value>, ClusterApiError> {
        let api = self.api(kind, Some(namespace));
        let params = ListParams::default().labels(label_selector);
        let objects = api.list(&params).await.map_err(map_error)?;
        objects.items.into_iter().map(to_value).collect()
    }
}
