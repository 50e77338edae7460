//! Access to the backing resource store
//!
//! The reconciler never talks to `kube::Api` directly. It goes through
//! [`ObjectStore`] and [`StatusStore`], which the [`KubeStore`] implements on
//! top of the API server. Not-found is reported as `Ok(None)`, every other
//! failure as an error.

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::{Middleware, MiddlewareStatus};
use crate::resources::FIELD_MANAGER;

/// Fetch, create and replace operations for one resource type
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Create a new object
    async fn create(&self, namespace: &str, object: &K) -> Result<K>;

    /// Replace an existing object with the given state
    async fn replace(&self, namespace: &str, object: &K) -> Result<K>;
}

/// Status subresource writes for Middleware
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn patch_status(&self, namespace: &str, name: &str, status: &MiddlewareStatus)
    -> Result<()>;
}

/// Everything the reconciler needs from the store
pub trait ResourceStore:
    ObjectStore<Middleware>
    + ObjectStore<ConfigMap>
    + ObjectStore<Secret>
    + ObjectStore<Deployment>
    + ObjectStore<Service>
    + StatusStore
    + 'static
{
}

impl<T> ResourceStore for T where
    T: ObjectStore<Middleware>
        + ObjectStore<ConfigMap>
        + ObjectStore<Secret>
        + ObjectStore<Deployment>
        + ObjectStore<Service>
        + StatusStore
        + 'static
{
}

/// Store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + std::fmt::Debug
        + Send
        + Sync
        + 'static,
    <K as Resource>::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K> {
        let created = self
            .api::<K>(namespace)
            .create(&PostParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            }, object)
            .await?;
        debug!("Created {}: {}", K::kind(&Default::default()), created.name_any());
        Ok(created)
    }

    async fn replace(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object
            .meta()
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let replaced = self
            .api::<K>(namespace)
            .replace(&name, &PostParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            }, object)
            .await?;
        debug!("Replaced {}: {}", K::kind(&Default::default()), name);
        Ok(replaced)
    }
}

#[async_trait]
impl StatusStore for KubeStore {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MiddlewareStatus,
    ) -> Result<()> {
        let api: Api<Middleware> = self.api(namespace);

        let mut status_value = serde_json::to_value(status)?;
        // Merge patches only clear fields that are explicitly null
        if status.last_probe_error.is_none() {
            status_value["lastProbeError"] = serde_json::Value::Null;
        }
        let patch = serde_json::json!({
            "status": status_value
        });

        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
