use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::{self, Scope};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ListOptions, ObjectStore};
use crate::error::StoreError;
use crate::objects::{
    Cluster, KubeadmConfig, KubeadmControlPlane, Machine, MachineDeployment, MachineSet, Object,
    ObjectKey, ObjectKind,
};

const DEFAULT_NAMESPACE: &str = "default";

/// A discovered resource and whether it lives in namespaces.
type Discovered = (ApiResource, bool);

/// An [`ObjectStore`] backed by a Kubernetes API server.
///
/// The core Cluster API kinds go through typed [`Api`]s. Every other kind is
/// resolved through API discovery on first use, which yields its plural name
/// and scope; the result is cached for the lifetime of the store.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    default_namespace: String,
    discovered: Arc<Mutex<HashMap<(String, String), Discovered>>>,
}

impl KubeStore {
    /// A store talking through `client`, defaulting to the `default` namespace.
    pub fn new(client: Client) -> Self {
        KubeStore {
            client,
            default_namespace: DEFAULT_NAMESPACE.to_owned(),
            discovered: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Namespace used for namespaced objects whose metadata carries none.
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        self.default_namespace = namespace.to_owned();
        self
    }

    /// The underlying Kubernetes client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn namespace_for(&self, kind: &ObjectKind, namespace: Option<&String>) -> Option<String> {
        if kind.is_cluster_scoped() {
            None
        } else {
            Some(
                namespace
                    .cloned()
                    .unwrap_or_else(|| self.default_namespace.clone()),
            )
        }
    }

    fn typed_api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource,
        K::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Looks up the resource behind `api_version` and `kind`.
    async fn discover(&self, api_version: &str, kind: &str) -> Result<Discovered, StoreError> {
        if api_version.is_empty() || kind.is_empty() {
            return Err(StoreError::InvalidObject(
                "object has no apiVersion or kind".to_owned(),
            ));
        }
        let id = (api_version.to_owned(), kind.to_owned());
        if let Some(found) = self.discovered.lock().await.get(&id) {
            return Ok(found.clone());
        }

        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk).await?;
        let namespaced = capabilities.scope == Scope::Namespaced;
        debug!(api_version, kind, plural = %resource.plural, namespaced, "Discovered resource");

        let found = (resource, namespaced);
        self.discovered.lock().await.insert(id, found.clone());
        Ok(found)
    }

    /// An [`Api`] for a discovered resource. `namespace` is ignored for
    /// cluster scoped resources; `None` addresses all namespaces.
    fn dynamic_api(&self, discovered: &Discovered, namespace: Option<&str>) -> Api<DynamicObject> {
        let (resource, namespaced) = discovered;
        match namespace {
            Some(ns) if *namespaced => Api::namespaced_with(self.client.clone(), ns, resource),
            _ => Api::all_with(self.client.clone(), resource),
        }
    }

    fn object_namespace<'a>(&'a self, namespace: Option<&'a String>) -> &'a str {
        namespace.map(String::as_str).unwrap_or(&self.default_namespace)
    }

    async fn create_typed<K>(&self, object: &K, namespace: Option<String>) -> Result<(), StoreError>
    where
        K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
    {
        self.typed_api::<K>(namespace.as_deref())
            .create(&PostParams::default(), object)
            .await?;
        Ok(())
    }

    async fn get_typed<K>(&self, key: &ObjectKey, namespace: Option<String>) -> Result<K, StoreError>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
    {
        Ok(self
            .typed_api::<K>(namespace.as_deref())
            .get(&key.name)
            .await?)
    }

    async fn list_typed<K>(&self, options: &ListOptions) -> Result<Vec<Object>, StoreError>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
        Object: From<K>,
    {
        let list = self
            .typed_api::<K>(options.namespace.as_deref())
            .list(&list_params(options))
            .await?;
        Ok(list.items.into_iter().map(Object::from).collect())
    }

    async fn delete_typed<K>(&self, key: &ObjectKey, namespace: Option<String>) -> Result<(), StoreError>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
        K::DynamicType: Default,
    {
        self.typed_api::<K>(namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn create_dynamic(&self, object: &DynamicObject) -> Result<(), StoreError> {
        let (api_version, kind) = type_of(object);
        let discovered = self.discover(api_version, kind).await?;
        let namespace = self.object_namespace(object.metadata.namespace.as_ref());
        let api = self.dynamic_api(&discovered, Some(namespace));
        if discovered.1 {
            api.create(&PostParams::default(), object).await?;
        } else {
            let mut object = object.clone();
            object.metadata.namespace = None;
            api.create(&PostParams::default(), &object).await?;
        }
        Ok(())
    }

    async fn delete_dynamic(&self, object: &DynamicObject) -> Result<(), StoreError> {
        let (api_version, kind) = type_of(object);
        let discovered = self.discover(api_version, kind).await?;
        let namespace = self.object_namespace(object.metadata.namespace.as_ref());
        let name = object.metadata.name.clone().unwrap_or_default();
        self.dynamic_api(&discovered, Some(namespace))
            .delete(&name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

fn type_of(object: &DynamicObject) -> (&str, &str) {
    match &object.types {
        Some(t) => (t.api_version.as_str(), t.kind.as_str()),
        None => ("", ""),
    }
}

fn list_params(options: &ListOptions) -> ListParams {
    match options.label_selector() {
        Some(selector) => ListParams::default().labels(&selector),
        None => ListParams::default(),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn create(&self, object: &Object) -> Result<(), StoreError> {
        let kind = object.kind();
        let namespace = self.namespace_for(&kind, object.meta().namespace.as_ref());
        debug!(object = %object.describe(), "Creating object");
        match object {
            Object::Cluster(o) => self.create_typed(o, namespace).await,
            Object::KubeadmControlPlane(o) => self.create_typed(o, namespace).await,
            Object::MachineDeployment(o) => self.create_typed(o, namespace).await,
            Object::MachineSet(o) => self.create_typed(o, namespace).await,
            Object::Machine(o) => self.create_typed(o, namespace).await,
            Object::KubeadmConfig(o) => self.create_typed(o, namespace).await,
            Object::Secret(o) => self.create_typed(o, namespace).await,
            Object::Node(o) => self.create_typed(o, namespace).await,
            Object::Provider(p) => self.create_dynamic(p.object()).await,
            Object::Unstructured(o) => self.create_dynamic(o).await,
        }
    }

    async fn get(&self, kind: &ObjectKind, key: &ObjectKey) -> Result<Object, StoreError> {
        let namespace = self.namespace_for(kind, key.namespace.as_ref());
        debug!(%kind, %key, "Getting object");
        match kind {
            ObjectKind::Cluster => self.get_typed::<Cluster>(key, namespace).await.map(Object::from),
            ObjectKind::KubeadmControlPlane => self
                .get_typed::<KubeadmControlPlane>(key, namespace)
                .await
                .map(Object::from),
            ObjectKind::MachineDeployment => self
                .get_typed::<MachineDeployment>(key, namespace)
                .await
                .map(Object::from),
            ObjectKind::MachineSet => self.get_typed::<MachineSet>(key, namespace).await.map(Object::from),
            ObjectKind::Machine => self.get_typed::<Machine>(key, namespace).await.map(Object::from),
            ObjectKind::KubeadmConfig => self
                .get_typed::<KubeadmConfig>(key, namespace)
                .await
                .map(Object::from),
            ObjectKind::Secret => self.get_typed::<Secret>(key, namespace).await.map(Object::from),
            ObjectKind::Node => self.get_typed::<Node>(key, namespace).await.map(Object::from),
            ObjectKind::Dynamic { api_version, kind } => {
                let discovered = self.discover(api_version, kind).await?;
                let namespace = self.object_namespace(key.namespace.as_ref());
                let object = self
                    .dynamic_api(&discovered, Some(namespace))
                    .get(&key.name)
                    .await?;
                Ok(Object::from(object))
            }
        }
    }

    async fn list(&self, kind: &ObjectKind, options: &ListOptions) -> Result<Vec<Object>, StoreError> {
        debug!(%kind, ?options, "Listing objects");
        match kind {
            ObjectKind::Cluster => self.list_typed::<Cluster>(options).await,
            ObjectKind::KubeadmControlPlane => self.list_typed::<KubeadmControlPlane>(options).await,
            ObjectKind::MachineDeployment => self.list_typed::<MachineDeployment>(options).await,
            ObjectKind::MachineSet => self.list_typed::<MachineSet>(options).await,
            ObjectKind::Machine => self.list_typed::<Machine>(options).await,
            ObjectKind::KubeadmConfig => self.list_typed::<KubeadmConfig>(options).await,
            ObjectKind::Secret => self.list_typed::<Secret>(options).await,
            ObjectKind::Node => {
                let cluster_wide = ListOptions {
                    namespace: None,
                    ..options.clone()
                };
                self.list_typed::<Node>(&cluster_wide).await
            }
            ObjectKind::Dynamic { api_version, kind } => {
                let discovered = self.discover(api_version, kind).await?;
                let list = self
                    .dynamic_api(&discovered, options.namespace.as_deref())
                    .list(&list_params(options))
                    .await?;
                Ok(list.items.into_iter().map(Object::from).collect())
            }
        }
    }

    async fn delete(&self, object: &Object) -> Result<(), StoreError> {
        let kind = object.kind();
        let key = object.key();
        let namespace = self.namespace_for(&kind, key.namespace.as_ref());
        debug!(object = %object.describe(), "Deleting object");
        match object {
            Object::Cluster(_) => self.delete_typed::<Cluster>(&key, namespace).await,
            Object::KubeadmControlPlane(_) => {
                self.delete_typed::<KubeadmControlPlane>(&key, namespace).await
            }
            Object::MachineDeployment(_) => {
                self.delete_typed::<MachineDeployment>(&key, namespace).await
            }
            Object::MachineSet(_) => self.delete_typed::<MachineSet>(&key, namespace).await,
            Object::Machine(_) => self.delete_typed::<Machine>(&key, namespace).await,
            Object::KubeadmConfig(_) => self.delete_typed::<KubeadmConfig>(&key, namespace).await,
            Object::Secret(_) => self.delete_typed::<Secret>(&key, namespace).await,
            Object::Node(_) => self.delete_typed::<Node>(&key, namespace).await,
            Object::Provider(p) => self.delete_dynamic(p.object()).await,
            Object::Unstructured(o) => self.delete_dynamic(o).await,
        }
    }
}
