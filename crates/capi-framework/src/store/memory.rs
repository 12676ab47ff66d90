use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ListOptions, ObjectStore};
use crate::error::StoreError;
use crate::objects::{Object, ObjectKey, ObjectKind};

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Default)]
struct State {
    objects: BTreeMap<(ObjectKind, ObjectKey), Object>,
    create_failures: HashMap<ObjectKind, usize>,
    created: Vec<(ObjectKind, ObjectKey)>,
}

/// An in-process [`ObjectStore`].
///
/// Nothing reconciles the objects it holds. Tests play the part of the
/// controllers by mutating the store through [`MemoryStore::update`],
/// [`MemoryStore::insert`] and [`MemoryStore::remove_matching`] while a
/// sequence is polling it.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn normalize(kind: &ObjectKind, key: &ObjectKey) -> ObjectKey {
    if kind.is_cluster_scoped() {
        ObjectKey {
            namespace: None,
            name: key.name.clone(),
        }
    } else {
        ObjectKey {
            namespace: Some(
                key.namespace
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned()),
            ),
            name: key.name.clone(),
        }
    }
}

fn with_normalized_namespace(mut object: Object) -> Object {
    let kind = object.kind();
    let key = normalize(&kind, &object.key());
    object.meta_mut().namespace = key.namespace;
    object
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `object`, replacing any previous version, without recording a
    /// create.
    pub async fn insert(&self, object: impl Into<Object>) {
        let object = with_normalized_namespace(object.into());
        let id = (object.kind(), object.key());
        self.state.lock().await.objects.insert(id, object);
    }

    /// Applies `f` to the stored object of `kind` under `key`.
    pub async fn update<F>(&self, kind: &ObjectKind, key: &ObjectKey, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Object),
    {
        let key = normalize(kind, key);
        let mut state = self.state.lock().await;
        match state.objects.get_mut(&(kind.clone(), key.clone())) {
            Some(object) => {
                f(object);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: kind.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Applies `f` to every stored object of `kind`.
    pub async fn update_all<F>(&self, kind: &ObjectKind, mut f: F)
    where
        F: FnMut(&mut Object),
    {
        let mut state = self.state.lock().await;
        state
            .objects
            .iter_mut()
            .filter(|((k, _), _)| k == kind)
            .for_each(|(_, object)| f(object));
    }

    /// Removes every object, of any kind, passing `options`. Returns how many
    /// were removed.
    pub async fn remove_matching(&self, options: &ListOptions) -> usize {
        let mut state = self.state.lock().await;
        let before = state.objects.len();
        state.objects.retain(|_, object| !options.matches(object));
        before - state.objects.len()
    }

    /// All stored objects of `kind`.
    pub async fn objects(&self, kind: &ObjectKind) -> Vec<Object> {
        self.state
            .lock()
            .await
            .objects
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, object)| object.clone())
            .collect()
    }

    /// Makes the next `times` creates of `kind` fail, the way an API server
    /// does while its admission webhooks are still starting.
    pub async fn fail_next_creates(&self, kind: ObjectKind, times: usize) {
        self.state.lock().await.create_failures.insert(kind, times);
    }

    /// Every successful create so far, in order.
    pub async fn created(&self) -> Vec<(ObjectKind, ObjectKey)> {
        self.state.lock().await.created.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create(&self, object: &Object) -> Result<(), StoreError> {
        let object = with_normalized_namespace(object.clone());
        let kind = object.kind();
        let key = object.key();
        if key.name.is_empty() {
            return Err(StoreError::InvalidObject(format!("{} has no name", kind)));
        }

        let mut state = self.state.lock().await;
        if let Some(remaining) = state.create_failures.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                debug!(%kind, %key, "Rejecting create");
                return Err(StoreError::Rejected(format!(
                    "failed calling webhook for {} {}",
                    kind, key
                )));
            }
        }

        let id = (kind.clone(), key.clone());
        if state.objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: kind.to_string(),
                key: key.to_string(),
            });
        }
        state.objects.insert(id.clone(), object);
        state.created.push(id);
        Ok(())
    }

    async fn get(&self, kind: &ObjectKind, key: &ObjectKey) -> Result<Object, StoreError> {
        let key = normalize(kind, key);
        self.state
            .lock()
            .await
            .objects
            .get(&(kind.clone(), key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.to_string(),
                key: key.to_string(),
            })
    }

    async fn list(&self, kind: &ObjectKind, options: &ListOptions) -> Result<Vec<Object>, StoreError> {
        Ok(self
            .objects(kind)
            .await
            .into_iter()
            .filter(|object| options.matches(object))
            .collect())
    }

    async fn delete(&self, object: &Object) -> Result<(), StoreError> {
        let kind = object.kind();
        let key = normalize(&kind, &object.key());
        match self.state.lock().await.objects.remove(&(kind.clone(), key.clone())) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind: kind.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::objects::{Cluster, ClusterSpec, CLUSTER_LABEL_NAME};

    fn cluster(name: &str) -> Cluster {
        let mut cluster = Cluster::new(name, ClusterSpec::default());
        cluster.metadata.labels = Some(
            vec![(CLUSTER_LABEL_NAME.to_owned(), name.to_owned())]
                .into_iter()
                .collect(),
        );
        cluster
    }

    #[tokio::test]
    async fn objects_without_namespace_land_in_default() {
        let store = MemoryStore::new();
        store.create(&cluster("c1").into()).await.unwrap();

        let fetched = store
            .get(&ObjectKind::Cluster, &ObjectKey::namespaced("default", "c1"))
            .await
            .unwrap();
        assert_eq!(fetched.meta().namespace.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = MemoryStore::new();
        store.create(&cluster("c1").into()).await.unwrap();
        let err = store.create(&cluster("c1").into()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_creates(ObjectKind::Cluster, 2).await;

        assert!(store.create(&cluster("c1").into()).await.is_err());
        assert!(store.create(&cluster("c1").into()).await.is_err());
        store.create(&cluster("c1").into()).await.unwrap();
        assert_eq!(store.created().await.len(), 1);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get(&ObjectKind::Cluster, &ObjectKey::cluster_scoped("nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store.delete(&cluster("nope").into()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn remove_matching_honours_labels() {
        let store = MemoryStore::new();
        store.insert(cluster("c1")).await;
        store.insert(cluster("c2")).await;

        let removed = store
            .remove_matching(&ListOptions::default().matching_label(CLUSTER_LABEL_NAME, "c1"))
            .await;
        assert_eq!(removed, 1);
        let left = store
            .list(&ObjectKind::Cluster, &ListOptions::default())
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].key().name, "c2");
    }
}
