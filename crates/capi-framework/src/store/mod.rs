//! The object-store client the test sequences talk to.
//!
//! [`ObjectStore`] offers create, get, list and delete, each
//! either succeeding or failing once. Retrying is the caller's business.
use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::objects::{Object, ObjectKey, ObjectKind};

mod kubernetes;
mod memory;

pub use kubernetes::KubeStore;
pub use memory::MemoryStore;

/// Filters for [`ObjectStore::list`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListOptions {
    /// Restrict the list to one namespace. `None` lists across namespaces.
    pub namespace: Option<String>,
    /// Only return objects carrying all of these labels.
    pub labels: BTreeMap<String, String>,
}

impl ListOptions {
    /// Lists in `namespace` only, without label filters.
    pub fn in_namespace(namespace: &str) -> Self {
        ListOptions {
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        }
    }

    /// Additionally requires label `key` to have `value`.
    pub fn matching_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_owned(), value.to_owned());
        self
    }

    /// The labels rendered as a Kubernetes label selector, e.g. `a=b,c=d`.
    pub fn label_selector(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Whether `object` passes these filters.
    pub fn matches(&self, object: &Object) -> bool {
        if let Some(namespace) = &self.namespace {
            if object.meta().namespace.as_ref() != Some(namespace) {
                return false;
            }
        }
        self.labels.iter().all(|(k, v)| object.has_label(k, v))
    }
}

/// A client for a declarative object store such as the Kubernetes API.
///
/// **Note**: this trait is defined using
/// [async-trait](https://crates.io/crates/async-trait) so it can be used as a
/// trait object shared between the management and workload clusters.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates `object`. Fails if it already exists.
    async fn create(&self, object: &Object) -> Result<(), StoreError>;

    /// Fetches the object of `kind` stored under `key`.
    async fn get(&self, kind: &ObjectKind, key: &ObjectKey) -> Result<Object, StoreError>;

    /// Lists objects of `kind` passing `options`.
    async fn list(&self, kind: &ObjectKind, options: &ListOptions)
        -> Result<Vec<Object>, StoreError>;

    /// Requests deletion of `object`.
    async fn delete(&self, object: &Object) -> Result<(), StoreError>;
}
