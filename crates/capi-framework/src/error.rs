//! Errors returned by the stores and the test sequences.
use std::time::Duration;

use thiserror::Error;

/// A failed call against an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object of `kind` is stored under `key`.
    #[error("{kind} {key} not found")]
    NotFound {
        /// The kind that was asked for.
        kind: String,
        /// Namespace and name that were asked for.
        key: String,
    },

    /// An object of `kind` is already stored under `key`.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// The kind of the object being created.
        kind: String,
        /// Namespace and name of the object being created.
        key: String,
    },

    /// The object is missing something the store needs to address it.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// The store refused the call, e.g. because an admission webhook is not
    /// serving yet.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// An object was converted to a type it does not hold.
    #[error("expected {expected} but got {found}")]
    UnexpectedKind {
        /// The kind the caller wanted.
        expected: String,
        /// The kind the object has.
        found: String,
    },

    /// The Kubernetes API call failed.
    #[error("Kubernetes reported error: {source}")]
    Api {
        /// The client error.
        #[from]
        source: kube::Error,
    },

    /// An object could not be converted between its typed and untyped forms.
    #[error("unable to convert object: {source}")]
    Serialization {
        /// The conversion error.
        #[from]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether the object addressed does not exist, as reported by either a
    /// store or the API server (HTTP 404).
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Api {
                source: kube::Error::Api(response),
            } => response.code == 404,
            _ => false,
        }
    }
}

/// Why a provisioning or teardown sequence stopped.
#[derive(Error, Debug)]
pub enum Error {
    /// A store operation failed outside of any retry loop.
    #[error("failed to {operation} {object}: {source}")]
    Store {
        /// The store call, e.g. `create`.
        operation: &'static str,
        /// Description of the object the call was about.
        object: String,
        /// What the store reported.
        #[source]
        source: StoreError,
    },

    /// A polled condition did not reach its target in time.
    #[error("timed out after {timeout:?} waiting for {description} (last observed: {last_observed})")]
    Timeout {
        /// What was waited for.
        description: String,
        /// How long it was waited for.
        timeout: Duration,
        /// The state seen by the last poll, or its error.
        last_observed: String,
    },

    /// An observed state does not match what was expected.
    #[error("{0}")]
    Assertion(String),

    /// No client for a workload cluster could be built.
    #[error("failed to get workload client for cluster {cluster}: {source}")]
    WorkloadClient {
        /// `namespace/name` of the workload cluster.
        cluster: String,
        /// Why the client could not be built.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The cluster manifests could not be loaded.
    #[error("invalid cluster manifests: {0}")]
    Manifest(String),
}

impl Error {
    pub(crate) fn store(operation: &'static str, object: impl Into<String>, source: StoreError) -> Self {
        Error::Store {
            operation,
            object: object.into(),
            source,
        }
    }
}

/// Convenience alias for results of the test sequences.
pub type Result<T> = std::result::Result<T, Error>;
