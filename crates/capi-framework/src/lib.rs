//! A crate for end-to-end testing of [Cluster API](https://cluster-api.sigs.k8s.io/)
//! style cluster lifecycles.
//!
//! The crate provides the [`ObjectStore`] trait for talking to a cluster, the
//! [`ManagementCluster`] trait for reaching the management cluster and the
//! workload clusters it provisions, and two sequences built on top of them:
//! [`provision_control_plane_cluster`] creates a cluster and waits until it
//! is usable, [`clean_up_core_artifacts`] deletes it and waits until
//! everything it owned was garbage collected.
//!
//! Nothing here reconciles anything. The sequences create objects and then
//! poll, every [`poll::POLL_INTERVAL`], for the controllers to do their work.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use capi_framework::management::KubeManagementCluster;
//! use capi_framework::manifest::ClusterManifests;
//! use capi_framework::{clean_up_core_artifacts, provision_control_plane_cluster};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let management = Arc::new(KubeManagementCluster::try_default().await?);
//!     let text = std::fs::read_to_string("cluster.yaml")?;
//!     let mut input = ClusterManifests::from_yaml(&text)?
//!         .with_default_namespace("capi-e2e")
//!         .into_input(management, Duration::from_secs(0), Duration::from_secs(0));
//!
//!     provision_control_plane_cluster(&mut input).await?;
//!     clean_up_core_artifacts(&mut input).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(feature = "docs", feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod input;
pub mod management;
pub mod manifest;
pub mod objects;
pub mod poll;
pub mod provision;
pub mod store;
pub mod teardown;

#[doc(inline)]
pub use error::{Error, Result, StoreError};
#[doc(inline)]
pub use input::{ControlPlaneClusterInput, MachineDeploymentBundle, NodeObjects};
#[doc(inline)]
pub use management::ManagementCluster;
#[doc(inline)]
pub use provision::provision_control_plane_cluster;
#[doc(inline)]
pub use store::ObjectStore;
#[doc(inline)]
pub use teardown::clean_up_core_artifacts;
