use std::sync::Arc;

use anyhow::Context;
use capi_framework::config::{Action, Config};
use capi_framework::input::DEFAULT_DELETE_TIMEOUT;
use capi_framework::management::KubeManagementCluster;
use capi_framework::manifest::ClusterManifests;
use capi_framework::objects::{Cluster, ObjectKey, ObjectKind};
use capi_framework::provision::get_typed;
use capi_framework::teardown::clean_up_cluster;
use capi_framework::{clean_up_core_artifacts, provision_control_plane_cluster, ManagementCluster};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::new_from_flags(env!("CARGO_PKG_VERSION"));

    tracing_subscriber::fmt::init();

    // Reads a kubeconfig file first, then falls back on an in-cluster
    // configuration.
    let management = Arc::new(KubeManagementCluster::try_default().await?);

    match &config.action {
        Action::Provision {
            manifests,
            teardown,
        } => {
            let text = std::fs::read_to_string(manifests)
                .with_context(|| format!("failed to read {}", manifests.display()))?;
            let mut input = ClusterManifests::from_yaml(&text)?
                .with_default_namespace(&config.namespace)
                .into_input(management, config.create_timeout, config.delete_timeout);

            provision_control_plane_cluster(&mut input).await?;
            info!(cluster = input.cluster_name(), "Cluster is up");

            if *teardown {
                clean_up_core_artifacts(&mut input).await?;
                info!(cluster = input.cluster_name(), "Cluster is gone");
            }
        }
        Action::Teardown { cluster } => {
            let client = management.client().await?;
            let key = ObjectKey::namespaced(&config.namespace, cluster);
            let found: Cluster = get_typed(&*client, &ObjectKind::Cluster, &key).await?;

            let timeout = if config.delete_timeout.as_secs() == 0 {
                DEFAULT_DELETE_TIMEOUT
            } else {
                config.delete_timeout
            };
            clean_up_cluster(&*client, &found, timeout).await?;
            info!(cluster = cluster.as_str(), "Cluster is gone");
        }
    }

    Ok(())
}
