//! Deleting a cluster and verifying that everything it owned went with it.
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::error::{Error, Result};
use crate::input::ControlPlaneClusterInput;
use crate::objects::{Cluster, Object, ObjectKind, CLUSTER_LABEL_NAME};
use crate::poll::{poll_until, poll_until_true, POLL_INTERVAL};
use crate::store::{ListOptions, ObjectStore};

/// The kinds that must be garbage collected together with their cluster.
pub const CLUSTER_OWNED_KINDS: [ObjectKind; 6] = [
    ObjectKind::Machine,
    ObjectKind::MachineSet,
    ObjectKind::MachineDeployment,
    ObjectKind::KubeadmControlPlane,
    ObjectKind::KubeadmConfig,
    ObjectKind::Secret,
];

/// Deletes the cluster and waits for everything to be gone.
///
/// After the cluster itself disappeared this waits, sharing one
/// `delete_timeout` budget, until none of the [`CLUSTER_OWNED_KINDS`]
/// labelled with the cluster's name remain in its namespace. Cascading
/// deletion may trail the cluster's own removal, so those checks poll too.
pub async fn clean_up_core_artifacts(input: &mut ControlPlaneClusterInput) -> Result<()> {
    input.set_defaults();
    let client = input.management.client().await?;
    clean_up_cluster(&*client, &input.cluster, input.delete_timeout).await
}

/// Deletes `cluster` through `client`, waits until no cluster remains in its
/// namespace, then waits for its owned objects to be garbage collected.
pub async fn clean_up_cluster(
    client: &dyn ObjectStore,
    cluster: &Cluster,
    delete_timeout: Duration,
) -> Result<()> {
    let namespace = cluster.metadata.namespace.as_deref().unwrap_or("default");
    let cluster_name = cluster.metadata.name.as_deref().unwrap_or_default();

    info!(cluster = cluster_name, namespace, "Deleting cluster");
    let cluster = Object::from(cluster.clone());
    client
        .delete(&cluster)
        .await
        .map_err(|e| Error::store("delete", cluster.describe(), e))?;

    let clusters = ListOptions::in_namespace(namespace);
    let clusters = &clusters;
    poll_until_true(
        &format!("all clusters in namespace {} to be deleted", namespace),
        POLL_INTERVAL,
        delete_timeout,
        move || async move {
            let remaining = client
                .list(&ObjectKind::Cluster, clusters)
                .await
                .map_err(|e| Error::store("list", "clusters", e))?;
            Ok(remaining.is_empty())
        },
    )
    .await?;

    info!("Ensuring all CAPI artifacts have been deleted");
    let owned = ListOptions::in_namespace(namespace).matching_label(CLUSTER_LABEL_NAME, cluster_name);
    ensure_artifacts_deleted(client, &owned, delete_timeout).await
}

/// Waits until no object of any of the [`CLUSTER_OWNED_KINDS`] passes
/// `options`. All kinds share the `timeout` budget.
pub async fn ensure_artifacts_deleted(
    client: &dyn ObjectStore,
    options: &ListOptions,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    for kind in CLUSTER_OWNED_KINDS.iter() {
        let remaining_budget = deadline.saturating_duration_since(Instant::now());
        poll_until(
            &format!("all {} objects to be removed", kind),
            POLL_INTERVAL,
            remaining_budget,
            move || async move {
                let remaining = client
                    .list(kind, options)
                    .await
                    .map_err(|e| Error::store("list", kind.to_string(), e))?;
                Ok(remaining
                    .iter()
                    .map(|o| o.key().to_string())
                    .collect::<Vec<_>>())
            },
            |remaining| remaining.is_empty(),
        )
        .await?;
    }
    Ok(())
}
