//! Creating a control plane cluster and waiting for it to come up.
use std::convert::TryFrom;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result, StoreError};
use crate::input::ControlPlaneClusterInput;
use crate::objects::{
    Cluster, ClusterPhase, KubeadmControlPlane, Machine, MachinePhase, Object, ObjectKey,
    ObjectKind, ProviderObject, CLUSTER_LABEL_NAME,
};
use crate::poll::{poll_until, poll_until_true, POLL_INTERVAL};
use crate::store::{ListOptions, ObjectStore};

/// Creates an n node control plane cluster and waits until it is usable.
///
/// The objects are created in dependency order: infrastructure cluster,
/// cluster, related resources, machine template, control plane, explicitly
/// listed machines and, when it asks for at least one replica, the machine
/// deployment with its templates. The cluster and control plane creates are
/// retried until `create_timeout`, since the admission webhooks may not be
/// serving yet.
///
/// Once everything exists this waits, each time for at most `create_timeout`,
/// until:
/// * the cluster is in the `Provisioned` phase
/// * the workload cluster has as many nodes as the machine deployment has
///   replicas
/// * every machine of the cluster is `Running`
/// * the control plane reports itself initialized
pub async fn provision_control_plane_cluster(input: &mut ControlPlaneClusterInput) -> Result<()> {
    input.set_defaults();
    let input = &*input;
    let timeout = input.create_timeout;
    let namespace = input.namespace();
    let cluster_name = input.cluster_name();

    let client = input.management.client().await?;
    let client = &*client;

    info!("Creating an InfrastructureCluster resource");
    create_once(
        client,
        ProviderObject::InfrastructureCluster(input.infra_cluster.clone()).into(),
    )
    .await?;

    info!("Creating a Cluster resource linked to the InfrastructureCluster resource");
    create_eventually(client, input.cluster.clone().into(), timeout).await?;

    info!("Creating related resources");
    for resource in &input.related_resources {
        let object = Object::from(resource.clone());
        info!(kind = %object.kind(), "Creating related resource");
        create_eventually(client, object, timeout).await?;
    }

    info!("Creating the machine template");
    create_once(
        client,
        ProviderObject::MachineTemplate(input.machine_template.clone()).into(),
    )
    .await?;

    info!("Creating a KubeadmControlPlane");
    create_eventually(client, input.control_plane.clone().into(), timeout).await?;

    for node in &input.nodes {
        info!(machine = ?node.machine.metadata.name, "Creating machine resources");
        create_once(
            client,
            ProviderObject::BootstrapConfig(node.bootstrap_config.clone()).into(),
        )
        .await?;
        create_once(
            client,
            ProviderObject::InfraMachine(node.infra_machine.clone()).into(),
        )
        .await?;
        create_once(client, node.machine.clone().into()).await?;
    }

    info!("Waiting for cluster to enter the provisioned phase");
    let cluster_key = ObjectKey::namespaced(namespace, cluster_name);
    wait_for_cluster_phase(client, &cluster_key, ClusterPhase::Provisioned, timeout).await?;

    if let Some(bundle) = &input.machine_deployment {
        match bundle.machine_deployment.positive_replicas() {
            Some(replicas) => {
                info!("Creating a core MachineDeployment resource");
                create_once(client, bundle.machine_deployment.clone().into()).await?;

                info!("Creating a BootstrapConfigTemplate resource");
                create_once(
                    client,
                    ProviderObject::BootstrapConfigTemplate(bundle.bootstrap_config_template.clone())
                        .into(),
                )
                .await?;

                info!("Creating an InfrastructureMachineTemplate resource");
                create_once(
                    client,
                    ProviderObject::InfraMachineTemplate(bundle.infra_machine_template.clone())
                        .into(),
                )
                .await?;

                info!(replicas, "Waiting for the workload nodes to exist");
                wait_for_workload_nodes(input, replicas).await?;
            }
            None => info!("MachineDeployment has no replicas, not creating it"),
        }
    }

    info!("Waiting for all machines to be running");
    let machines = ListOptions::in_namespace(namespace).matching_label(CLUSTER_LABEL_NAME, cluster_name);
    wait_for_machines_running(client, &machines, timeout).await?;

    info!("Waiting for the control plane to be ready");
    let control_plane_key = ObjectKey {
        namespace: Some(
            input
                .control_plane
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| namespace.to_owned()),
        ),
        name: input.control_plane.metadata.name.clone().unwrap_or_default(),
    };
    wait_for_control_plane_initialized(client, &control_plane_key, timeout).await
}

/// Creates `object`, failing on the first error.
pub async fn create_once(client: &dyn ObjectStore, object: Object) -> Result<()> {
    client
        .create(&object)
        .await
        .map_err(|e| Error::store("create", object.describe(), e))
}

/// Creates `object`, retrying every [`POLL_INTERVAL`] until it succeeds or
/// `timeout` elapses.
pub async fn create_eventually(client: &dyn ObjectStore, object: Object, timeout: Duration) -> Result<()> {
    let description = format!("{} to be created", object.describe());
    let object = &object;
    poll_until_true(&description, POLL_INTERVAL, timeout, move || async move {
        match client.create(object).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(object = %object.describe(), error = %e, "Create failed");
                Err(Error::store("create", object.describe(), e))
            }
        }
    })
    .await
}

/// Fetches the object of `kind` under `key` as its typed representation.
pub async fn get_typed<K>(client: &dyn ObjectStore, kind: &ObjectKind, key: &ObjectKey) -> Result<K>
where
    K: TryFrom<Object, Error = StoreError>,
{
    let describe = || format!("{} {}", kind.name(), key);
    let object = client
        .get(kind, key)
        .await
        .map_err(|e| Error::store("get", describe(), e))?;
    K::try_from(object).map_err(|e| Error::store("get", describe(), e))
}

/// Lists objects of `kind` as their typed representation.
pub async fn list_typed<K>(client: &dyn ObjectStore, kind: &ObjectKind, options: &ListOptions) -> Result<Vec<K>>
where
    K: TryFrom<Object, Error = StoreError>,
{
    client
        .list(kind, options)
        .await
        .map_err(|e| Error::store("list", kind.to_string(), e))?
        .into_iter()
        .map(|object| K::try_from(object).map_err(|e| Error::store("list", kind.to_string(), e)))
        .collect()
}

/// Waits until the cluster under `key` reports `phase`.
pub async fn wait_for_cluster_phase(
    client: &dyn ObjectStore,
    key: &ObjectKey,
    phase: ClusterPhase,
    timeout: Duration,
) -> Result<()> {
    poll_until(
        &format!("cluster {} to enter the {} phase", key, phase),
        POLL_INTERVAL,
        timeout,
        move || async move {
            let cluster: Cluster = get_typed(client, &ObjectKind::Cluster, key).await?;
            Ok(cluster.phase().to_owned())
        },
        |observed| observed == phase.as_str(),
    )
    .await
    .map(|_| ())
}

/// Waits until the workload cluster of `input` has exactly `replicas` nodes.
pub async fn wait_for_workload_nodes(input: &ControlPlaneClusterInput, replicas: usize) -> Result<()> {
    let management = &*input.management;
    let namespace = input.namespace();
    let name = input.cluster_name();
    poll_until(
        &format!("{} workload nodes in cluster {}/{}", replicas, namespace, name),
        POLL_INTERVAL,
        input.create_timeout,
        move || async move {
            let workload = management.workload_client(namespace, name).await?;
            let nodes = workload
                .list(&ObjectKind::Node, &ListOptions::default())
                .await
                .map_err(|e| Error::store("list", "workload nodes", e))?;
            Ok(nodes.len())
        },
        |count| *count == replicas,
    )
    .await
    .map(|_| ())
}

/// Waits until every machine passing `options` is in the `Running` phase.
pub async fn wait_for_machines_running(
    client: &dyn ObjectStore,
    options: &ListOptions,
    timeout: Duration,
) -> Result<()> {
    poll_until_true("all machines to be running", POLL_INTERVAL, timeout, move || async move {
        let machines: Vec<Machine> = list_typed(client, &ObjectKind::Machine, options).await?;
        check_machines_running(&machines)?;
        Ok(true)
    })
    .await
}

fn check_machines_running(machines: &[Machine]) -> Result<()> {
    for machine in machines {
        if machine.phase() != MachinePhase::Running.as_str() {
            return Err(Error::Assertion(format!(
                "machine {} is not running, it's {}",
                machine.metadata.name.as_deref().unwrap_or_default(),
                machine.phase()
            )));
        }
    }
    Ok(())
}

/// Waits until the control plane under `key` reports `status.initialized`.
pub async fn wait_for_control_plane_initialized(
    client: &dyn ObjectStore,
    key: &ObjectKey,
    timeout: Duration,
) -> Result<()> {
    poll_until_true(
        &format!("control plane {} to be initialized", key),
        POLL_INTERVAL,
        timeout,
        move || async move {
            let control_plane: KubeadmControlPlane =
                get_typed(client, &ObjectKind::KubeadmControlPlane, key).await?;
            Ok(control_plane.initialized())
        },
    )
    .await
}
