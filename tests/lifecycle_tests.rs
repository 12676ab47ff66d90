use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capi_framework::management::StaticManagementCluster;
use capi_framework::objects::{ObjectKey, ObjectKind, CLUSTER_LABEL_NAME};
use capi_framework::store::{ListOptions, MemoryStore};
use capi_framework::teardown::CLUSTER_OWNED_KINDS;
use capi_framework::{
    clean_up_core_artifacts, provision_control_plane_cluster, Error, ManagementCluster, ObjectStore,
};


use cluster_builder::ClusterBuilder;
use fake_controllers::{Behaviour, FakeControllers};

const NAMESPACE: &str = "capi-e2e-lifecycle";
const CLUSTER: &str = "c1";

struct Harness {
    management: Arc<MemoryStore>,
    workload: Arc<MemoryStore>,
    clusters: Arc<StaticManagementCluster>,
}

impl Harness {
    fn new() -> Self {
        let management = Arc::new(MemoryStore::new());
        let workload = Arc::new(MemoryStore::new());
        let clusters = Arc::new(
            StaticManagementCluster::new(management.clone()).with_workload(
                NAMESPACE,
                CLUSTER,
                workload.clone(),
            ),
        );
        Harness {
            management,
            workload,
            clusters,
        }
    }

    fn start_controllers(&self, behaviour: Behaviour) {
        FakeControllers::new(self.management.clone(), self.workload.clone())
            .with_behaviour(behaviour)
            .spawn();
    }

    async fn created_kinds(&self) -> Vec<ObjectKind> {
        self.management
            .created()
            .await
            .into_iter()
            .map(|(kind, _)| kind)
            .collect()
    }
}

fn docker(kind: &str) -> ObjectKind {
    ObjectKind::dynamic("infrastructure.cluster.x-k8s.io/v1alpha3", kind)
}

fn kubeadm(kind: &str) -> ObjectKind {
    ObjectKind::dynamic("bootstrap.cluster.x-k8s.io/v1alpha3", kind)
}

#[tokio::test(start_paused = true)]
async fn test_provision_cluster_with_workers() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.start_controllers(Behaviour::default());
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE)
        .with_workers(Some(3))
        .build(harness.clusters.clone());

    provision_control_plane_cluster(&mut input).await?;

    assert_eq!(input.create_timeout, Duration::from_secs(600));
    assert_eq!(input.delete_timeout, Duration::from_secs(300));
    assert_eq!(harness.workload.objects(&ObjectKind::Node).await.len(), 3);

    let kinds = harness.created_kinds().await;
    assert_eq!(
        kinds,
        vec![
            docker("DockerCluster"),
            ObjectKind::Cluster,
            ObjectKind::dynamic("v1", "ConfigMap"),
            docker("DockerMachineTemplate"),
            ObjectKind::KubeadmControlPlane,
            ObjectKind::MachineDeployment,
            kubeadm("KubeadmConfigTemplate"),
            docker("DockerMachineTemplate"),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_replicas_skip_machine_deployment() -> anyhow::Result<()> {
    for replicas in vec![Some(0), None] {
        let harness = Harness::new();
        harness.start_controllers(Behaviour::default());
        let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE)
            .with_workers(replicas)
            .build(harness.clusters.clone());

        provision_control_plane_cluster(&mut input).await?;

        let created = harness.management.created().await;
        assert!(
            created
                .iter()
                .all(|(kind, key)| *kind != ObjectKind::MachineDeployment && key.name != "c1-md-0"),
            "replicas {:?} created worker objects: {:?}",
            replicas,
            created
        );
        assert!(harness.workload.objects(&ObjectKind::Node).await.is_empty());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_explicit_machines_are_created_in_order() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.start_controllers(Behaviour::default());
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE)
        .with_machine("c1-worker-a")
        .build(harness.clusters.clone());

    provision_control_plane_cluster(&mut input).await?;

    let created = harness.management.created().await;
    let position = |kind: ObjectKind| {
        created
            .iter()
            .position(|(k, key)| *k == kind && key.name == "c1-worker-a")
            .unwrap_or_else(|| panic!("{} c1-worker-a was not created", kind))
    };
    let bootstrap_config = position(kubeadm("KubeadmConfig"));
    let infra_machine = position(docker("DockerMachine"));
    let machine = position(ObjectKind::Machine);
    assert!(bootstrap_config < infra_machine);
    assert!(infra_machine < machine);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_machine_that_never_runs_fails_provisioning() {
    let harness = Harness::new();
    let mut stuck_machines = HashMap::new();
    stuck_machines.insert("c1-control-plane-0".to_owned(), "Provisioning".to_owned());
    harness.start_controllers(Behaviour {
        stuck_machines,
        ..Default::default()
    });
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE)
        .with_timeouts(Duration::from_secs(60), Duration::from_secs(0))
        .build(harness.clusters.clone());

    let err = provision_control_plane_cluster(&mut input)
        .await
        .expect_err("provisioning should fail while a machine is not running");

    match err {
        Error::Timeout { last_observed, .. } => assert_eq!(
            last_observed,
            "machine c1-control-plane-0 is not running, it's Provisioning"
        ),
        other => panic!("expected a timeout, got {}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cluster_create_is_retried_until_webhooks_serve() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.start_controllers(Behaviour::default());
    harness
        .management
        .fail_next_creates(ObjectKind::Cluster, 3)
        .await;
    harness
        .management
        .fail_next_creates(ObjectKind::KubeadmControlPlane, 2)
        .await;
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE).build(harness.clusters.clone());

    provision_control_plane_cluster(&mut input).await?;

    let kinds = harness.created_kinds().await;
    assert!(kinds.contains(&ObjectKind::Cluster));
    assert!(kinds.contains(&ObjectKind::KubeadmControlPlane));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_infrastructure_cluster_create_is_not_retried() {
    let harness = Harness::new();
    harness
        .management
        .fail_next_creates(docker("DockerCluster"), 1)
        .await;
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE).build(harness.clusters.clone());

    let err = provision_control_plane_cluster(&mut input)
        .await
        .expect_err("a failed infrastructure cluster create should be fatal");

    assert!(matches!(err, Error::Store { operation: "create", .. }));
    assert!(harness.management.created().await.is_empty());
}

/// Fails the first few workload client requests, like a management cluster
/// that has not written the kubeconfig secret yet.
struct SlowKubeconfig {
    inner: StaticManagementCluster,
    failures_left: AtomicUsize,
}

#[async_trait]
impl ManagementCluster for SlowKubeconfig {
    async fn client(&self) -> capi_framework::Result<Arc<dyn ObjectStore>> {
        self.inner.client().await
    }

    async fn workload_client(
        &self,
        namespace: &str,
        name: &str,
    ) -> capi_framework::Result<Arc<dyn ObjectStore>> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::Assertion(format!(
                "secret {}-kubeconfig not found in {}",
                name, namespace
            )));
        }
        self.inner.workload_client(namespace, name).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_workload_client_errors_are_retried() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.start_controllers(Behaviour::default());
    let management = Arc::new(SlowKubeconfig {
        inner: (*harness.clusters).clone(),
        failures_left: AtomicUsize::new(2),
    });
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE)
        .with_workers(Some(1))
        .build(management.clone());

    provision_control_plane_cluster(&mut input).await?;

    assert_eq!(management.failures_left.load(Ordering::SeqCst), 0);
    assert_eq!(harness.workload.objects(&ObjectKind::Node).await.len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_teardown_waits_for_cascading_delete() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.start_controllers(Behaviour {
        cascade_delay: Duration::from_secs(45),
        ..Default::default()
    });
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE)
        .with_workers(Some(2))
        .with_machine("c1-worker-a")
        .build(harness.clusters.clone());
    provision_control_plane_cluster(&mut input).await?;

    let owned = ListOptions::in_namespace(NAMESPACE).matching_label(CLUSTER_LABEL_NAME, CLUSTER);
    for kind in CLUSTER_OWNED_KINDS.iter() {
        assert!(
            !harness.management.list(kind, &owned).await?.is_empty(),
            "no {} objects before teardown",
            kind
        );
    }

    clean_up_core_artifacts(&mut input).await?;

    let cluster = ObjectKey::namespaced(NAMESPACE, CLUSTER);
    let err = harness
        .management
        .get(&ObjectKind::Cluster, &cluster)
        .await
        .expect_err("cluster should be gone");
    assert!(err.is_not_found());
    for kind in CLUSTER_OWNED_KINDS.iter() {
        let remaining = harness.management.list(kind, &owned).await?;
        assert!(remaining.is_empty(), "{} objects remain: {:?}", kind, remaining);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_teardown_times_out_when_objects_linger() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.start_controllers(Behaviour {
        skip_cascade: true,
        ..Default::default()
    });
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE)
        .with_timeouts(Duration::from_secs(0), Duration::from_secs(120))
        .build(harness.clusters.clone());
    provision_control_plane_cluster(&mut input).await?;

    let err = clean_up_core_artifacts(&mut input)
        .await
        .expect_err("teardown should time out");

    match err {
        Error::Timeout {
            description,
            timeout,
            ..
        } => {
            assert_eq!(description, "all Machine objects to be removed");
            assert!(timeout <= Duration::from_secs(120));
        }
        other => panic!("expected a timeout, got {}", other),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_teardown_of_missing_cluster_fails() {
    let harness = Harness::new();
    let mut input = ClusterBuilder::new(CLUSTER, NAMESPACE).build(harness.clusters.clone());

    let err = clean_up_core_artifacts(&mut input)
        .await
        .expect_err("deleting a cluster that was never created should fail");

    match err {
        Error::Store {
            operation, source, ..
        } => {
            assert_eq!(operation, "delete");
            assert!(source.is_not_found());
        }
        other => panic!("expected a store error, got {}", other),
    }
}
