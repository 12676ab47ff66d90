//! The descriptor of a cluster to provision and tear down.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kube::core::DynamicObject;

use crate::management::ManagementCluster;
use crate::objects::{Cluster, KubeadmControlPlane, Machine, MachineDeployment};

/// Create timeout applied when none was given.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Delete timeout applied when none was given.
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A `MachineDeployment` together with the templates its machines are built
/// from.
#[derive(Clone, Debug)]
pub struct MachineDeploymentBundle {
    /// The deployment itself.
    pub machine_deployment: MachineDeployment,
    /// Referenced by the deployment's `bootstrap.configRef`.
    pub bootstrap_config_template: DynamicObject,
    /// Referenced by the deployment's `infrastructureRef`.
    pub infra_machine_template: DynamicObject,
}

/// Everything needed to create a single machine by hand.
#[derive(Clone, Debug)]
pub struct NodeObjects {
    /// The machine, created last.
    pub machine: Machine,
    /// The provider machine it references.
    pub infra_machine: DynamicObject,
    /// The bootstrap config it references.
    pub bootstrap_config: DynamicObject,
}

/// The objects making up a control plane cluster, and how long to wait for
/// them.
#[derive(Clone)]
pub struct ControlPlaneClusterInput {
    /// Where the cluster is created.
    pub management: Arc<dyn ManagementCluster>,
    /// The cluster itself.
    pub cluster: Cluster,
    /// The provider cluster referenced by the cluster's `infrastructureRef`.
    pub infra_cluster: DynamicObject,
    /// Machines created individually, next to the control plane.
    pub nodes: Vec<NodeObjects>,
    /// Workers, if any.
    pub machine_deployment: Option<MachineDeploymentBundle>,
    /// Objects created after the cluster and before the control plane, e.g.
    /// the secrets and config maps referenced by the control plane.
    pub related_resources: Vec<DynamicObject>,
    /// Budget of each provisioning wait. Zero until [`set_defaults`] ran.
    ///
    /// [`set_defaults`]: ControlPlaneClusterInput::set_defaults
    pub create_timeout: Duration,
    /// Budget of the whole teardown. Zero until [`set_defaults`] ran.
    ///
    /// [`set_defaults`]: ControlPlaneClusterInput::set_defaults
    pub delete_timeout: Duration,
    /// The control plane.
    pub control_plane: KubeadmControlPlane,
    /// The provider template control plane machines are cloned from.
    pub machine_template: DynamicObject,
}

impl ControlPlaneClusterInput {
    /// Replaces zero timeouts with the defaults.
    pub fn set_defaults(&mut self) {
        if self.create_timeout == Duration::from_secs(0) {
            self.create_timeout = DEFAULT_CREATE_TIMEOUT;
        }
        if self.delete_timeout == Duration::from_secs(0) {
            self.delete_timeout = DEFAULT_DELETE_TIMEOUT;
        }
    }

    /// The namespace of the cluster. `default` when the manifest omits it.
    pub fn namespace(&self) -> &str {
        self.cluster
            .metadata
            .namespace
            .as_deref()
            .unwrap_or("default")
    }

    /// The name of the cluster.
    pub fn cluster_name(&self) -> &str {
        self.cluster.metadata.name.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for ControlPlaneClusterInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneClusterInput")
            .field("cluster", &self.cluster.metadata.name)
            .field("namespace", &self.cluster.metadata.namespace)
            .field("nodes", &self.nodes.len())
            .field(
                "machine_deployment",
                &self
                    .machine_deployment
                    .as_ref()
                    .map(|md| md.machine_deployment.metadata.name.clone()),
            )
            .field("related_resources", &self.related_resources.len())
            .field("create_timeout", &self.create_timeout)
            .field("delete_timeout", &self.delete_timeout)
            .finish()
    }
}
