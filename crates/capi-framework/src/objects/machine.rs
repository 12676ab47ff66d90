//! Machines and the objects that scale them.
use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ObjectReference;

/// How a machine gets its bootstrap data.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    /// The bootstrap config generating the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<ObjectReference>,
    /// The secret holding ready made data, instead of a config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}

/// The desired state of a single machine.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "Machine",
    namespaced,
    status = "MachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the owning cluster.
    pub cluster_name: String,
    /// Where the bootstrap data comes from.
    #[serde(default)]
    pub bootstrap: Bootstrap,
    /// The provider machine backing this one.
    #[serde(default)]
    pub infrastructure_ref: ObjectReference,
    /// Kubernetes version of the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Untyped remainder of the spec.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The observed state of a machine.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// The lifecycle stage, one of the [`MachinePhase`] strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// The workload cluster node backing this machine, once it joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<ObjectReference>,
    /// Untyped remainder of the status.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Machine {
    /// The reported phase, or an empty string when none was written yet.
    pub fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or_default()
    }
}

/// The lifecycle stages a machine reports in `status.phase`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachinePhase {
    /// Not yet picked up by the infrastructure provider.
    Pending,
    /// The infrastructure is being created.
    Provisioning,
    /// The infrastructure exists, the node has not joined.
    Provisioned,
    /// The backing node joined the workload cluster.
    Running,
    /// The machine is being torn down.
    Deleting,
    /// The machine is gone.
    Deleted,
    /// Provisioning hit an unrecoverable error.
    Failed,
    /// The controller could not determine the state.
    Unknown,
}

impl MachinePhase {
    /// The wire representation used in `status.phase`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachinePhase::Pending => "Pending",
            MachinePhase::Provisioning => "Provisioning",
            MachinePhase::Provisioned => "Provisioned",
            MachinePhase::Running => "Running",
            MachinePhase::Deleting => "Deleting",
            MachinePhase::Deleted => "Deleted",
            MachinePhase::Failed => "Failed",
            MachinePhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MachinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The machine shape stamped out by sets and deployments.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineTemplateSpec {
    /// Metadata given to every stamped out machine.
    #[serde(default)]
    #[schemars(skip)]
    pub metadata: ObjectMeta,
    /// Spec given to every stamped out machine.
    pub spec: MachineSpec,
}

/// A replicated group of identical machines.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "MachineSet",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    /// Name of the owning cluster.
    pub cluster_name: String,
    /// Number of machines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Untyped remainder of the spec.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The worker scaling unit of a cluster.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "MachineDeployment",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentSpec {
    /// Name of the owning cluster.
    pub cluster_name: String,
    /// Number of worker machines. Unset means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// The machine every replica is made from.
    #[serde(default)]
    pub template: MachineTemplateSpec,
    /// Untyped remainder of the spec.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MachineDeployment {
    /// The requested replica count when it is set and positive.
    pub fn positive_replicas(&self) -> Option<usize> {
        match self.spec.replicas {
            Some(replicas) if replicas > 0 => Some(replicas as usize),
            _ => None,
        }
    }
}
