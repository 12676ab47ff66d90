//! The `Cluster` aggregate root.
use std::collections::BTreeMap;
use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ObjectReference;

/// The desired state of a cluster.
///
/// Only the fields the test helpers read are typed. Everything else in the
/// manifest is carried through `extra` so that creating a parsed object does
/// not drop provider specific configuration.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// The provider specific cluster backing this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,
    /// The control plane object driving this cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ObjectReference>,
    /// Untyped remainder of the spec.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The observed state of a cluster.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// The lifecycle stage, one of the [`ClusterPhase`] strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Set once the infrastructure cluster reports ready.
    #[serde(default)]
    pub infrastructure_ready: bool,
    /// Set once the control plane reports initialized.
    #[serde(default)]
    pub control_plane_initialized: bool,
    /// Untyped remainder of the status.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Cluster {
    /// The reported phase, or an empty string when the controller has not
    /// written one yet.
    pub fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or_default()
    }
}

/// The lifecycle stages a cluster reports in `status.phase`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterPhase {
    /// The cluster was accepted but nothing has been provisioned yet.
    Pending,
    /// The infrastructure is being created.
    Provisioning,
    /// The infrastructure exists and the control plane endpoint is known.
    Provisioned,
    /// The cluster is being torn down.
    Deleting,
    /// Provisioning hit an unrecoverable error.
    Failed,
    /// The controller could not determine the state.
    Unknown,
}

impl ClusterPhase {
    /// The wire representation used in `status.phase`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Pending => "Pending",
            ClusterPhase::Provisioning => "Provisioning",
            ClusterPhase::Provisioned => "Provisioned",
            ClusterPhase::Deleting => "Deleting",
            ClusterPhase::Failed => "Failed",
            ClusterPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
