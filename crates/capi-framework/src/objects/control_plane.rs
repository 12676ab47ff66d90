//! The kubeadm based control plane.
use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ObjectReference;

/// The desired state of a kubeadm control plane.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "controlplane.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "KubeadmControlPlane",
    namespaced,
    status = "KubeadmControlPlaneStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneSpec {
    /// Number of control plane machines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Kubernetes version to run.
    #[serde(default)]
    pub version: String,
    /// The provider machine template control plane machines are cloned from.
    #[serde(default)]
    pub infrastructure_template: ObjectReference,
    /// Untyped remainder of the spec.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The observed state of a kubeadm control plane.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneStatus {
    /// Set once the first control plane machine finished `kubeadm init`.
    #[serde(default)]
    pub initialized: bool,
    /// Set when the control plane can serve requests.
    #[serde(default)]
    pub ready: bool,
    /// Number of control plane machines that exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Untyped remainder of the status.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl KubeadmControlPlane {
    /// Whether the status reports the control plane as initialized.
    pub fn initialized(&self) -> bool {
        self.status.as_ref().map(|s| s.initialized).unwrap_or(false)
    }
}
