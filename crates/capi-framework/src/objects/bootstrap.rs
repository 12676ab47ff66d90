//! Kubeadm bootstrap configuration.
use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The desired state of a kubeadm bootstrap config. Kept untyped.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "bootstrap.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "KubeadmConfig",
    namespaced,
    status = "KubeadmConfigStatus"
)]
pub struct KubeadmConfigSpec {
    /// The whole spec.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The observed state of a kubeadm bootstrap config.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmConfigStatus {
    /// Set once the bootstrap data was generated.
    #[serde(default)]
    pub ready: bool,
    /// The secret holding the generated bootstrap data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}
