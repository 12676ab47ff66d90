//! Typed representations of the objects the test helpers create, read and
//! delete.
//!
//! Every object crosses the [`ObjectStore`](crate::store::ObjectStore)
//! boundary as an [`Object`]. The set of variants is closed: the core Cluster
//! API kinds are typed, the provider specific kinds whose schema is not known
//! here travel as a [`ProviderObject`] tagged with the role they play.
use std::convert::TryFrom;
use std::fmt;

use k8s_openapi::api::core::v1::{Node, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

mod bootstrap;
mod cluster;
mod control_plane;
mod machine;

pub use bootstrap::{KubeadmConfig, KubeadmConfigSpec, KubeadmConfigStatus};
pub use cluster::{Cluster, ClusterPhase, ClusterSpec, ClusterStatus};
pub use control_plane::{KubeadmControlPlane, KubeadmControlPlaneSpec, KubeadmControlPlaneStatus};
pub use machine::{
    Bootstrap, Machine, MachineDeployment, MachineDeploymentSpec, MachinePhase, MachineSet,
    MachineSetSpec, MachineSpec, MachineStatus, MachineTemplateSpec,
};

/// The label every object belonging to a cluster carries, valued with the
/// cluster's name.
pub const CLUSTER_LABEL_NAME: &str = "cluster.x-k8s.io/cluster-name";

/// A reference from one object to another, as found in `infrastructureRef`
/// and friends.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API version of the referent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Kind of the referent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Name of the referent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Namespace of the referent, usually left to the referrer's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectReference {
    /// Whether this reference points at `object`. The api version is only
    /// compared when both sides carry one.
    pub fn refers_to(&self, object: &DynamicObject) -> bool {
        let types = match &object.types {
            Some(t) => t,
            None => return false,
        };
        let version_matches = match &self.api_version {
            Some(v) => v == &types.api_version,
            None => true,
        };
        version_matches
            && self.kind.as_deref() == Some(types.kind.as_str())
            && self.name.is_some()
            && self.name == object.metadata.name
    }
}

/// Namespace and name of an object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// `None` for cluster scoped objects.
    pub namespace: Option<String>,
    /// The object name.
    pub name: String,
}

impl ObjectKey {
    /// The key of object `name` in `namespace`.
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        ObjectKey {
            namespace: Some(namespace.to_owned()),
            name: name.to_owned(),
        }
    }

    /// The key of cluster scoped object `name`.
    pub fn cluster_scoped(name: &str) -> Self {
        ObjectKey {
            namespace: None,
            name: name.to_owned(),
        }
    }

    /// Builds the key from object metadata. A missing name becomes the empty
    /// string, which every store rejects.
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        ObjectKey {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// The kinds of object a store can be asked about.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// See [`Cluster`](crate::objects::Cluster).
    Cluster,
    /// See [`KubeadmControlPlane`](crate::objects::KubeadmControlPlane).
    KubeadmControlPlane,
    /// See [`MachineDeployment`](crate::objects::MachineDeployment).
    MachineDeployment,
    /// See [`MachineSet`](crate::objects::MachineSet).
    MachineSet,
    /// See [`Machine`](crate::objects::Machine).
    Machine,
    /// See [`KubeadmConfig`](crate::objects::KubeadmConfig).
    KubeadmConfig,
    /// A core `v1` Secret.
    Secret,
    /// A core `v1` Node.
    Node,
    /// Any other kind, identified by its `apiVersion` and `kind`.
    Dynamic {
        /// `group/version`, or just `version` for the core group.
        api_version: String,
        /// The `kind` string.
        kind: String,
    },
}

impl ObjectKind {
    /// Any other kind, addressed by `apiVersion` and `kind`.
    pub fn dynamic(api_version: &str, kind: &str) -> Self {
        ObjectKind::Dynamic {
            api_version: api_version.to_owned(),
            kind: kind.to_owned(),
        }
    }

    pub(crate) fn of_dynamic(object: &DynamicObject) -> Self {
        match &object.types {
            Some(t) => ObjectKind::dynamic(&t.api_version, &t.kind),
            None => ObjectKind::dynamic("", ""),
        }
    }

    /// The `kind` string of this object kind.
    pub fn name(&self) -> &str {
        match self {
            ObjectKind::Cluster => "Cluster",
            ObjectKind::KubeadmControlPlane => "KubeadmControlPlane",
            ObjectKind::MachineDeployment => "MachineDeployment",
            ObjectKind::MachineSet => "MachineSet",
            ObjectKind::Machine => "Machine",
            ObjectKind::KubeadmConfig => "KubeadmConfig",
            ObjectKind::Secret => "Secret",
            ObjectKind::Node => "Node",
            ObjectKind::Dynamic { kind, .. } => kind,
        }
    }

    /// Whether objects of this kind live outside of namespaces.
    ///
    /// Only well known kinds are recognised here. A Kubernetes backed store
    /// asks the API server instead.
    pub fn is_cluster_scoped(&self) -> bool {
        match self {
            ObjectKind::Node => true,
            ObjectKind::Dynamic { api_version, kind } => {
                let group = api_version
                    .rsplit_once('/')
                    .map(|(group, _)| group)
                    .unwrap_or("");
                CLUSTER_SCOPED_KINDS
                    .iter()
                    .any(|&(g, k)| g == group && k == kind.as_str())
            }
            _ => false,
        }
    }
}

/// Group and kind of the built in cluster scoped resources that tend to show
/// up next to a cluster definition.
const CLUSTER_SCOPED_KINDS: &[(&str, &str)] = &[
    ("", "Namespace"),
    ("", "Node"),
    ("", "PersistentVolume"),
    ("rbac.authorization.k8s.io", "ClusterRole"),
    ("rbac.authorization.k8s.io", "ClusterRoleBinding"),
    ("apiextensions.k8s.io", "CustomResourceDefinition"),
    ("storage.k8s.io", "StorageClass"),
    ("storage.k8s.io", "CSIDriver"),
    ("scheduling.k8s.io", "PriorityClass"),
    ("admissionregistration.k8s.io", "ValidatingWebhookConfiguration"),
    ("admissionregistration.k8s.io", "MutatingWebhookConfiguration"),
    ("apiregistration.k8s.io", "APIService"),
    ("networking.k8s.io", "IngressClass"),
];

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Dynamic { api_version, kind } => write!(f, "{} ({})", kind, api_version),
            other => f.write_str(other.name()),
        }
    }
}

/// A provider specific object, tagged with the part it plays in a cluster.
#[derive(Clone, Debug)]
pub enum ProviderObject {
    /// The infrastructure backing a `Cluster`, e.g. a `DockerCluster`.
    InfrastructureCluster(DynamicObject),
    /// The infrastructure template control plane machines are cloned from.
    MachineTemplate(DynamicObject),
    /// The bootstrap config template of a machine deployment.
    BootstrapConfigTemplate(DynamicObject),
    /// The infrastructure template of a machine deployment.
    InfraMachineTemplate(DynamicObject),
    /// The infrastructure of an explicitly created machine.
    InfraMachine(DynamicObject),
    /// The bootstrap config of an explicitly created machine.
    BootstrapConfig(DynamicObject),
}

impl ProviderObject {
    /// The wrapped object.
    pub fn object(&self) -> &DynamicObject {
        match self {
            ProviderObject::InfrastructureCluster(o)
            | ProviderObject::MachineTemplate(o)
            | ProviderObject::BootstrapConfigTemplate(o)
            | ProviderObject::InfraMachineTemplate(o)
            | ProviderObject::InfraMachine(o)
            | ProviderObject::BootstrapConfig(o) => o,
        }
    }

    fn object_mut(&mut self) -> &mut DynamicObject {
        match self {
            ProviderObject::InfrastructureCluster(o)
            | ProviderObject::MachineTemplate(o)
            | ProviderObject::BootstrapConfigTemplate(o)
            | ProviderObject::InfraMachineTemplate(o)
            | ProviderObject::InfraMachine(o)
            | ProviderObject::BootstrapConfig(o) => o,
        }
    }

    /// Unwraps the object, dropping its role.
    pub fn into_object(self) -> DynamicObject {
        match self {
            ProviderObject::InfrastructureCluster(o)
            | ProviderObject::MachineTemplate(o)
            | ProviderObject::BootstrapConfigTemplate(o)
            | ProviderObject::InfraMachineTemplate(o)
            | ProviderObject::InfraMachine(o)
            | ProviderObject::BootstrapConfig(o) => o,
        }
    }

    /// A human readable name for the role, used in log lines.
    pub fn role(&self) -> &'static str {
        match self {
            ProviderObject::InfrastructureCluster(_) => "InfrastructureCluster",
            ProviderObject::MachineTemplate(_) => "MachineTemplate",
            ProviderObject::BootstrapConfigTemplate(_) => "BootstrapConfigTemplate",
            ProviderObject::InfraMachineTemplate(_) => "InfrastructureMachineTemplate",
            ProviderObject::InfraMachine(_) => "InfrastructureMachine",
            ProviderObject::BootstrapConfig(_) => "BootstrapConfig",
        }
    }
}

/// Any object handled by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Clone, Debug)]
pub enum Object {
    /// A cluster.
    Cluster(Cluster),
    /// A kubeadm control plane.
    KubeadmControlPlane(KubeadmControlPlane),
    /// A machine deployment.
    MachineDeployment(MachineDeployment),
    /// A machine set.
    MachineSet(MachineSet),
    /// A machine.
    Machine(Machine),
    /// A kubeadm bootstrap config.
    KubeadmConfig(KubeadmConfig),
    /// A secret, e.g. a workload cluster kubeconfig.
    Secret(Secret),
    /// A workload cluster node.
    Node(Node),
    /// A provider object in one of the roles the sequences know about.
    Provider(ProviderObject),
    /// An object of a kind the helpers do not interpret, such as the related
    /// resources of a cluster.
    Unstructured(DynamicObject),
}

impl Object {
    /// The kind of the object. Provider objects report their own `kind`.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Cluster(_) => ObjectKind::Cluster,
            Object::KubeadmControlPlane(_) => ObjectKind::KubeadmControlPlane,
            Object::MachineDeployment(_) => ObjectKind::MachineDeployment,
            Object::MachineSet(_) => ObjectKind::MachineSet,
            Object::Machine(_) => ObjectKind::Machine,
            Object::KubeadmConfig(_) => ObjectKind::KubeadmConfig,
            Object::Secret(_) => ObjectKind::Secret,
            Object::Node(_) => ObjectKind::Node,
            Object::Provider(p) => ObjectKind::of_dynamic(p.object()),
            Object::Unstructured(o) => ObjectKind::of_dynamic(o),
        }
    }

    /// The object metadata.
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Object::Cluster(o) => &o.metadata,
            Object::KubeadmControlPlane(o) => &o.metadata,
            Object::MachineDeployment(o) => &o.metadata,
            Object::MachineSet(o) => &o.metadata,
            Object::Machine(o) => &o.metadata,
            Object::KubeadmConfig(o) => &o.metadata,
            Object::Secret(o) => &o.metadata,
            Object::Node(o) => &o.metadata,
            Object::Provider(p) => &p.object().metadata,
            Object::Unstructured(o) => &o.metadata,
        }
    }

    /// The object metadata, mutably.
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Object::Cluster(o) => &mut o.metadata,
            Object::KubeadmControlPlane(o) => &mut o.metadata,
            Object::MachineDeployment(o) => &mut o.metadata,
            Object::MachineSet(o) => &mut o.metadata,
            Object::Machine(o) => &mut o.metadata,
            Object::KubeadmConfig(o) => &mut o.metadata,
            Object::Secret(o) => &mut o.metadata,
            Object::Node(o) => &mut o.metadata,
            Object::Provider(p) => &mut p.object_mut().metadata,
            Object::Unstructured(o) => &mut o.metadata,
        }
    }

    /// Namespace and name of the object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::from_meta(self.meta())
    }

    /// Whether the object carries `key=value` among its labels.
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.meta()
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(|v| v == value)
            .unwrap_or(false)
    }

    /// `Kind namespace/name`, for log lines and error messages.
    pub fn describe(&self) -> String {
        let kind = match self {
            Object::Provider(p) => p.role().to_owned(),
            other => other.kind().name().to_owned(),
        };
        format!("{} {}", kind, self.key())
    }
}

macro_rules! typed_variants {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Object {
                fn from(object: $ty) -> Self {
                    Object::$variant(object)
                }
            }

            impl TryFrom<Object> for $ty {
                type Error = StoreError;

                fn try_from(object: Object) -> Result<Self, Self::Error> {
                    match object {
                        Object::$variant(inner) => Ok(inner),
                        other => Err(StoreError::UnexpectedKind {
                            expected: ObjectKind::$variant.to_string(),
                            found: other.kind().to_string(),
                        }),
                    }
                }
            }
        )*
    };
}

typed_variants! {
    Cluster => Cluster,
    KubeadmControlPlane => KubeadmControlPlane,
    MachineDeployment => MachineDeployment,
    MachineSet => MachineSet,
    Machine => Machine,
    KubeadmConfig => KubeadmConfig,
    Secret => Secret,
    Node => Node,
}

impl From<ProviderObject> for Object {
    fn from(object: ProviderObject) -> Self {
        Object::Provider(object)
    }
}

impl From<DynamicObject> for Object {
    fn from(object: DynamicObject) -> Self {
        Object::Unstructured(object)
    }
}

impl TryFrom<Object> for DynamicObject {
    type Error = StoreError;

    fn try_from(object: Object) -> Result<Self, Self::Error> {
        match object {
            Object::Unstructured(o) => Ok(o),
            Object::Provider(p) => Ok(p.into_object()),
            other => Err(StoreError::UnexpectedKind {
                expected: "an unstructured object".to_owned(),
                found: other.kind().to_string(),
            }),
        }
    }
}
