//! Building a [`ControlPlaneClusterInput`] from a multi-document YAML file.
use std::sync::Arc;
use std::time::Duration;

use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::input::{ControlPlaneClusterInput, MachineDeploymentBundle, NodeObjects};
use crate::management::ManagementCluster;
use crate::objects::{
    Cluster, KubeadmControlPlane, Machine, MachineDeployment, ObjectKind, ObjectReference,
};

/// The objects of one cluster, sorted by the role they play.
#[derive(Clone, Debug)]
pub struct ClusterManifests {
    /// The single `Cluster` document.
    pub cluster: Cluster,
    /// The document the cluster's `infrastructureRef` points at.
    pub infra_cluster: DynamicObject,
    /// The single `KubeadmControlPlane` document.
    pub control_plane: KubeadmControlPlane,
    /// The document the control plane's `infrastructureTemplate` points at.
    pub machine_template: DynamicObject,
    /// Every `Machine` document with its referenced objects.
    pub nodes: Vec<NodeObjects>,
    /// The `MachineDeployment` document with its templates, if present.
    pub machine_deployment: Option<MachineDeploymentBundle>,
    /// Every document not claimed by the above.
    pub related_resources: Vec<DynamicObject>,
}

fn kind_of(document: &serde_json::Value) -> &str {
    document
        .get("kind")
        .and_then(|k| k.as_str())
        .unwrap_or_default()
}

fn typed<K: DeserializeOwned>(document: serde_json::Value) -> Result<K> {
    serde_json::from_value(document).map_err(|e| Error::Manifest(e.to_string()))
}

fn exactly_one<K: DeserializeOwned>(documents: Vec<serde_json::Value>, kind: &str) -> Result<K> {
    let mut documents = documents.into_iter();
    match (documents.next(), documents.next()) {
        (Some(document), None) => typed(document),
        (None, _) => Err(Error::Manifest(format!("no {} document found", kind))),
        (Some(_), Some(_)) => Err(Error::Manifest(format!(
            "expected exactly one {} document",
            kind
        ))),
    }
}

/// Removes and returns the object `reference` points at.
fn take_referenced(
    objects: &mut Vec<DynamicObject>,
    reference: Option<&ObjectReference>,
    what: &str,
) -> Result<DynamicObject> {
    let reference =
        reference.ok_or_else(|| Error::Manifest(format!("the {} reference is missing", what)))?;
    let index = objects
        .iter()
        .position(|o| reference.refers_to(o))
        .ok_or_else(|| {
            Error::Manifest(format!(
                "no document matches the {} reference {} {}",
                what,
                reference.kind.as_deref().unwrap_or_default(),
                reference.name.as_deref().unwrap_or_default()
            ))
        })?;
    Ok(objects.remove(index))
}

impl ClusterManifests {
    /// Parses and classifies the documents of `text`.
    ///
    /// The `Cluster`, `KubeadmControlPlane`, `MachineDeployment` and
    /// `Machine` documents are recognised by kind. Provider objects are found
    /// by following the references of those: the cluster's
    /// `infrastructureRef`, the control plane's `infrastructureTemplate`, and
    /// the `bootstrap.configRef` and `infrastructureRef` of deployments and
    /// machines. Whatever is left becomes a related resource.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(text) {
            let value = serde_json::Value::deserialize(document)
                .map_err(|e| Error::Manifest(e.to_string()))?;
            if !value.is_null() {
                documents.push(value);
            }
        }

        let mut clusters = Vec::new();
        let mut control_planes = Vec::new();
        let mut deployments = Vec::new();
        let mut machines = Vec::new();
        let mut others = Vec::new();
        for document in documents {
            let kind = kind_of(&document).to_owned();
            match kind.as_str() {
                "Cluster" => clusters.push(document),
                "KubeadmControlPlane" => control_planes.push(document),
                "MachineDeployment" => deployments.push(document),
                "Machine" => machines.push(typed::<Machine>(document)?),
                "" => return Err(Error::Manifest("document without a kind".to_owned())),
                _ => others.push(typed::<DynamicObject>(document)?),
            }
        }

        let cluster: Cluster = exactly_one(clusters, "Cluster")?;
        let control_plane: KubeadmControlPlane = exactly_one(control_planes, "KubeadmControlPlane")?;
        let machine_deployment: Option<MachineDeployment> = match deployments.len() {
            0 => None,
            _ => Some(exactly_one(deployments, "MachineDeployment")?),
        };

        let infra_cluster = take_referenced(
            &mut others,
            cluster.spec.infrastructure_ref.as_ref(),
            "infrastructure cluster",
        )?;
        let machine_template = take_referenced(
            &mut others,
            Some(&control_plane.spec.infrastructure_template),
            "control plane machine template",
        )?;

        let machine_deployment = match machine_deployment {
            Some(md) => {
                let template = &md.spec.template.spec;
                let bootstrap_config_template = take_referenced(
                    &mut others,
                    template.bootstrap.config_ref.as_ref(),
                    "bootstrap config template",
                )?;
                let infra_machine_template = take_referenced(
                    &mut others,
                    Some(&template.infrastructure_ref),
                    "infrastructure machine template",
                )?;
                Some(MachineDeploymentBundle {
                    machine_deployment: md,
                    bootstrap_config_template,
                    infra_machine_template,
                })
            }
            None => None,
        };

        let mut nodes = Vec::with_capacity(machines.len());
        for machine in machines {
            let bootstrap_config = take_referenced(
                &mut others,
                machine.spec.bootstrap.config_ref.as_ref(),
                "machine bootstrap config",
            )?;
            let infra_machine = take_referenced(
                &mut others,
                Some(&machine.spec.infrastructure_ref),
                "infrastructure machine",
            )?;
            nodes.push(NodeObjects {
                machine,
                infra_machine,
                bootstrap_config,
            });
        }

        Ok(ClusterManifests {
            cluster,
            infra_cluster,
            control_plane,
            machine_template,
            nodes,
            machine_deployment,
            related_resources: others,
        })
    }

    /// Places every object without an explicit namespace into `namespace`.
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        let fill = |ns: &mut Option<String>| {
            if ns.is_none() {
                *ns = Some(namespace.to_owned());
            }
        };
        fill(&mut self.cluster.metadata.namespace);
        fill(&mut self.infra_cluster.metadata.namespace);
        fill(&mut self.control_plane.metadata.namespace);
        fill(&mut self.machine_template.metadata.namespace);
        for node in &mut self.nodes {
            fill(&mut node.machine.metadata.namespace);
            fill(&mut node.infra_machine.metadata.namespace);
            fill(&mut node.bootstrap_config.metadata.namespace);
        }
        if let Some(md) = &mut self.machine_deployment {
            fill(&mut md.machine_deployment.metadata.namespace);
            fill(&mut md.bootstrap_config_template.metadata.namespace);
            fill(&mut md.infra_machine_template.metadata.namespace);
        }
        for resource in &mut self.related_resources {
            if !ObjectKind::of_dynamic(resource).is_cluster_scoped() {
                fill(&mut resource.metadata.namespace);
            }
        }
        self
    }

    /// Turns the manifests into a sequence input. Zero timeouts are
    /// defaulted when a sequence runs.
    pub fn into_input(
        self,
        management: Arc<dyn ManagementCluster>,
        create_timeout: Duration,
        delete_timeout: Duration,
    ) -> ControlPlaneClusterInput {
        ControlPlaneClusterInput {
            management,
            cluster: self.cluster,
            infra_cluster: self.infra_cluster,
            nodes: self.nodes,
            machine_deployment: self.machine_deployment,
            related_resources: self.related_resources,
            create_timeout,
            delete_timeout,
            control_plane: self.control_plane,
            machine_template: self.machine_template,
        }
    }
}
