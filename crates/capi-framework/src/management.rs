//! Access to the management cluster and the workload clusters it provisions.
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{KubeStore, ObjectStore};

/// The data key of the kubeconfig secret written for every workload cluster.
const KUBECONFIG_SECRET_KEY: &str = "value";

/// The cluster running the Cluster API controllers.
#[async_trait]
pub trait ManagementCluster: Send + Sync {
    /// A client for the management cluster itself.
    async fn client(&self) -> Result<Arc<dyn ObjectStore>>;

    /// A client for the workload cluster `name` in `namespace`.
    async fn workload_client(&self, namespace: &str, name: &str) -> Result<Arc<dyn ObjectStore>>;
}

/// The name of the secret holding the kubeconfig of workload cluster `cluster`.
pub fn kubeconfig_secret_name(cluster: &str) -> String {
    format!("{}-kubeconfig", cluster)
}

/// A [`ManagementCluster`] reached through the Kubernetes API.
///
/// Workload clients are built from the `<cluster>-kubeconfig` secret the
/// control plane provider writes next to the `Cluster`.
#[derive(Clone)]
pub struct KubeManagementCluster {
    client: Client,
}

impl KubeManagementCluster {
    /// A management cluster reached through `client`.
    pub fn new(client: Client) -> Self {
        KubeManagementCluster { client }
    }

    /// Connects using the ambient configuration: a kubeconfig file first,
    /// then the in-cluster service account.
    pub async fn try_default() -> anyhow::Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Reads and parses the kubeconfig of workload cluster `name`.
    async fn workload_kubeconfig(&self, namespace: &str, name: &str) -> Result<Kubeconfig> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret_name = kubeconfig_secret_name(name);
        let secret = secrets
            .get(&secret_name)
            .await
            .map_err(|e| workload_error(namespace, name, e))?;

        let bytes = secret
            .data
            .and_then(|mut data| data.remove(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| {
                workload_error(
                    namespace,
                    name,
                    format!("secret {} has no {} key", secret_name, KUBECONFIG_SECRET_KEY),
                )
            })?;
        let raw = String::from_utf8(bytes.0).map_err(|e| workload_error(namespace, name, e))?;
        serde_yaml::from_str::<Kubeconfig>(&raw).map_err(|e| workload_error(namespace, name, e))
    }
}

fn workload_error(
    namespace: &str,
    name: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> Error {
    Error::WorkloadClient {
        cluster: format!("{}/{}", namespace, name),
        source: source.into(),
    }
}

#[async_trait]
impl ManagementCluster for KubeManagementCluster {
    async fn client(&self) -> Result<Arc<dyn ObjectStore>> {
        Ok(Arc::new(KubeStore::new(self.client.clone())))
    }

    async fn workload_client(&self, namespace: &str, name: &str) -> Result<Arc<dyn ObjectStore>> {
        debug!(namespace, name, "Building workload cluster client");
        let kubeconfig = self.workload_kubeconfig(namespace, name).await?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| workload_error(namespace, name, e))?;
        let client = Client::try_from(config).map_err(|e| workload_error(namespace, name, e))?;
        Ok(Arc::new(KubeStore::new(client)))
    }
}

/// A [`ManagementCluster`] handing out fixed stores, e.g. [`MemoryStore`]s.
///
/// [`MemoryStore`]: crate::store::MemoryStore
#[derive(Clone)]
pub struct StaticManagementCluster {
    management: Arc<dyn ObjectStore>,
    workloads: HashMap<(String, String), Arc<dyn ObjectStore>>,
}

impl StaticManagementCluster {
    /// Hands out `management` as the management cluster store and knows no
    /// workload clusters yet.
    pub fn new(management: Arc<dyn ObjectStore>) -> Self {
        StaticManagementCluster {
            management,
            workloads: HashMap::new(),
        }
    }

    /// Registers the store answering for workload cluster `name` in `namespace`.
    pub fn with_workload(mut self, namespace: &str, name: &str, store: Arc<dyn ObjectStore>) -> Self {
        self.workloads
            .insert((namespace.to_owned(), name.to_owned()), store);
        self
    }
}

#[async_trait]
impl ManagementCluster for StaticManagementCluster {
    async fn client(&self) -> Result<Arc<dyn ObjectStore>> {
        Ok(self.management.clone())
    }

    async fn workload_client(&self, namespace: &str, name: &str) -> Result<Arc<dyn ObjectStore>> {
        self.workloads
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| workload_error(namespace, name, "no kubeconfig registered"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;
    use futures::pin_mut;
    use http::{Request as HttpRequest, Response as HttpResponse};
    use hyper::Body;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use tower_test::mock;

    const WORKLOAD_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: c1
  cluster:
    server: https://172.18.0.3:6443
    insecure-skip-tls-verify: true
users:
- name: c1-admin
  user:
    token: not-a-real-token
contexts:
- name: c1-admin@c1
  context:
    cluster: c1
    user: c1-admin
current-context: c1-admin@c1
"#;

    /// Answers a single request for `capi/c1-kubeconfig` with `secret`.
    fn serve_secret(secret: Secret) -> (KubeManagementCluster, tokio::task::JoinHandle<()>) {
        let (mock_service, handle) = mock::pair::<HttpRequest<Body>, HttpResponse<Body>>();
        let spawned = tokio::spawn(async move {
            pin_mut!(handle);
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            assert_eq!(
                request.uri().to_string(),
                "/api/v1/namespaces/capi/secrets/c1-kubeconfig"
            );
            send.send_response(
                HttpResponse::builder()
                    .body(Body::from(serde_json::to_vec(&secret).unwrap()))
                    .unwrap(),
            );
        });
        let client = Client::new(mock_service, "default");
        (KubeManagementCluster::new(client), spawned)
    }

    fn kubeconfig_secret(data: Option<(&str, &str)>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("c1-kubeconfig".to_owned()),
                namespace: Some("capi".to_owned()),
                ..Default::default()
            },
            data: data.map(|(key, value)| {
                vec![(key.to_owned(), ByteString(value.as_bytes().to_vec()))]
                    .into_iter()
                    .collect()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn workload_kubeconfig_is_decoded_from_the_cluster_secret() {
        let (management, spawned) =
            serve_secret(kubeconfig_secret(Some(("value", WORKLOAD_KUBECONFIG))));

        let kubeconfig = management.workload_kubeconfig("capi", "c1").await.unwrap();

        assert_eq!(kubeconfig.current_context.as_deref(), Some("c1-admin@c1"));
        assert_eq!(kubeconfig.clusters.len(), 1);
        assert_eq!(kubeconfig.clusters[0].cluster.server, "https://172.18.0.3:6443");
        assert_eq!(kubeconfig.auth_infos[0].name, "c1-admin");
        spawned.await.unwrap();
    }

    #[tokio::test]
    async fn secret_without_value_key_is_a_workload_error() {
        let (management, spawned) =
            serve_secret(kubeconfig_secret(Some(("kubeconfig", WORKLOAD_KUBECONFIG))));

        let err = management.workload_kubeconfig("capi", "c1").await.unwrap_err();

        assert!(matches!(err, Error::WorkloadClient { .. }));
        assert!(err.to_string().contains("capi/c1"));
        spawned.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_kubeconfig_is_a_workload_error() {
        let (management, spawned) =
            serve_secret(kubeconfig_secret(Some(("value", "clusters: {not: [a list"))));

        let err = management.workload_kubeconfig("capi", "c1").await.unwrap_err();

        assert!(matches!(err, Error::WorkloadClient { .. }));
        spawned.await.unwrap();
    }

    #[test]
    fn kubeconfig_secret_follows_naming_convention() {
        assert_eq!(kubeconfig_secret_name("c1"), "c1-kubeconfig");
    }

    #[tokio::test]
    async fn unknown_workload_cluster_is_an_error() {
        let management = StaticManagementCluster::new(Arc::new(MemoryStore::new()));
        let err = match management.workload_client("default", "c1").await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::WorkloadClient { .. }));
        assert!(err.to_string().contains("default/c1"));
    }

    #[tokio::test]
    async fn registered_workload_cluster_is_returned() {
        let management = StaticManagementCluster::new(Arc::new(MemoryStore::new()))
            .with_workload("default", "c1", Arc::new(MemoryStore::new()));
        assert!(management.workload_client("default", "c1").await.is_ok());
    }
}
