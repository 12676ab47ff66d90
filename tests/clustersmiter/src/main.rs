use std::io::BufRead;

use capi_framework::objects::Cluster;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Metadata;
use kube::api::{Api, DeleteParams, ListParams};

const E2E_NS_PREFIXES: &[&str] = &["capi-e2e"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let result = smite_all_e2e_clusters().await;

    match &result {
        Ok(message) => println!("{}", message),
        Err(e) => println!("{}", e),
    };

    result.map(|_| ())
}

async fn smite_all_e2e_clusters() -> anyhow::Result<&'static str> {
    let client = match kube::Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to acquire Kubernetes client: {}",
                e
            ))
        }
    };

    let namespaces = list_e2e_namespaces(client.clone()).await?;

    if namespaces.is_empty() {
        return Ok("No e2e namespaces found");
    }
    println!(
        "Delete all clusters in these namespaces: {}? (y/n) ",
        namespaces.join(", ")
    );
    if !read_confirmation(std::io::stdin().lock())? {
        return Ok("Operation cancelled");
    }

    let smite_operations = namespaces
        .iter()
        .map(|ns| smite_namespace_clusters(client.clone(), ns));
    let smite_errors = failures(futures::future::join_all(smite_operations).await);

    if !smite_errors.is_empty() {
        return Err(smite_failure_error(&smite_errors));
    }

    Ok("Requested delete of all e2e clusters; machines may take several minutes to go away")
}

async fn list_e2e_namespaces(client: kube::Client) -> anyhow::Result<Vec<String>> {
    println!("Finding e2e namespaces...");

    let nsapi: Api<Namespace> = Api::all(client);
    let nslist = nsapi.list(&ListParams::default()).await?;

    Ok(nslist
        .iter()
        .filter_map(name_of)
        .filter(|n| is_e2e_namespace(n))
        .collect())
}

fn name_of(resource: &impl Metadata<Ty = ObjectMeta>) -> Option<String> {
    resource.metadata().name.clone()
}

fn is_e2e_namespace(namespace: &str) -> bool {
    E2E_NS_PREFIXES
        .iter()
        .any(|prefix| namespace.starts_with(prefix))
}

async fn smite_namespace_clusters(client: kube::Client, namespace: &str) -> anyhow::Result<()> {
    println!("Finding clusters in namespace {}...", namespace);

    let clusterapi: Api<Cluster> = Api::namespaced(client, namespace);
    let clusters = clusterapi.list(&ListParams::default()).await?;

    println!("Deleting clusters in namespace {}...", namespace);

    let delete_operations = clusters
        .iter()
        .filter_map(|c| c.metadata.name.as_deref())
        .map(|name| smite_cluster(&clusterapi, name));
    let errors = failures(futures::future::join_all(delete_operations).await);

    if !errors.is_empty() {
        return Err(smite_clusters_failure_error(namespace, &errors));
    }

    Ok(())
}

async fn smite_cluster(clusterapi: &Api<Cluster>, name: &str) -> anyhow::Result<()> {
    let _ = clusterapi.delete(name, &DeleteParams::default()).await?;
    Ok(())
}

fn smite_failure_error(errors: &[anyhow::Error]) -> anyhow::Error {
    let message_list = errors
        .iter()
        .map(|e| format!("{}", e))
        .collect::<Vec<_>>()
        .join("\n");
    anyhow::anyhow!("Some e2e clusters were not deleted:\n{}", message_list)
}

fn smite_clusters_failure_error(namespace: &str, errors: &[anyhow::Error]) -> anyhow::Error {
    let message_list = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    anyhow::anyhow!(
        "- Namespace {}: cluster delete(s) failed:\n{}",
        namespace,
        message_list
    )
}

/// Reads answers until one is given. Only an answer starting with `y`
/// confirms; end of input counts as a refusal.
fn read_confirmation(mut input: impl BufRead) -> anyhow::Result<bool> {
    let mut answer = String::new();
    loop {
        answer.clear();
        if input.read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        match answer.trim().chars().next() {
            Some(c) => return Ok(c.eq_ignore_ascii_case(&'y')),
            None => println!("(y/n) "),
        }
    }
}

fn failures<T>(results: Vec<anyhow::Result<T>>) -> Vec<anyhow::Error> {
    results.into_iter().filter_map(Result::err).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_prefixed_namespaces_are_e2e() {
        assert!(is_e2e_namespace("capi-e2e"));
        assert!(is_e2e_namespace("capi-e2e-lifecycle"));
        assert!(!is_e2e_namespace("default"));
        assert!(!is_e2e_namespace("capi-system"));
    }

    #[test]
    fn confirmation_skips_blank_answers() {
        assert!(read_confirmation("\n  \nYes\n".as_bytes()).unwrap());
        assert!(read_confirmation("y".as_bytes()).unwrap());
        assert!(!read_confirmation("n\ny\n".as_bytes()).unwrap());
        assert!(!read_confirmation("".as_bytes()).unwrap());
    }

    #[test]
    fn failures_keeps_only_errors_in_order() {
        let results = vec![
            Ok(()),
            Err(anyhow::anyhow!("c1 is gone")),
            Ok(()),
            Err(anyhow::anyhow!("c2 is forbidden")),
        ];
        let errors = failures(results);
        let messages: Vec<_> = errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["c1 is gone", "c2 is forbidden"]);
    }
}
