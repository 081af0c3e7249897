//! Cluster API client abstraction.
//!
//! Provides a trait-based abstraction over the handful of workload cluster
//! reads and writes the etcd reconciliation needs, allowing tests to mock
//! Kubernetes interactions while production code uses real API calls.

mod fake;

pub use fake::FakeClusterClient;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::controller::error::{Error, Result};

/// Workload cluster reads and writes used by the etcd reconciliation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a pod, `None` when it does not exist.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// List nodes matching a label selector, in API order.
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>>;

    /// Get a ConfigMap, `None` when it does not exist.
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// Replace a ConfigMap. The object's resource version is used for
    /// optimistic concurrency; a stale version yields `Error::Conflict`.
    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()>;
}

/// `ClusterClient` backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(nodes.items)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let name = config_map
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
        let namespace = config_map
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.replace(name, &PostParams::default(), config_map).await {
            Ok(_) => {
                debug!(namespace = %namespace, name = %name, "Replaced ConfigMap");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                Err(Error::Conflict(format!("{}/{}: {}", namespace, name, e.message)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
