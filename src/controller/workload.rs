//! Shared handle for the etcd workload operations.
//!
//! `Workload` holds the injected cluster client, the etcd client factory and
//! the configuration. The operations themselves live in the sibling modules
//! (`health`, `membership`, `leadership`, `kubeadm_config`) as `impl Workload`
//! blocks.

use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Node;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::EtcdClientFactory;
use crate::cluster::ClusterClient;
use crate::config::WorkloadConfig;
use crate::controller::error::{Error, Result};

/// etcd reconciliation entry point for one workload cluster
#[derive(Clone)]
pub struct Workload {
    /// Workload cluster API client
    pub(crate) cluster: Arc<dyn ClusterClient>,
    /// Opens node-scoped etcd connections
    pub(crate) etcd: Arc<dyn EtcdClientFactory>,
    pub(crate) config: WorkloadConfig,
}

impl Workload {
    /// Create a workload with default configuration
    pub fn new(cluster: Arc<dyn ClusterClient>, etcd: Arc<dyn EtcdClientFactory>) -> Self {
        Self {
            cluster,
            etcd,
            config: WorkloadConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: WorkloadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Control-plane nodes in API order.
    pub(crate) async fn control_plane_nodes(&self) -> Result<Vec<Node>> {
        let nodes = self
            .cluster
            .list_nodes(&self.config.control_plane_label)
            .await?;
        debug!(count = nodes.len(), "Listed control plane nodes");
        Ok(nodes)
    }
}

/// Name of a node, `None` when unset or empty.
pub(crate) fn node_name(node: &Node) -> Option<&str> {
    node.metadata.name.as_deref().filter(|n| !n.is_empty())
}

/// Run `operation` unless `cancel` fires first.
///
/// An already-cancelled token returns `Error::Cancelled` without polling the
/// operation. When the token fires mid-flight the operation future is dropped,
/// which closes any etcd connection it holds.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = operation => result,
    }
}
