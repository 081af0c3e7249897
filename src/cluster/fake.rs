//! In-memory `ClusterClient` for tests and local experiments.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};

use super::ClusterClient;
use crate::controller::error::{Error, Result};

#[derive(Debug, Default)]
struct FakeClusterState {
    pods: BTreeMap<(String, String), Pod>,
    nodes: Vec<Node>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    list_nodes_error: Option<String>,
    update_error: Option<String>,
    updates: usize,
}

/// In-memory cluster holding pods, nodes and ConfigMaps.
///
/// ConfigMap updates follow optimistic concurrency: an update whose
/// `resourceVersion` does not match the stored object fails with
/// `Error::Conflict`, and every accepted update bumps the version.
#[derive(Debug, Clone, Default)]
pub struct FakeClusterClient {
    state: Arc<Mutex<FakeClusterState>>,
}

fn key(namespace: Option<&String>, name: Option<&String>) -> (String, String) {
    (
        namespace.cloned().unwrap_or_default(),
        name.cloned().unwrap_or_default(),
    )
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pod under its metadata namespace and name.
    pub fn with_pod(self, pod: Pod) -> Self {
        let k = key(pod.metadata.namespace.as_ref(), pod.metadata.name.as_ref());
        self.state().pods.insert(k, pod);
        self
    }

    /// Append a node. Nodes are listed in insertion order and may share names.
    pub fn with_node(self, node: Node) -> Self {
        self.state().nodes.push(node);
        self
    }

    /// Store a ConfigMap under its metadata namespace and name.
    pub fn with_config_map(self, config_map: ConfigMap) -> Self {
        let k = key(
            config_map.metadata.namespace.as_ref(),
            config_map.metadata.name.as_ref(),
        );
        self.state().config_maps.insert(k, config_map);
        self
    }

    /// Fail node listing.
    pub fn fail_list_nodes(self, message: impl Into<String>) -> Self {
        self.state().list_nodes_error = Some(message.into());
        self
    }

    /// Fail ConfigMap updates with a conflict.
    pub fn conflict_on_update(self, message: impl Into<String>) -> Self {
        self.state().update_error = Some(message.into());
        self
    }

    /// Current stored ConfigMap.
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state()
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of accepted ConfigMap updates.
    pub fn update_count(&self) -> usize {
        self.state().updates
    }

    fn state(&self) -> MutexGuard<'_, FakeClusterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Whether `labels` satisfy a selector made of comma-separated `key` or
/// `key=value` terms.
fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k)).is_some_and(|actual| actual == v),
            None => labels.is_some_and(|l| l.contains_key(term)),
        })
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self
            .state()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>> {
        let state = self.state();
        if let Some(message) = &state.list_nodes_error {
            return Err(Error::InvalidConfig(message.clone()));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|n| matches_selector(n.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.config_map(namespace, name))
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let mut state = self.state();
        let k = key(
            config_map.metadata.namespace.as_ref(),
            config_map.metadata.name.as_ref(),
        );

        if let Some(message) = &state.update_error {
            return Err(Error::Conflict(message.clone()));
        }

        let stored_version = match state.config_maps.get(&k) {
            Some(stored) => stored.metadata.resource_version.clone(),
            None => return Err(Error::ConfigNotFound {
                namespace: k.0,
                name: k.1,
            }),
        };
        if config_map.metadata.resource_version.is_some()
            && config_map.metadata.resource_version != stored_version
        {
            return Err(Error::Conflict(format!(
                "{}/{}: resource version {:?} is stale",
                k.0, k.1, config_map.metadata.resource_version
            )));
        }

        let next_version = stored_version
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let mut updated = config_map.clone();
        updated.metadata.resource_version = Some(next_version.to_string());
        state.config_maps.insert(k, updated);
        state.updates += 1;
        Ok(())
    }
}
