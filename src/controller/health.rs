//! etcd health aggregation.
//!
//! Combines the readiness of each control-plane node's etcd static pod with
//! one member and alarm snapshot read from etcd itself. The check is
//! read-only.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{Alarm, AlarmType, Member, active_alarms_for, member_for_name};
use crate::controller::error::Result;
use crate::controller::workload::{Workload, cancellable, node_name};

/// Why a single control-plane node's etcd is considered unhealthy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeHealthIssue {
    #[error("node {node} has no provider ID")]
    MissingProviderId { node: String },

    #[error("etcd pod {namespace}/{pod} not found")]
    PodNotFound { namespace: String, pod: String },

    #[error("failed to get etcd pod {namespace}/{pod}: {reason}")]
    PodLookupFailed {
        namespace: String,
        pod: String,
        reason: String,
    },

    #[error("etcd pod {namespace}/{pod} is not ready")]
    PodNotReady { namespace: String, pod: String },

    #[error("etcd is unreachable: {reason}")]
    EtcdUnreachable { reason: String },

    #[error("no etcd member named {node}")]
    MemberMissing { node: String },

    #[error("etcd member {member_id:x} has active alarms: {}", format_alarms(.alarms))]
    AlarmsActive {
        member_id: u64,
        alarms: Vec<AlarmType>,
    },
}

fn format_alarms(alarms: &[AlarmType]) -> String {
    alarms
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-node outcome of one health check.
pub type NodeHealth = std::result::Result<(), NodeHealthIssue>;

/// Result of one health check cycle, keyed by node name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EtcdHealthReport {
    nodes: BTreeMap<String, NodeHealth>,
    members: Vec<Member>,
}

impl EtcdHealthReport {
    /// True when every node checked is healthy.
    pub fn is_healthy(&self) -> bool {
        self.nodes.values().all(|r| r.is_ok())
    }

    /// Names of nodes that failed the check.
    pub fn unhealthy_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn get(&self, node: &str) -> Option<&NodeHealth> {
        self.nodes.get(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeHealth)> {
        self.nodes.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Member list the nodes were evaluated against. Empty when etcd could
    /// not be reached.
    pub fn members(&self) -> &[Member] {
        &self.members
    }
}

impl IntoIterator for EtcdHealthReport {
    type Item = (String, NodeHealth);
    type IntoIter = std::collections::btree_map::IntoIter<String, NodeHealth>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Whether the pod's `Ready` condition is `True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn has_provider_id(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .is_some_and(|id| !id.is_empty())
}

/// Members and alarms read once per check cycle.
struct EtcdSnapshot {
    members: Vec<Member>,
    alarms: Vec<Alarm>,
}

/// Judge a node whose pod is ready against the etcd snapshot.
fn evaluate_member(node: &str, snapshot: &EtcdSnapshot) -> NodeHealth {
    let member = member_for_name(&snapshot.members, node).ok_or_else(|| {
        NodeHealthIssue::MemberMissing {
            node: node.to_string(),
        }
    })?;

    let alarms = active_alarms_for(&snapshot.alarms, member.id);
    if !alarms.is_empty() {
        return Err(NodeHealthIssue::AlarmsActive {
            member_id: member.id,
            alarms,
        });
    }
    Ok(())
}

impl Workload {
    /// Check etcd health for every control-plane node.
    ///
    /// Fails as a whole only when the control-plane nodes cannot be listed;
    /// everything else is reported per node.
    #[instrument(skip(self, cancel))]
    pub async fn etcd_is_healthy(&self, cancel: &CancellationToken) -> Result<EtcdHealthReport> {
        cancellable(cancel, self.check_etcd_health()).await
    }

    async fn check_etcd_health(&self) -> Result<EtcdHealthReport> {
        let nodes = self.control_plane_nodes().await?;

        let mut results: BTreeMap<String, NodeHealth> = BTreeMap::new();
        let mut ready_nodes: Vec<&str> = Vec::new();
        for node in &nodes {
            let Some(name) = node_name(node) else {
                continue;
            };
            let outcome = self.check_pod(node, name).await;
            if outcome.is_ok() {
                ready_nodes.push(name);
            }
            results.insert(name.to_string(), outcome);
        }

        let mut members = Vec::new();
        match self.etcd_snapshot(&ready_nodes).await {
            Ok(snapshot) => {
                for (name, outcome) in results.iter_mut() {
                    if outcome.is_ok() {
                        *outcome = evaluate_member(name, &snapshot);
                    }
                }
                members = snapshot.members;
            }
            Err(reason) => {
                for outcome in results.values_mut().filter(|o| o.is_ok()) {
                    *outcome = Err(NodeHealthIssue::EtcdUnreachable {
                        reason: reason.clone(),
                    });
                }
            }
        }

        for (name, outcome) in &results {
            if let Err(issue) = outcome {
                warn!(node = %name, issue = %issue, "etcd unhealthy on node");
            }
        }

        let report = EtcdHealthReport {
            nodes: results,
            members,
        };
        info!(
            nodes = report.len(),
            unhealthy = report.unhealthy_nodes().len(),
            "etcd health check complete"
        );
        Ok(report)
    }

    /// Check provider ID and static pod readiness for one node.
    async fn check_pod(&self, node: &Node, name: &str) -> NodeHealth {
        if !has_provider_id(node) {
            return Err(NodeHealthIssue::MissingProviderId {
                node: name.to_string(),
            });
        }

        let namespace = &self.config.system_namespace;
        let pod_name = self.config.etcd_pod_name(name);
        match self.cluster.get_pod(namespace, &pod_name).await {
            Ok(Some(pod)) if is_pod_ready(&pod) => Ok(()),
            Ok(Some(_)) => Err(NodeHealthIssue::PodNotReady {
                namespace: namespace.clone(),
                pod: pod_name,
            }),
            Ok(None) => Err(NodeHealthIssue::PodNotFound {
                namespace: namespace.clone(),
                pod: pod_name,
            }),
            Err(e) => Err(NodeHealthIssue::PodLookupFailed {
                namespace: namespace.clone(),
                pod: pod_name,
                reason: e.to_string(),
            }),
        }
    }

    /// Read members and alarms through the first node that accepts a
    /// connection.
    async fn etcd_snapshot(&self, nodes: &[&str]) -> std::result::Result<EtcdSnapshot, String> {
        let mut last_error = None;
        for node in nodes {
            let mut client = match self.etcd.for_node(node).await {
                Ok(client) => client,
                Err(e) => {
                    debug!(node = %node, error = %e, "Could not connect to etcd, trying next node");
                    last_error = Some(format!("node {}: {}", node, e));
                    continue;
                }
            };

            let members = client
                .members()
                .await
                .map_err(|e| format!("member list via node {}: {}", node, e))?;
            let alarms = client
                .alarms()
                .await
                .map_err(|e| format!("alarm list via node {}: {}", node, e))?;
            debug!(node = %node, members = members.len(), alarms = alarms.len(), "Read etcd snapshot");
            return Ok(EtcdSnapshot { members, alarms });
        }

        Err(last_error
            .unwrap_or_else(|| "no control plane node has a ready etcd pod".to_string()))
    }
}
