//! Cluster API `Machine` resource.
//!
//! Only the fields this crate reads are modelled. The CRD itself is owned and
//! installed by Cluster API, so schema generation is disabled and unknown
//! fields are ignored on deserialization.
//!
//! Example:
//! ```yaml
//! apiVersion: cluster.x-k8s.io/v1alpha3
//! kind: Machine
//! metadata:
//!   name: my-cluster-control-plane-abcde
//! spec:
//!   clusterName: my-cluster
//!   version: v1.18.2
//! status:
//!   nodeRef:
//!     kind: Node
//!     name: ip-10-0-0-12
//! ```

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Desired state of a Cluster API machine.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "Machine",
    plural = "machines",
    status = "MachineStatus",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the Cluster this machine belongs to.
    #[serde(default)]
    pub cluster_name: String,

    /// Kubernetes version of the machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Provider-specific identifier of the backing instance.
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Failure domain the machine was placed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain: Option<String>,
}

/// Observed state of a Cluster API machine.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Reference to the Node this machine registered as, once it joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeReference>,

    /// Lifecycle phase reported by the machine controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// Subset of a core `ObjectReference` pointing at a Node.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl NodeReference {
    /// Reference a Node by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            api_version: Some("v1".to_string()),
            kind: Some("Node".to_string()),
            name: name.into(),
            uid: None,
        }
    }
}

impl Machine {
    /// Name of the Node this machine is backed by.
    ///
    /// Returns `None` when the machine never joined the cluster. An empty
    /// reference name is treated the same as a missing reference.
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.node_ref.as_ref())
            .map(|r| r.name.as_str())
            .filter(|name| !name.is_empty())
    }
}
