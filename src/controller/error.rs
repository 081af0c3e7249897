//! Error types for the workload operations.
//!
//! Defines custom error types with classification for retry behavior. This
//! layer never retries on its own; `is_retryable` is a hint for the calling
//! control loop.

use thiserror::Error;

use crate::client::EtcdError;

/// Error type for workload operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Machine has no associated Node
    #[error("Machine {machine} has no node reference")]
    NoNodeRef { machine: String },

    /// No etcd member carries the Node's name
    #[error("No etcd member found for node {node}")]
    MemberNotFound { node: String },

    /// Requested leader candidate does not resolve to an etcd member
    #[error("Leader candidate {node} does not resolve to an etcd member")]
    CandidateNotFound { node: String },

    /// No member other than the leader is available to take leadership
    #[error("No etcd member other than leader {leader_id:x} can take leadership")]
    NoLeaderCandidate { leader_id: u64 },

    /// Too few control-plane nodes to remove a member safely
    #[error("Cannot remove etcd member: only {control_plane_nodes} control plane node(s) present")]
    InsufficientQuorum { control_plane_nodes: usize },

    /// No control-plane node other than the one being removed
    #[error("Cannot remove etcd member: no control plane node other than {node}")]
    NoRemainingMember { node: String },

    /// etcd on a node could not be reached
    #[error("Failed to connect to etcd on node {node}: {source}")]
    ConnectionFailed {
        node: String,
        #[source]
        source: EtcdError,
    },

    /// An etcd RPC was rejected or timed out
    #[error("etcd {operation} failed: {source}")]
    RpcFailed {
        operation: &'static str,
        #[source]
        source: EtcdError,
    },

    /// Optimistic concurrency failure on a write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration object does not exist
    #[error("ConfigMap {namespace}/{name} not found")]
    ConfigNotFound { namespace: String, name: String },

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap an etcd RPC failure.
    pub fn rpc(operation: &'static str, source: EtcdError) -> Self {
        Error::RpcFailed { operation, source }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            Error::ConfigNotFound { .. }
            | Error::MemberNotFound { .. }
            | Error::CandidateNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this error should be retried by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::ConnectionFailed { .. } | Error::RpcFailed { .. } | Error::Conflict(_) => true,
            Error::NoNodeRef { .. }
            | Error::MemberNotFound { .. }
            | Error::CandidateNotFound { .. }
            | Error::NoLeaderCandidate { .. }
            | Error::InsufficientQuorum { .. }
            | Error::NoRemainingMember { .. }
            | Error::ConfigNotFound { .. }
            | Error::MissingField(_)
            | Error::InvalidConfig(_)
            | Error::Serialization(_)
            | Error::Cancelled => false,
        }
    }
}

/// Result type alias for workload operations
pub type Result<T> = std::result::Result<T, Error>;
