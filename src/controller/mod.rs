//! Workload operations on the etcd quorum of a kubeadm control plane.
//!
//! - `health`: per-node etcd health aggregation
//! - `membership`: machine to member mapping and quorum-guarded removal
//! - `leadership`: leadership transfer ahead of machine deletion
//! - `kubeadm_config`: etcd image reconciliation in the kubeadm configuration
//!
//! Every operation is single-attempt. Retry policy belongs to the caller.

pub mod error;
pub mod health;
pub mod kubeadm_config;
pub mod leadership;
pub mod membership;
pub mod workload;

pub use error::{Error, Result};
pub use health::{EtcdHealthReport, NodeHealth, NodeHealthIssue, is_pod_ready};
pub use kubeadm_config::update_etcd_image;
pub use leadership::select_leader_target;
pub use membership::member_for_machine;
pub use workload::Workload;
