//! controlplane-etcd library crate
//!
//! Keeps the etcd quorum of a kubeadm control plane consistent with its
//! Cluster API machines: health aggregation, member removal, leadership
//! forwarding and etcd image reconciliation.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use controlplane_etcd::{KubeClusterClient, PortForwardEtcdClientFactory, Workload, WorkloadConfig};
//!
//! let config = WorkloadConfig::from_env()?;
//! let workload = Workload::new(
//!     Arc::new(KubeClusterClient::new(client.clone())),
//!     Arc::new(PortForwardEtcdClientFactory::new(client, config.clone()).with_tls(tls)),
//! )
//! .with_config(config);
//!
//! workload.forward_etcd_leadership(Some(&machine), None, &cancel).await?;
//! workload.remove_etcd_member_for_machine(Some(&machine), &cancel).await?;
//! ```

pub mod client;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;

pub use client::{EtcdClient, EtcdClientFactory, PortForwardEtcdClientFactory};
pub use cluster::{ClusterClient, KubeClusterClient};
pub use config::{EtcdTlsConfig, WorkloadConfig};
pub use controller::{EtcdHealthReport, NodeHealthIssue, Workload};
pub use controller::error::{Error, Result};
pub use crd::Machine;
