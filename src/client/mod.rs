//! etcd client module for membership operations.
//!
//! This module provides the narrow etcd capability the workload depends on,
//! a networked implementation over the `etcd-client` crate, and the factory
//! that opens a connection scoped to one control-plane node.
//!
//! ## Architecture
//!
//! - `etcd`: `EtcdClient` trait and the gRPC-backed `NetworkEtcdClient`
//! - `factory`: `EtcdClientFactory` trait and the port-forwarding implementation
//! - `port_forward`: API server port-forward to an etcd static pod
//! - `types`: owned member and alarm snapshots
//! - `fake`: in-memory doubles for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use controlplane_etcd::client::{EtcdClientFactory, PortForwardEtcdClientFactory};
//!
//! let factory = PortForwardEtcdClientFactory::new(kube_client, WorkloadConfig::default());
//! let mut etcd = factory.for_node("cp-1").await?;
//! for member in etcd.members().await? {
//!     println!("{} {:x}", member.name, member.id);
//! }
//! ```

pub mod etcd;
pub mod factory;
pub mod fake;
pub mod port_forward;
pub mod types;

pub use etcd::{EtcdClient, EtcdClientConfig, EtcdError, NetworkEtcdClient};
pub use factory::{EtcdClientFactory, PortForwardEtcdClientFactory};
pub use fake::{FakeEtcdClient, FakeEtcdClientFactory};
pub use port_forward::{PortForward, PortForwardError};
pub use types::{Alarm, AlarmType, Member, active_alarms_for, member_for_name};
