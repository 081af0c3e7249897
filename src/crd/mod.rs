//! Resource types consumed by controlplane-etcd.
//!
//! - `Machine`: Cluster API machine, mapped to its Node and etcd member

mod machine;

pub use machine::*;
