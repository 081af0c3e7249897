// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Integration tests for controlplane-etcd
//!
//! These tests require a kubeadm-bootstrapped Kubernetes cluster accessible
//! via kubeconfig, and the etcd client PEM files named by `ETCD_CA_FILE`,
//! `ETCD_CERT_FILE` and `ETCD_KEY_FILE`. Tests are marked with #[ignore] and
//! must be run explicitly:
//!
//! ```bash
//! cargo test --test integration -- --ignored
//! ```
//!
//! Only read-only and no-op operations are exercised; nothing here removes
//! a member or moves leadership on the target cluster.

#[path = "../common/mod.rs"]
mod common;


mod workload_tests;
