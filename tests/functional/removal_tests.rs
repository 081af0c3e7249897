//! Quorum guard and etcd member removal.

use controlplane_etcd::Error;
use controlplane_etcd::client::{FakeEtcdClient, FakeEtcdClientFactory, Member};
use controlplane_etcd::cluster::FakeClusterClient;
use tokio_util::sync::CancellationToken;

use crate::common::fixtures::{
    MachineBuilder, cluster_with_ready_nodes, control_plane_node, machine_on, workload,
};

fn etcd_members() -> Vec<Member> {
    vec![
        Member::new(101, "machine-node"),
        Member::new(1034, "other-node"),
    ]
}

#[tokio::test]
async fn test_remove_without_machine_is_noop() {
    let cluster = FakeClusterClient::new();
    let etcd = FakeEtcdClientFactory::new(FakeEtcdClient::new());

    workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(None, &CancellationToken::new())
        .await
        .expect("no-op");
    assert!(etcd.requested_nodes().is_empty());
}

#[tokio::test]
async fn test_remove_machine_without_node_ref_is_noop() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let fake = FakeEtcdClient::new().with_members(etcd_members());
    let etcd = FakeEtcdClientFactory::new(fake.clone());
    let machine = MachineBuilder::new("never-joined").build();

    workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine), &CancellationToken::new())
        .await
        .expect("no-op");

    assert!(etcd.requested_nodes().is_empty());
    assert_eq!(fake.rpc_count(), 0);
}

#[tokio::test]
async fn test_remove_with_single_control_plane_node_fails() {
    let cluster = cluster_with_ready_nodes(&["machine-node"]);
    let fake = FakeEtcdClient::new().with_members(etcd_members());
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    let err = workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InsufficientQuorum {
            control_plane_nodes: 1
        }
    ));
    assert!(fake.removed_members().is_empty());
}

#[tokio::test]
async fn test_remove_with_no_control_plane_nodes_fails() {
    let cluster = FakeClusterClient::new();
    let etcd = FakeEtcdClientFactory::new(FakeEtcdClient::new());

    let err = workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InsufficientQuorum {
            control_plane_nodes: 0
        }
    ));
}

#[tokio::test]
async fn test_remove_when_only_duplicate_nodes_remain_fails() {
    let cluster = FakeClusterClient::new()
        .with_node(control_plane_node("machine-node"))
        .with_node(control_plane_node("machine-node"));
    let fake = FakeEtcdClient::new().with_members(etcd_members());
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    let err = workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoRemainingMember { node } if node == "machine-node"));
    assert!(etcd.requested_nodes().is_empty());
    assert!(fake.removed_members().is_empty());
}

#[tokio::test]
async fn test_remove_issues_one_rpc_for_matching_member() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let fake = FakeEtcdClient::new().with_members(etcd_members());
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .expect("remove");

    assert_eq!(fake.removed_members(), vec![101]);
    assert_eq!(fake.current_members(), vec![Member::new(1034, "other-node")]);
    // The removal goes through a node other than the one being removed
    assert_eq!(etcd.requested_nodes(), vec!["other-node"]);
}

#[tokio::test]
async fn test_remove_routes_through_first_other_node() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "cp-b", "cp-c"]);
    let fake = FakeEtcdClient::new().with_members(vec![
        Member::new(1, "machine-node"),
        Member::new(2, "cp-b"),
        Member::new(3, "cp-c"),
    ]);
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .expect("remove");

    assert_eq!(etcd.requested_nodes(), vec!["cp-b"]);
    assert_eq!(fake.removed_members(), vec![1]);
}

#[tokio::test]
async fn test_remove_already_removed_member_is_success() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let fake = FakeEtcdClient::new().with_members(vec![Member::new(1034, "other-node")]);
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .expect("idempotent remove");

    assert!(fake.removed_members().is_empty());
}

#[tokio::test]
async fn test_remove_twice_is_idempotent() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let fake = FakeEtcdClient::new().with_members(etcd_members());
    let etcd = FakeEtcdClientFactory::new(fake.clone());
    let workload = workload(&cluster, &etcd);
    let machine = machine_on("machine-node");

    for _ in 0..2 {
        workload
            .remove_etcd_member_for_machine(Some(&machine), &CancellationToken::new())
            .await
            .expect("remove");
    }

    assert_eq!(fake.removed_members(), vec![101]);
}

#[tokio::test]
async fn test_remove_surfaces_factory_error() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let etcd = FakeEtcdClientFactory::failing("no route to host");

    let err = workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(&err, Error::ConnectionFailed { node, .. } if node == "other-node"));
    assert!(err.to_string().contains("no route to host"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_remove_surfaces_member_list_failure() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let etcd = FakeEtcdClientFactory::new(FakeEtcdClient::new().fail_members("timeout"));

    let err = workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RpcFailed { operation: "member list", .. }));
}

#[tokio::test]
async fn test_remove_surfaces_remove_failure_without_retry() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let fake = FakeEtcdClient::new()
        .with_members(etcd_members())
        .fail_remove("member not found");
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    let err = workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RpcFailed { operation: "member remove", .. }));
    // member list + a single remove attempt
    assert_eq!(fake.rpc_count(), 2);
    assert_eq!(etcd.requested_nodes().len(), 1);
}

#[tokio::test]
async fn test_cancelled_remove_issues_no_rpc() {
    let cluster = cluster_with_ready_nodes(&["machine-node", "other-node"]);
    let fake = FakeEtcdClient::new().with_members(etcd_members());
    let etcd = FakeEtcdClientFactory::new(fake.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = workload(&cluster, &etcd)
        .remove_etcd_member_for_machine(Some(&machine_on("machine-node")), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(fake.rpc_count(), 0);
    assert_eq!(fake.current_members().len(), 2);
}
