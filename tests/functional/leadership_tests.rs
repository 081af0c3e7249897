//! etcd leadership forwarding.

use controlplane_etcd::Error;
use controlplane_etcd::client::{FakeEtcdClient, FakeEtcdClientFactory, Member};
use controlplane_etcd::cluster::FakeClusterClient;
use tokio_util::sync::CancellationToken;

use crate::common::fixtures::{MachineBuilder, machine_on, workload};

const MACHINE_MEMBER: u64 = 101;
const OTHER_MEMBER: u64 = 1034;
const LEADER_NODE_MEMBER: u64 = 12345;

fn etcd_members() -> Vec<Member> {
    vec![
        Member::new(MACHINE_MEMBER, "machine-node"),
        Member::new(OTHER_MEMBER, "other-node"),
        Member::new(LEADER_NODE_MEMBER, "leader-node"),
    ]
}

fn etcd_with_leader(leader_id: u64) -> (FakeEtcdClient, FakeEtcdClientFactory) {
    let fake = FakeEtcdClient::new()
        .with_members(etcd_members())
        .with_leader(leader_id);
    let factory = FakeEtcdClientFactory::new(fake.clone());
    (fake, factory)
}

#[tokio::test]
async fn test_forward_is_noop_when_machine_is_not_leader() {
    let (fake, etcd) = etcd_with_leader(LEADER_NODE_MEMBER);

    workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            Some(&machine_on("other-node")),
            &CancellationToken::new(),
        )
        .await
        .expect("no-op");

    assert!(fake.moved_leader_to().is_empty());
    assert_eq!(etcd.requested_nodes(), vec!["machine-node"]);
}

#[tokio::test]
async fn test_forward_moves_to_candidate() {
    let (fake, etcd) = etcd_with_leader(MACHINE_MEMBER);

    workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            Some(&machine_on("leader-node")),
            &CancellationToken::new(),
        )
        .await
        .expect("forward");

    assert_eq!(fake.moved_leader_to(), vec![LEADER_NODE_MEMBER]);
}

#[tokio::test]
async fn test_forward_without_candidate_picks_first_other_member() {
    let (fake, etcd) = etcd_with_leader(MACHINE_MEMBER);

    workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("forward");

    assert_eq!(fake.moved_leader_to(), vec![OTHER_MEMBER]);
}

#[tokio::test]
async fn test_forward_fails_for_unknown_candidate() {
    let (fake, etcd) = etcd_with_leader(MACHINE_MEMBER);

    let err = workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            Some(&machine_on("some-other-node")),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CandidateNotFound { node } if node == "some-other-node"));
    assert!(fake.moved_leader_to().is_empty());
}

#[tokio::test]
async fn test_forward_fails_for_candidate_without_node_ref() {
    let (fake, etcd) = etcd_with_leader(MACHINE_MEMBER);
    let candidate = MachineBuilder::new("pending-candidate").build();

    let err = workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            Some(&candidate),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CandidateNotFound { .. }));
    assert!(fake.moved_leader_to().is_empty());
}

#[tokio::test]
async fn test_forward_without_machine_is_noop() {
    let (fake, etcd) = etcd_with_leader(MACHINE_MEMBER);
    let workload = workload(&FakeClusterClient::new(), &etcd);

    workload
        .forward_etcd_leadership(None, None, &CancellationToken::new())
        .await
        .expect("no machine");
    workload
        .forward_etcd_leadership(
            Some(&MachineBuilder::new("never-joined").build()),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("no node ref");

    assert!(etcd.requested_nodes().is_empty());
    assert_eq!(fake.rpc_count(), 0);
}

#[tokio::test]
async fn test_forward_is_noop_when_machine_has_no_member() {
    let fake = FakeEtcdClient::new()
        .with_members(vec![Member::new(OTHER_MEMBER, "other-node")])
        .with_leader(OTHER_MEMBER);
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            None,
            &CancellationToken::new(),
        )
        .await
        .expect("no-op");

    assert!(fake.moved_leader_to().is_empty());
}

#[tokio::test]
async fn test_forward_with_no_other_member_fails() {
    let fake = FakeEtcdClient::new()
        .with_members(vec![Member::new(MACHINE_MEMBER, "machine-node")])
        .with_leader(MACHINE_MEMBER);
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    let err = workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::NoLeaderCandidate {
            leader_id: MACHINE_MEMBER
        }
    ));
    assert!(fake.moved_leader_to().is_empty());
}

#[tokio::test]
async fn test_forward_surfaces_factory_error() {
    let etcd = FakeEtcdClientFactory::failing("pod etcd-machine-node not running");

    let err = workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ConnectionFailed { node, .. } if node == "machine-node"));
}

#[tokio::test]
async fn test_forward_surfaces_move_failure() {
    let fake = FakeEtcdClient::new()
        .with_members(etcd_members())
        .with_leader(MACHINE_MEMBER)
        .fail_move_leader("leader changed");
    let etcd = FakeEtcdClientFactory::new(fake.clone());

    let err = workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(
            Some(&machine_on("machine-node")),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RpcFailed { operation: "move leader", .. }));
}

#[tokio::test]
async fn test_forward_recomputes_leadership_each_call() {
    let (fake, etcd) = etcd_with_leader(MACHINE_MEMBER);
    let workload = workload(&FakeClusterClient::new(), &etcd);
    let machine = machine_on("machine-node");

    workload
        .forward_etcd_leadership(Some(&machine), None, &CancellationToken::new())
        .await
        .expect("first forward");
    // Leadership moved away, so the second call is a no-op
    workload
        .forward_etcd_leadership(Some(&machine), None, &CancellationToken::new())
        .await
        .expect("second forward");

    assert_eq!(fake.moved_leader_to(), vec![OTHER_MEMBER]);
}

#[tokio::test]
async fn test_cancelled_forward_issues_no_rpc() {
    let (fake, etcd) = etcd_with_leader(MACHINE_MEMBER);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = workload(&FakeClusterClient::new(), &etcd)
        .forward_etcd_leadership(Some(&machine_on("machine-node")), None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(fake.rpc_count(), 0);
}
