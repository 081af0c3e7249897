//! Read-only and no-op workload operations against a live control plane.

use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::Api;
use kube::api::ListParams;
use serde_yaml::Value;
use tokio_util::sync::CancellationToken;

use controlplane_etcd::config::DEFAULT_CONTROL_PLANE_LABEL;

use crate::cluster::{SharedTestCluster, init_tracing};
use crate::common::fixtures::MachineBuilder;

#[tokio::test]
#[ignore = "requires a kubeadm cluster"]
async fn test_health_reports_every_control_plane_node() {
    init_tracing();
    let cluster = SharedTestCluster::get().await;
    let workload = cluster.workload().await;

    let nodes: Api<Node> = Api::all(cluster.new_client().await);
    let control_plane = nodes
        .list(&ListParams::default().labels(&workload.config().control_plane_label))
        .await
        .expect("list nodes");

    let report = workload
        .etcd_is_healthy(&CancellationToken::new())
        .await
        .expect("health check");

    assert_eq!(report.len(), control_plane.items.len());
    assert!(report.is_healthy(), "unhealthy: {:?}", report.unhealthy_nodes());
    assert!(report.members().len() >= control_plane.items.len());
}

#[tokio::test]
#[ignore = "requires a kubeadm cluster"]
async fn test_update_with_current_image_is_noop() {
    init_tracing();
    let cluster = SharedTestCluster::get().await;
    let workload = cluster.workload().await;
    let config = workload.config().clone();

    let config_maps: Api<ConfigMap> =
        Api::namespaced(cluster.new_client().await, &config.system_namespace);
    let before = config_maps
        .get(&config.kubeadm_config_map)
        .await
        .expect("kubeadm-config");
    let document: Value = serde_yaml::from_str(
        &before.data.as_ref().expect("data")[&config.cluster_configuration_key],
    )
    .expect("ClusterConfiguration");

    let local = &document["etcd"]["local"];
    let (Some(repo), Some(tag)) = (
        local["imageRepository"].as_str(),
        local["imageTag"].as_str(),
    ) else {
        // kubeadm defaults apply; nothing pinned to compare against
        return;
    };

    workload
        .update_etcd_version_in_config(repo, tag, &CancellationToken::new())
        .await
        .expect("no-op update");

    let after = config_maps
        .get(&config.kubeadm_config_map)
        .await
        .expect("kubeadm-config");
    assert_eq!(
        before.metadata.resource_version,
        after.metadata.resource_version
    );
}

#[tokio::test]
#[ignore = "requires a kubeadm cluster"]
async fn test_forward_for_unjoined_machine_is_noop() {
    init_tracing();
    let workload = SharedTestCluster::get().await.workload().await;
    let machine = MachineBuilder::new("never-joined").build();

    workload
        .forward_etcd_leadership(Some(&machine), None, &CancellationToken::new())
        .await
        .expect("no-op forward");
    workload
        .remove_etcd_member_for_machine(Some(&machine), &CancellationToken::new())
        .await
        .expect("no-op remove");
}

#[tokio::test]
#[ignore = "requires a kubeadm cluster"]
async fn test_default_label_selects_control_plane() {
    let cluster = SharedTestCluster::get().await;
    let nodes: Api<Node> = Api::all(cluster.new_client().await);
    let labelled = nodes
        .list(&ListParams::default().labels(DEFAULT_CONTROL_PLANE_LABEL))
        .await
        .expect("list nodes");
    assert!(
        !labelled.items.is_empty(),
        "no node carries {}",
        DEFAULT_CONTROL_PLANE_LABEL
    );
}
