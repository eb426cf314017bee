mod common;

use common::{TestCloud, demo_kube};
use kubeprov_cloud::{Node, Provider, RecordingAction};
use kubeprov_cloud_digitalocean::recipe::steps;

#[tokio::test]
async fn test_node_lifecycle() {
    let cloud = TestCloud::new();
    let mut kube = demo_kube();
    let action = RecordingAction::new();
    cloud.provider.create_kube(&mut kube, &action).await.unwrap();

    let mut node = Node::new("demo-minion-extra", "s-4vcpu-8gb");
    cloud
        .provider
        .create_node(&kube, &mut node, &action)
        .await
        .unwrap();

    let id: u64 = node.provider_id.as_deref().unwrap().parse().unwrap();
    let droplet = cloud
        .api
        .droplets()
        .into_iter()
        .find(|d| d.id == id)
        .unwrap();
    assert_eq!(droplet.name, "demo-minion-extra");
    assert!(droplet.has_tag("kubernetes-cluster:demo"));
    assert!(droplet.has_tag("role:minion"));
    assert_eq!(node.public_ip.as_deref(), droplet.public_ipv4());
    let boot = cloud.api.user_data("demo-minion-extra").unwrap();
    assert!(boot.contains(kube.master_public_ip.as_deref().unwrap()));

    cloud
        .provider
        .delete_node(&kube, &mut node, &action)
        .await
        .unwrap();
    assert!(node.provider_id.is_none());
    assert!(node.public_ip.is_none());
    assert!(!cloud.api.droplets().iter().any(|d| d.id == id));
    assert_eq!(action.current().as_deref(), Some(steps::DELETE_NODE));

    // deleting again is a no-op
    cloud
        .provider
        .delete_node(&kube, &mut node, &action)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_node_ignores_other_clusters() {
    let cloud = TestCloud::new();
    cloud
        .api
        .seed_droplet("worker-1", &["kubernetes-cluster:other", "role:minion"]);
    let kube = demo_kube();
    let mut node = Node::new("worker-1", "s-1vcpu-2gb");

    cloud
        .provider
        .delete_node(&kube, &mut node, &RecordingAction::new())
        .await
        .unwrap();

    assert_eq!(cloud.leftovers(), vec!["worker-1"]);
}

#[tokio::test]
async fn test_create_node_failure_records_nothing() {
    let cloud = TestCloud::new();
    cloud.api.fail_on("create_droplet demo-minion-extra", 422);
    let kube = demo_kube();
    let mut node = Node::new("demo-minion-extra", "s-4vcpu-8gb");

    let err = cloud
        .provider
        .create_node(&kube, &mut node, &RecordingAction::new())
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(steps::CREATE_NODE));
    assert!(node.provider_id.is_none());
}
