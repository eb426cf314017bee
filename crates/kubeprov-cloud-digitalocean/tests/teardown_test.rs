mod common;

use common::{TestCloud, demo_kube};
use kubeprov_cloud::{CloudError, Provider, RecordingAction};
use kubeprov_cloud_digitalocean::InMemoryDigitalOcean;
use kubeprov_cloud_digitalocean::recipe::steps;

#[tokio::test]
async fn test_delete_never_created_cluster() {
    let cloud = TestCloud::new();
    let mut kube = demo_kube();
    let action = RecordingAction::new();

    cloud.provider.delete_kube(&mut kube, &action).await.unwrap();

    assert_eq!(action.steps(), vec![steps::DELETE_DROPLETS, steps::DELETE_TAGS]);
    assert!(cloud.api.operations().is_empty());
}

#[tokio::test]
async fn test_delete_only_touches_own_droplets() {
    let cloud = TestCloud::new();
    cloud
        .api
        .seed_droplet("other-master", &["kubernetes-cluster:other", "role:master"]);
    let mut kube = demo_kube();
    let action = RecordingAction::new();

    cloud.provider.create_kube(&mut kube, &action).await.unwrap();
    cloud.provider.delete_kube(&mut kube, &action).await.unwrap();

    assert_eq!(cloud.leftovers(), vec!["other-master"]);
    // role tags are shared and stay
    assert_eq!(cloud.api.tags(), vec!["role:master", "role:minion"]);
}

#[tokio::test]
async fn test_delete_gathers_droplets_across_pages() {
    let cloud = TestCloud::with_api(InMemoryDigitalOcean::new().with_page_size(2));
    for i in 0..3 {
        cloud.api.seed_droplet(
            &format!("unrelated-{}", i),
            &["kubernetes-cluster:other", "role:minion"],
        );
    }
    let mut kube = demo_kube().with_node_sizes(["s-1vcpu-2gb"; 4]);
    let action = RecordingAction::new();

    cloud.provider.create_kube(&mut kube, &action).await.unwrap();
    cloud.provider.delete_kube(&mut kube, &action).await.unwrap();

    assert_eq!(
        cloud.leftovers(),
        vec!["unrelated-0", "unrelated-1", "unrelated-2"]
    );
}

#[tokio::test]
async fn test_delete_after_partial_create() {
    let cloud = TestCloud::new();
    cloud.api.fail_on("create_droplet demo-minion", 500);
    let mut kube = demo_kube();
    let action = RecordingAction::new();

    cloud.provider.create_kube(&mut kube, &action).await.unwrap_err();
    assert_eq!(cloud.leftovers(), vec!["demo-master"]);

    cloud.api.clear_failures();
    cloud.provider.delete_kube(&mut kube, &action).await.unwrap();

    assert!(cloud.leftovers().is_empty());
    assert!(kube.master_public_ip.is_none());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let cloud = TestCloud::new();
    let mut kube = demo_kube();
    let action = RecordingAction::new();

    cloud.provider.create_kube(&mut kube, &action).await.unwrap();
    cloud.provider.delete_kube(&mut kube, &action).await.unwrap();
    let before = cloud.api.operations().len();

    cloud.provider.delete_kube(&mut kube, &action).await.unwrap();
    assert_eq!(cloud.api.operations().len(), before);
}

#[tokio::test]
async fn test_non_404_failure_aborts_delete() {
    let cloud = TestCloud::new();
    let mut kube = demo_kube();
    let action = RecordingAction::new();
    cloud.provider.create_kube(&mut kube, &action).await.unwrap();
    let public_ip = kube.master_public_ip.clone();

    cloud.api.fail_on("delete_droplet", 500);
    let err = cloud.provider.delete_kube(&mut kube, &action).await.unwrap_err();

    assert_eq!(err.failed_step(), Some(steps::DELETE_DROPLETS));
    assert!(matches!(
        err,
        CloudError::StepFailed { ref source, .. } if !source.is_not_found()
    ));
    // the tag step never ran and the record keeps its address
    assert_eq!(action.current().as_deref(), Some(steps::DELETE_DROPLETS));
    assert!(cloud.api.tags().contains(&"kubernetes-cluster:demo".to_string()));
    assert_eq!(kube.master_public_ip, public_ip);
}

#[tokio::test]
async fn test_listing_failure_aborts_delete() {
    let cloud = TestCloud::new();
    cloud.api.fail_on("list_droplets", 503);
    let mut kube = demo_kube();

    let err = cloud
        .provider
        .delete_kube(&mut kube, &RecordingAction::new())
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(steps::DELETE_DROPLETS));
    assert!(matches!(
        err,
        CloudError::StepFailed { ref source, .. }
            if matches!(**source, CloudError::Api { status: 503, .. })
    ));
}
