mod common;

use common::{TestCloud, cluster_kube, demo_kube};
use kubeprov_cloud::{CloudError, Provider, RecordingAction, Volume};
use kubeprov_cloud_digitalocean::InMemoryDigitalOcean;
use kubeprov_cloud_digitalocean::provider::VOLUME_DRIVER;
use kubeprov_cloud_digitalocean::recipe::steps;

#[tokio::test(start_paused = true)]
async fn test_volume_lifecycle() {
    let cloud = TestCloud::with_api(InMemoryDigitalOcean::new().with_settle_polls(2));
    let kube = demo_kube();
    let action = RecordingAction::new();
    let mut volume = Volume::new("data", 20);

    cloud
        .provider
        .create_volume(&kube, &mut volume, &action)
        .await
        .unwrap();
    let id = volume.provider_id.clone().unwrap();
    let volumes = cloud.api.volumes();
    let created = &volumes[0];
    assert_eq!(created.id, id);
    assert_eq!(created.size_gigabytes, 20);
    assert_eq!(created.tags, vec!["kubernetes-cluster:demo"]);
    assert_eq!(cloud.api.volume_region("data").as_deref(), Some("nyc3"));

    // not readable for two polls, then available
    cloud
        .provider
        .wait_for_volume_available(&kube, &volume)
        .await
        .unwrap();

    volume.size_gb = 40;
    cloud
        .provider
        .resize_volume(&kube, &mut volume, &action)
        .await
        .unwrap();
    assert_eq!(cloud.api.volumes()[0].size_gigabytes, 40);
    assert_eq!(volume.provider_id.as_deref(), Some(id.as_str()));

    cloud
        .provider
        .delete_volume(&kube, &mut volume, &action)
        .await
        .unwrap();
    assert!(cloud.api.volumes().is_empty());
    assert!(volume.provider_id.is_none());

    assert_eq!(
        action.steps(),
        vec![steps::CREATE_VOLUME, steps::RESIZE_VOLUME, steps::DELETE_VOLUME]
    );

    // deleting again is a no-op
    cloud
        .provider
        .delete_volume(&kube, &mut volume, &action)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wait_resolves_volume_by_name() {
    let cloud = TestCloud::new();
    let kube = demo_kube();
    let mut volume = Volume::new("data", 10);
    cloud
        .provider
        .create_volume(&kube, &mut volume, &RecordingAction::new())
        .await
        .unwrap();

    let unrecorded = Volume::new("data", 10);
    cloud
        .provider
        .wait_for_volume_available(&kube, &unrecorded)
        .await
        .unwrap();

    let missing = Volume::new("logs", 10);
    let err = cloud
        .provider
        .wait_for_volume_available(&kube, &missing)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_unsettled_volume_times_out() {
    let cloud = TestCloud::with_api(InMemoryDigitalOcean::new().with_settle_polls(10_000));
    let kube = demo_kube();
    let mut volume = Volume::new("data", 10);
    cloud
        .provider
        .create_volume(&kube, &mut volume, &RecordingAction::new())
        .await
        .unwrap();

    let err = cloud
        .provider
        .wait_for_volume_available(&kube, &volume)
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Timeout(msg) if msg.contains("volume data")));
}

#[tokio::test]
async fn test_resize_missing_volume() {
    let cloud = TestCloud::new();
    let kube = demo_kube();
    let mut volume = Volume::new("data", 40);

    let err = cloud
        .provider
        .resize_volume(&kube, &mut volume, &RecordingAction::new())
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(steps::RESIZE_VOLUME));
    assert!(matches!(
        err,
        CloudError::StepFailed { ref source, .. } if source.is_not_found()
    ));
}

#[tokio::test]
async fn test_volumes_cannot_shrink() {
    let cloud = TestCloud::new();
    let kube = demo_kube();
    let action = RecordingAction::new();
    let mut volume = Volume::new("data", 40);
    cloud
        .provider
        .create_volume(&kube, &mut volume, &action)
        .await
        .unwrap();

    volume.size_gb = 10;
    let err = cloud
        .provider
        .resize_volume(&kube, &mut volume, &action)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CloudError::StepFailed { ref source, .. }
            if matches!(**source, CloudError::Api { status: 422, .. })
    ));
    assert_eq!(cloud.api.volumes()[0].size_gigabytes, 40);
}

#[tokio::test]
async fn test_volumes_of_other_clusters_are_left_alone() {
    let cloud = TestCloud::new();
    let demo = demo_kube();
    let other = cluster_kube("other");
    let action = RecordingAction::new();
    let mut volume = Volume::new("data", 10);
    cloud
        .provider
        .create_volume(&demo, &mut volume, &action)
        .await
        .unwrap();

    let mut same_name = Volume::new("data", 20);
    let err = cloud
        .provider
        .resize_volume(&other, &mut same_name, &action)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CloudError::StepFailed { ref source, .. } if source.is_not_found()
    ));
    assert!(
        cloud
            .provider
            .wait_for_volume_available(&other, &Volume::new("data", 10))
            .await
            .unwrap_err()
            .is_not_found()
    );

    cloud
        .provider
        .delete_volume(&other, &mut same_name, &action)
        .await
        .unwrap();

    let volumes = cloud.api.volumes();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].size_gigabytes, 10);
    assert_eq!(volumes[0].tags, vec!["kubernetes-cluster:demo"]);
}

#[test]
fn test_volume_definition() {
    let cloud = TestCloud::new();
    let mut volume = Volume::new("data", 20);
    volume.provider_id = Some("vol-7".into());

    let mount = cloud.provider.kubernetes_volume_definition(&volume);

    assert_eq!(mount.name, "data");
    assert_eq!(mount.flex_volume.driver, VOLUME_DRIVER);
    assert_eq!(mount.flex_volume.fs_type, "ext4");
    assert_eq!(mount.flex_volume.options["volumeID"], "vol-7");
    assert_eq!(mount.flex_volume.options["name"], "data");
}
