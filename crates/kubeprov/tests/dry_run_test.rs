use async_trait::async_trait;
use kubeprov::{
    AccountStore, CloudAccount, CloudAccounts, CloudError, DryRun, Kube, KubeGateway,
    RecordingAction, Settings,
};
use kubeprov_cloud::{DigitalOceanKubeConfig, OpenStackKubeConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MemoryStore {
    accounts: Mutex<Vec<CloudAccount>>,
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create(&self, account: &mut CloudAccount) -> kubeprov_cloud::Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        account.id = Some(accounts.len() as i64 + 1);
        accounts.push(account.clone());
        Ok(())
    }
}

fn openstack_account() -> CloudAccount {
    CloudAccount::new("lab", "openstack")
        .with_credential("identity_endpoint", "http://keystone.test:5000/v2.0")
        .with_credential("username", "admin")
        .with_credential("password", "secret")
        .with_credential("tenant_id", "tenant-1")
}

fn digitalocean_account() -> CloudAccount {
    CloudAccount::new("do", "digitalocean").with_credential("token", "dop_v1_test")
}

#[tokio::test]
async fn test_accounts_are_validated_before_persisting() {
    let dry_run = DryRun::new(&Settings::default()).unwrap();
    let accounts = CloudAccounts::new(Arc::new(dry_run.registry), MemoryStore::default());

    let mut lab = openstack_account();
    accounts.create(&mut lab).await.unwrap();
    assert_eq!(lab.id, Some(1));

    let mut broken = digitalocean_account();
    broken.credentials.clear();
    let err = accounts.create(&mut broken).await.unwrap_err();
    assert!(matches!(err, CloudError::Validation(_)));

    let mut unknown = CloudAccount::new("aws", "aws");
    let err = accounts.create(&mut unknown).await.unwrap_err();
    assert!(matches!(err, CloudError::UnknownProvider(_)));

    assert_eq!(accounts.store().accounts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_clusters_on_both_clouds() {
    let dry_run = DryRun::new(&Settings::default()).unwrap();
    let openstack = dry_run.openstack.clone();
    let digitalocean = dry_run.digitalocean.clone();
    let gateway = KubeGateway::new(Arc::new(dry_run.registry));
    let action = RecordingAction::new();

    let mut lab = Kube::new("lab", openstack_account(), "m1.small").with_openstack_config(
        OpenStackKubeConfig {
            region: "RegionOne".into(),
            ..Default::default()
        },
    );
    let mut edge = Kube::new("edge", digitalocean_account(), "s-2vcpu-4gb")
        .with_digitalocean_config(DigitalOceanKubeConfig {
            region: "ams3".into(),
            ..Default::default()
        });

    gateway.create(&mut lab, &action).await.unwrap();
    gateway.create(&mut edge, &action).await.unwrap();
    assert!(lab.master_public_ip.is_some());
    assert!(edge.master_public_ip.is_some());
    assert_eq!(openstack.servers().len(), 2);
    assert_eq!(digitalocean.droplets().len(), 2);
    assert!(!gateway.is_busy(&lab));

    gateway.delete(&mut lab, &action).await.unwrap();
    gateway.delete(&mut edge, &action).await.unwrap();
    assert!(openstack.servers().is_empty());
    assert!(openstack.routers().is_empty());
    assert!(digitalocean.droplets().is_empty());
}
