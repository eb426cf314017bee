use kubeprov_cloud::{CloudAccount, Kube, OpenStackKubeConfig};
use kubeprov_cloud_openstack::{InMemoryConnector, InMemoryOpenStack, OpenStackProvider};
use kubeprov_config::OpenStackSettings;
use std::sync::Arc;

pub struct TestCloud {
    pub api: Arc<InMemoryOpenStack>,
    pub provider: OpenStackProvider,
}

impl TestCloud {
    pub fn new() -> Self {
        Self::with_api(InMemoryOpenStack::new())
    }

    pub fn with_api(api: InMemoryOpenStack) -> Self {
        let api = Arc::new(api);
        let connector = InMemoryConnector::new(api.clone()).with_password("secret");
        let provider = OpenStackProvider::new(Arc::new(connector), OpenStackSettings::default())
            .unwrap();
        Self { api, provider }
    }

    /// Names (addresses for floating IPs) of everything left in the tenant
    /// apart from the seeded external network
    #[allow(dead_code)]
    pub fn leftovers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .api
            .networks()
            .into_iter()
            .filter(|n| !n.external)
            .map(|n| n.name)
            .collect();
        names.extend(self.api.subnets().into_iter().map(|s| s.name));
        names.extend(self.api.routers().into_iter().map(|r| r.name));
        names.extend(self.api.servers().into_iter().map(|s| s.name));
        names.extend(
            self.api
                .floating_ips()
                .into_iter()
                .map(|f| f.floating_ip_address),
        );
        names
    }
}

pub fn account() -> CloudAccount {
    CloudAccount::new("lab", "openstack")
        .with_credential("identity_endpoint", "http://keystone.test:5000/v2.0")
        .with_credential("username", "admin")
        .with_credential("password", "secret")
        .with_credential("tenant_id", "tenant-1")
}

pub fn demo_kube() -> Kube {
    Kube::new("demo", account(), "m1.small").with_openstack_config(OpenStackKubeConfig {
        region: "RegionOne".into(),
        ..Default::default()
    })
}
