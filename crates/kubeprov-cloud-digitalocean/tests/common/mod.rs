use kubeprov_cloud::{CloudAccount, DigitalOceanKubeConfig, Kube};
use kubeprov_cloud_digitalocean::{DigitalOceanProvider, InMemoryConnector, InMemoryDigitalOcean};
use kubeprov_config::DigitalOceanSettings;
use std::sync::Arc;

pub const TOKEN: &str = "dop_v1_test";

pub struct TestCloud {
    pub api: Arc<InMemoryDigitalOcean>,
    pub provider: DigitalOceanProvider,
}

impl TestCloud {
    pub fn new() -> Self {
        Self::with_api(InMemoryDigitalOcean::new())
    }

    pub fn with_api(api: InMemoryDigitalOcean) -> Self {
        let api = Arc::new(api);
        let connector = InMemoryConnector::new(api.clone()).with_token(TOKEN);
        let settings = DigitalOceanSettings::default();
        let provider = DigitalOceanProvider::new(Arc::new(connector), settings).unwrap();
        Self { api, provider }
    }

    /// Names of every droplet, volume and load balancer left in the account
    #[allow(dead_code)]
    pub fn leftovers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.api.droplets().into_iter().map(|d| d.name).collect();
        names.extend(self.api.volumes().into_iter().map(|v| v.name));
        names.extend(self.api.load_balancers().into_iter().map(|l| l.name));
        names
    }
}

pub fn account() -> CloudAccount {
    CloudAccount::new("do", "digitalocean").with_credential("token", TOKEN)
}

pub fn demo_kube() -> Kube {
    cluster_kube("demo")
}

#[allow(dead_code)]
pub fn cluster_kube(name: &str) -> Kube {
    Kube::new(name, account(), "s-2vcpu-4gb").with_digitalocean_config(DigitalOceanKubeConfig {
        region: "nyc3".into(),
        ..Default::default()
    })
}
