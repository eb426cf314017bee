//! DigitalOcean API seam
//!
//! Listings are page-numbered (`page=N`); the cursor is the number of the
//! next page to fetch.

use crate::error::Result;
use async_trait::async_trait;
use kubeprov_cloud::{Credentials, Page};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Page-numbered listing
pub type NumberedPage<T> = Page<T, u32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,

    /// new, active, off or archive
    pub status: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub networks: DropletNetworks,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropletNetworks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkV4 {
    pub ip_address: String,

    #[serde(rename = "type")]
    pub kind: String,
}

impl Droplet {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn public_ipv4(&self) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|n| n.kind == "public")
            .map(|n| n.ip_address.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateDroplet {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub ssh_keys: Vec<String>,
    pub tags: Vec<String>,
    pub user_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVolume {
    pub id: String,
    pub name: String,
    pub size_gigabytes: u32,

    #[serde(default)]
    pub droplet_ids: Vec<u64>,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateVolume {
    pub name: String,
    pub size_gigabytes: u32,
    pub region: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub entry_protocol: String,
    pub entry_port: u16,
    pub target_protocol: String,
    pub target_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,

    /// Empty until the load balancer is provisioned
    #[serde(default)]
    pub ip: String,

    /// new, active or errored
    pub status: String,

    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub forwarding_rules: Vec<ForwardingRule>,
}

impl LoadBalancer {
    pub fn is_active(&self) -> bool {
        self.status == "active" && !self.ip.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateLoadBalancer {
    pub name: String,
    pub region: String,

    /// Droplets carrying this tag receive the traffic
    pub tag: String,

    pub forwarding_rules: Vec<ForwardingRule>,
}

#[async_trait]
pub trait DigitalOceanApi: Send + Sync {
    /// Cheapest authenticated call (`GET /account`)
    async fn account_status(&self) -> Result<()>;

    async fn list_droplets(&self, page: Option<u32>) -> Result<NumberedPage<Droplet>>;
    async fn get_droplet(&self, id: u64) -> Result<Droplet>;
    async fn create_droplet(&self, droplet: &CreateDroplet) -> Result<Droplet>;
    async fn delete_droplet(&self, id: u64) -> Result<()>;

    async fn create_tag(&self, name: &str) -> Result<()>;
    async fn delete_tag(&self, name: &str) -> Result<()>;

    async fn list_volumes(&self, page: Option<u32>) -> Result<NumberedPage<BlockVolume>>;
    async fn get_volume(&self, id: &str) -> Result<BlockVolume>;
    async fn create_volume(&self, volume: &CreateVolume) -> Result<BlockVolume>;
    async fn resize_volume(&self, id: &str, size_gigabytes: u32, region: &str) -> Result<()>;
    async fn delete_volume(&self, id: &str) -> Result<()>;

    async fn list_load_balancers(&self, page: Option<u32>) -> Result<NumberedPage<LoadBalancer>>;
    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer>;
    async fn create_load_balancer(&self, lb: &CreateLoadBalancer) -> Result<LoadBalancer>;
    async fn delete_load_balancer(&self, id: &str) -> Result<()>;
    async fn add_forwarding_rules(&self, id: &str, rules: &[ForwardingRule]) -> Result<()>;
    async fn remove_forwarding_rules(&self, id: &str, rules: &[ForwardingRule]) -> Result<()>;
}

/// Builds an API client from an account's credentials. No I/O.
pub trait Connector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn DigitalOceanApi>>;
}
