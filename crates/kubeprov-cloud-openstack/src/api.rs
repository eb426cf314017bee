//! OpenStack API seam
//!
//! The provider only talks to OpenStack through [`OpenStackApi`], so the same
//! recipes run against the HTTP client and the in-memory inventory. Listings
//! are marker-paged the way Neutron and Nova page them: the cursor is the id of
//! the last item of the previous page.

use crate::error::Result;
use async_trait::async_trait;
use kubeprov_cloud::{Credentials, Page};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Marker-paged listing
pub type ListPage<T> = Page<T, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,

    /// Whether this is a provider network usable as router gateway
    #[serde(rename = "router:external", default)]
    pub external: bool,

    #[serde(default)]
    pub subnets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub floating_ip_address: String,
    pub floating_network_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Server {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("ACTIVE")
    }

    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("ERROR")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSubnet {
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    pub ip_version: u8,
    pub dns_nameservers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateServer {
    pub name: String,
    pub flavor_name: String,
    pub image_name: String,
    pub network_id: String,
    pub metadata: HashMap<String, String>,

    /// Rendered cloud-config, sent base64 encoded
    pub user_data: String,
}

/// Networking (Neutron) and compute (Nova) calls used by the recipes
#[async_trait]
pub trait OpenStackApi: Send + Sync {
    async fn list_networks(&self, marker: Option<String>) -> Result<ListPage<Network>>;
    async fn create_network(&self, name: &str) -> Result<Network>;
    async fn delete_network(&self, id: &str) -> Result<()>;

    async fn list_subnets(&self, marker: Option<String>) -> Result<ListPage<Subnet>>;
    async fn create_subnet(&self, subnet: &CreateSubnet) -> Result<Subnet>;
    async fn delete_subnet(&self, id: &str) -> Result<()>;

    async fn list_routers(&self, marker: Option<String>) -> Result<ListPage<Router>>;
    async fn create_router(&self, name: &str, external_network_id: &str) -> Result<Router>;
    async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;
    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;
    async fn delete_router(&self, id: &str) -> Result<()>;

    async fn list_floating_ips(&self, marker: Option<String>) -> Result<ListPage<FloatingIp>>;
    async fn create_floating_ip(&self, external_network_id: &str) -> Result<FloatingIp>;
    async fn delete_floating_ip(&self, id: &str) -> Result<()>;

    async fn list_servers(&self, marker: Option<String>) -> Result<ListPage<Server>>;
    async fn get_server(&self, id: &str) -> Result<Server>;
    async fn create_server(&self, server: &CreateServer) -> Result<Server>;
    async fn associate_floating_ip(&self, server_id: &str, address: &str) -> Result<()>;
    async fn delete_server(&self, id: &str) -> Result<()>;
}

/// Authenticates an account and hands back a client bound to one region
#[async_trait]
pub trait Connector: Send + Sync {
    /// Fails when the credentials are rejected; `region` may be empty to
    /// accept the first endpoint the catalog lists.
    async fn connect(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<Arc<dyn OpenStackApi>>;
}
