//! In-memory OpenStack inventory
//!
//! Behaves like a small Neutron/Nova deployment: marker paging, 404 on unknown
//! ids, 409 when a resource is still in use. Used for dry runs and tests.

use crate::api::{
    Connector, CreateServer, CreateSubnet, FloatingIp, ListPage, Network, OpenStackApi, Router,
    Server, Subnet,
};
use crate::error::{OpenStackError, Result};
use async_trait::async_trait;
use kubeprov_cloud::{Credentials, Page};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Name of the external network every inventory starts with
pub const PUBLIC_NETWORK: &str = "public";

/// Floating IPs are handed out upwards from 203.0.113.1
const FLOATING_IP_BASE: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 0);

#[derive(Debug, Clone)]
struct RouterRecord {
    router: Router,
    gateway_network_id: String,
    interfaces: Vec<String>,
}

#[derive(Debug, Clone)]
struct FloatingIpRecord {
    floating_ip: FloatingIp,
    server_id: Option<String>,
}

#[derive(Debug, Clone)]
struct ServerRecord {
    server: Server,
    network_id: String,
    user_data: String,

    /// `get_server` calls left before the server turns ACTIVE
    build_polls: u32,
}

#[derive(Debug, Default)]
struct Inventory {
    networks: Vec<Network>,
    subnets: Vec<Subnet>,
    routers: Vec<RouterRecord>,
    floating_ips: Vec<FloatingIpRecord>,
    servers: Vec<ServerRecord>,
    next_id: u64,
    next_address: u32,
    failures: HashMap<String, u16>,
    list_calls: HashMap<&'static str, usize>,
    operations: Vec<String>,
}

impl Inventory {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Fail `op` when a failure was injected for it, otherwise log it
    fn call(&mut self, op: &str, target: &str) -> Result<()> {
        let injected = self
            .failures
            .get(op)
            .or_else(|| self.failures.get(&format!("{} {}", op, target)));
        if let Some(status) = injected {
            return Err(OpenStackError::Http {
                method: "MEMORY".into(),
                url: format!("{}/{}", op, target),
                status: *status,
                message: format!("injected failure on {}", op),
            });
        }
        self.operations.push(format!("{} {}", op, target));
        Ok(())
    }
}

fn conflict(op: &str, target: &str, reason: &str) -> OpenStackError {
    OpenStackError::Http {
        method: "MEMORY".into(),
        url: format!("{}/{}", op, target),
        status: 409,
        message: reason.to_string(),
    }
}

fn page<T: Clone>(
    items: &[T],
    id: impl Fn(&T) -> &str,
    marker: Option<String>,
    page_size: usize,
) -> Result<ListPage<T>> {
    let start = match marker {
        Some(marker) => {
            items
                .iter()
                .position(|item| id(item) == marker)
                .ok_or_else(|| OpenStackError::Http {
                    method: "MEMORY".into(),
                    url: format!("list?marker={}", marker),
                    status: 400,
                    message: "marker not found".into(),
                })?
                + 1
        }
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let slice = items[start.min(end)..end].to_vec();
    let next = if end < items.len() {
        slice.last().map(|item| id(item).to_string())
    } else {
        None
    };
    Ok(Page::new(slice, next))
}

/// Thread-safe in-memory OpenStack tenant
#[derive(Debug)]
pub struct InMemoryOpenStack {
    inventory: Mutex<Inventory>,
    page_size: usize,
    build_polls: u32,
}

impl Default for InMemoryOpenStack {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOpenStack {
    /// Inventory holding only the external network [`PUBLIC_NETWORK`]
    pub fn new() -> Self {
        let mut inventory = Inventory::default();
        let id = inventory.id("net");
        inventory.networks.push(Network {
            id,
            name: PUBLIC_NETWORK.to_string(),
            external: true,
            subnets: Vec::new(),
        });
        Self {
            inventory: Mutex::new(inventory),
            page_size: 100,
            build_polls: 0,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Servers report BUILD for this many `get_server` calls
    pub fn with_build_polls(mut self, polls: u32) -> Self {
        self.build_polls = polls;
        self
    }

    /// Make every later call of `op` fail with `status`.
    ///
    /// `op` is either an operation ("create_router") or an operation and its
    /// target ("create_server demo-minion").
    pub fn fail_on(&self, op: &str, status: u16) {
        self.lock().failures.insert(op.to_string(), status);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Add a server that does not belong to any cluster
    pub fn seed_server(&self, name: &str, metadata: HashMap<String, String>) -> Server {
        let mut inventory = self.lock();
        let id = inventory.id("srv");
        let server = Server {
            id,
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            metadata,
        };
        inventory.servers.push(ServerRecord {
            server: server.clone(),
            network_id: String::new(),
            user_data: String::new(),
            build_polls: 0,
        });
        server
    }

    pub fn networks(&self) -> Vec<Network> {
        self.lock().networks.clone()
    }

    pub fn subnets(&self) -> Vec<Subnet> {
        self.lock().subnets.clone()
    }

    pub fn routers(&self) -> Vec<Router> {
        self.lock().routers.iter().map(|r| r.router.clone()).collect()
    }

    pub fn floating_ips(&self) -> Vec<FloatingIp> {
        self.lock()
            .floating_ips
            .iter()
            .map(|f| f.floating_ip.clone())
            .collect()
    }

    pub fn servers(&self) -> Vec<Server> {
        self.lock().servers.iter().map(|s| s.server.clone()).collect()
    }

    /// Server the floating IP `address` is associated with
    pub fn floating_ip_server(&self, address: &str) -> Option<String> {
        self.lock()
            .floating_ips
            .iter()
            .find(|f| f.floating_ip.floating_ip_address == address)
            .and_then(|f| f.server_id.clone())
    }

    /// Subnets attached to the named router
    pub fn router_interfaces(&self, router_name: &str) -> Vec<String> {
        self.lock()
            .routers
            .iter()
            .find(|r| r.router.name == router_name)
            .map(|r| r.interfaces.clone())
            .unwrap_or_default()
    }

    /// External network the named router uses as gateway
    pub fn router_gateway(&self, router_name: &str) -> Option<String> {
        self.lock()
            .routers
            .iter()
            .find(|r| r.router.name == router_name)
            .map(|r| r.gateway_network_id.clone())
    }

    /// Boot payload the named server was created with
    pub fn user_data(&self, server_name: &str) -> Option<String> {
        self.lock()
            .servers
            .iter()
            .find(|s| s.server.name == server_name)
            .map(|s| s.user_data.clone())
    }

    /// Number of listing pages fetched for `kind` ("networks", "servers", ...)
    pub fn list_calls(&self, kind: &str) -> usize {
        self.lock().list_calls.get(kind).copied().unwrap_or(0)
    }

    /// Successful mutating calls, in order (`"<op> <target>"`)
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inventory> {
        self.inventory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn list<T: Clone>(
        &self,
        kind: &'static str,
        marker: Option<String>,
        select: impl FnOnce(&Inventory) -> Vec<T>,
        id: impl Fn(&T) -> &str,
    ) -> Result<ListPage<T>> {
        let mut inventory = self.lock();
        if let Some(status) = inventory.failures.get(&format!("list_{}", kind)) {
            return Err(OpenStackError::Http {
                method: "MEMORY".into(),
                url: kind.to_string(),
                status: *status,
                message: format!("injected failure on list_{}", kind),
            });
        }
        *inventory.list_calls.entry(kind).or_default() += 1;
        let items = select(&*inventory);
        page(&items, id, marker, self.page_size)
    }
}

#[async_trait]
impl OpenStackApi for InMemoryOpenStack {
    async fn list_networks(&self, marker: Option<String>) -> Result<ListPage<Network>> {
        self.list("networks", marker, |inv| inv.networks.clone(), |n| &n.id)
    }

    async fn create_network(&self, name: &str) -> Result<Network> {
        let mut inventory = self.lock();
        inventory.call("create_network", name)?;
        let network = Network {
            id: inventory.id("net"),
            name: name.to_string(),
            external: false,
            subnets: Vec::new(),
        };
        inventory.networks.push(network.clone());
        Ok(network)
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .networks
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| OpenStackError::NotFound(format!("network {}", id)))?;
        if inventory.subnets.iter().any(|s| s.network_id == id)
            || inventory.servers.iter().any(|s| s.network_id == id)
        {
            return Err(conflict("delete_network", id, "network has ports in use"));
        }
        inventory.call("delete_network", id)?;
        inventory.networks.remove(index);
        Ok(())
    }

    async fn list_subnets(&self, marker: Option<String>) -> Result<ListPage<Subnet>> {
        self.list("subnets", marker, |inv| inv.subnets.clone(), |s| &s.id)
    }

    async fn create_subnet(&self, subnet: &CreateSubnet) -> Result<Subnet> {
        let mut inventory = self.lock();
        if !inventory.networks.iter().any(|n| n.id == subnet.network_id) {
            return Err(OpenStackError::NotFound(format!("network {}", subnet.network_id)));
        }
        inventory.call("create_subnet", &subnet.name)?;
        let created = Subnet {
            id: inventory.id("subnet"),
            name: subnet.name.clone(),
            network_id: subnet.network_id.clone(),
            cidr: subnet.cidr.clone(),
        };
        if let Some(network) = inventory
            .networks
            .iter_mut()
            .find(|n| n.id == subnet.network_id)
        {
            network.subnets.push(created.id.clone());
        }
        inventory.subnets.push(created.clone());
        Ok(created)
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .subnets
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| OpenStackError::NotFound(format!("subnet {}", id)))?;
        if inventory
            .routers
            .iter()
            .any(|r| r.interfaces.iter().any(|s| s == id))
        {
            return Err(conflict("delete_subnet", id, "subnet has a router interface"));
        }
        inventory.call("delete_subnet", id)?;
        let subnet = inventory.subnets.remove(index);
        for network in inventory.networks.iter_mut() {
            network.subnets.retain(|s| *s != subnet.id);
        }
        Ok(())
    }

    async fn list_routers(&self, marker: Option<String>) -> Result<ListPage<Router>> {
        self.list(
            "routers",
            marker,
            |inv| inv.routers.iter().map(|r| r.router.clone()).collect(),
            |r| &r.id,
        )
    }

    async fn create_router(&self, name: &str, external_network_id: &str) -> Result<Router> {
        let mut inventory = self.lock();
        if !inventory
            .networks
            .iter()
            .any(|n| n.id == external_network_id && n.external)
        {
            return Err(OpenStackError::NotFound(format!(
                "external network {}",
                external_network_id
            )));
        }
        inventory.call("create_router", name)?;
        let router = Router {
            id: inventory.id("router"),
            name: name.to_string(),
        };
        inventory.routers.push(RouterRecord {
            router: router.clone(),
            gateway_network_id: external_network_id.to_string(),
            interfaces: Vec::new(),
        });
        Ok(router)
    }

    async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        let mut inventory = self.lock();
        if !inventory.subnets.iter().any(|s| s.id == subnet_id) {
            return Err(OpenStackError::NotFound(format!("subnet {}", subnet_id)));
        }
        let index = inventory
            .routers
            .iter()
            .position(|r| r.router.id == router_id)
            .ok_or_else(|| OpenStackError::NotFound(format!("router {}", router_id)))?;
        inventory.call("add_router_interface", router_id)?;
        inventory.routers[index].interfaces.push(subnet_id.to_string());
        Ok(())
    }

    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .routers
            .iter()
            .position(|r| r.router.id == router_id)
            .ok_or_else(|| OpenStackError::NotFound(format!("router {}", router_id)))?;
        if !inventory.routers[index]
            .interfaces
            .iter()
            .any(|s| s == subnet_id)
        {
            return Err(OpenStackError::NotFound(format!(
                "interface {} on router {}",
                subnet_id, router_id
            )));
        }
        inventory.call("remove_router_interface", router_id)?;
        inventory.routers[index].interfaces.retain(|s| s != subnet_id);
        Ok(())
    }

    async fn delete_router(&self, id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .routers
            .iter()
            .position(|r| r.router.id == id)
            .ok_or_else(|| OpenStackError::NotFound(format!("router {}", id)))?;
        if !inventory.routers[index].interfaces.is_empty() {
            return Err(conflict("delete_router", id, "router still has interfaces"));
        }
        inventory.call("delete_router", id)?;
        inventory.routers.remove(index);
        Ok(())
    }

    async fn list_floating_ips(&self, marker: Option<String>) -> Result<ListPage<FloatingIp>> {
        self.list(
            "floatingips",
            marker,
            |inv| inv.floating_ips.iter().map(|f| f.floating_ip.clone()).collect(),
            |f| &f.id,
        )
    }

    async fn create_floating_ip(&self, external_network_id: &str) -> Result<FloatingIp> {
        let mut inventory = self.lock();
        if !inventory
            .networks
            .iter()
            .any(|n| n.id == external_network_id && n.external)
        {
            return Err(OpenStackError::NotFound(format!(
                "external network {}",
                external_network_id
            )));
        }
        inventory.call("create_floating_ip", external_network_id)?;
        inventory.next_address += 1;
        let address = Ipv4Addr::from(u32::from(FLOATING_IP_BASE) + inventory.next_address);
        let floating_ip = FloatingIp {
            id: inventory.id("fip"),
            floating_ip_address: address.to_string(),
            floating_network_id: external_network_id.to_string(),
        };
        inventory.floating_ips.push(FloatingIpRecord {
            floating_ip: floating_ip.clone(),
            server_id: None,
        });
        Ok(floating_ip)
    }

    async fn delete_floating_ip(&self, id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .floating_ips
            .iter()
            .position(|f| f.floating_ip.id == id)
            .ok_or_else(|| OpenStackError::NotFound(format!("floating IP {}", id)))?;
        inventory.call("delete_floating_ip", id)?;
        inventory.floating_ips.remove(index);
        Ok(())
    }

    async fn list_servers(&self, marker: Option<String>) -> Result<ListPage<Server>> {
        self.list(
            "servers",
            marker,
            |inv| inv.servers.iter().map(|s| s.server.clone()).collect(),
            |s| &s.id,
        )
    }

    async fn get_server(&self, id: &str) -> Result<Server> {
        let mut inventory = self.lock();
        let record = inventory
            .servers
            .iter_mut()
            .find(|s| s.server.id == id)
            .ok_or_else(|| OpenStackError::NotFound(format!("server {}", id)))?;
        if record.build_polls > 0 {
            record.build_polls -= 1;
            if record.build_polls == 0 {
                record.server.status = "ACTIVE".to_string();
            }
        }
        Ok(record.server.clone())
    }

    async fn create_server(&self, server: &CreateServer) -> Result<Server> {
        let mut inventory = self.lock();
        if !inventory.networks.iter().any(|n| n.id == server.network_id) {
            return Err(OpenStackError::NotFound(format!("network {}", server.network_id)));
        }
        inventory.call("create_server", &server.name)?;
        let created = Server {
            id: inventory.id("srv"),
            name: server.name.clone(),
            status: (if self.build_polls > 0 { "BUILD" } else { "ACTIVE" }).to_string(),
            metadata: server.metadata.clone(),
        };
        inventory.servers.push(ServerRecord {
            server: created.clone(),
            network_id: server.network_id.clone(),
            user_data: server.user_data.clone(),
            build_polls: self.build_polls,
        });
        Ok(created)
    }

    async fn associate_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        let mut inventory = self.lock();
        if !inventory.servers.iter().any(|s| s.server.id == server_id) {
            return Err(OpenStackError::NotFound(format!("server {}", server_id)));
        }
        let index = inventory
            .floating_ips
            .iter()
            .position(|f| f.floating_ip.floating_ip_address == address)
            .ok_or_else(|| OpenStackError::NotFound(format!("floating IP {}", address)))?;
        inventory.call("associate_floating_ip", server_id)?;
        inventory.floating_ips[index].server_id = Some(server_id.to_string());
        Ok(())
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .servers
            .iter()
            .position(|s| s.server.id == id)
            .ok_or_else(|| OpenStackError::NotFound(format!("server {}", id)))?;
        inventory.call("delete_server", id)?;
        inventory.servers.remove(index);
        for floating_ip in inventory.floating_ips.iter_mut() {
            if floating_ip.server_id.as_deref() == Some(id) {
                floating_ip.server_id = None;
            }
        }
        Ok(())
    }
}

/// Connector handing out one shared [`InMemoryOpenStack`]
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    api: Arc<InMemoryOpenStack>,
    password: Option<String>,
}

impl InMemoryConnector {
    pub fn new(api: Arc<InMemoryOpenStack>) -> Self {
        Self {
            api,
            password: None,
        }
    }

    /// Reject every password but this one
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
        _region: &str,
    ) -> Result<Arc<dyn OpenStackApi>> {
        for key in ["identity_endpoint", "username", "password", "tenant_id"] {
            if credentials.get(key).is_none_or(|v| v.is_empty()) {
                return Err(OpenStackError::MissingCredential(key));
            }
        }
        if let Some(expected) = &self.password {
            if credentials.get("password") != Some(expected) {
                return Err(OpenStackError::AuthenticationFailed(
                    "The request you have made requires authentication.".into(),
                ));
            }
        }
        Ok(self.api.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_marker_paging() {
        let api = InMemoryOpenStack::new().with_page_size(2);
        for i in 0..4 {
            api.create_network(&format!("net-{}", i)).await.unwrap();
        }

        let first = api.list_networks(None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let second = api.list_networks(first.next.clone()).await.unwrap();
        assert_eq!(second.items.len(), 2);
        let third = api.list_networks(second.next.clone()).await.unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.next.is_none());
        assert_eq!(api.list_calls("networks"), 3);
    }

    #[tokio::test]
    async fn test_in_use_resources_conflict() {
        let api = InMemoryOpenStack::new();
        let network = api.create_network("demo-network").await.unwrap();
        let subnet = api
            .create_subnet(&CreateSubnet {
                name: "demo-subnet".into(),
                network_id: network.id.clone(),
                cidr: "172.20.0.0/24".into(),
                ip_version: 4,
                dns_nameservers: vec![],
            })
            .await
            .unwrap();

        let err = api.delete_network(&network.id).await.unwrap_err();
        assert_eq!(err.status(), Some(409));

        api.delete_subnet(&subnet.id).await.unwrap();
        api.delete_network(&network.id).await.unwrap();

        let err = api.delete_network(&network.id).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_build_polls() {
        let api = InMemoryOpenStack::new().with_build_polls(2);
        let network = api.create_network("demo-network").await.unwrap();
        let server = api
            .create_server(&CreateServer {
                name: "demo-master".into(),
                flavor_name: "m1.small".into(),
                image_name: "ubuntu-16.04".into(),
                network_id: network.id,
                metadata: HashMap::new(),
                user_data: String::new(),
            })
            .await
            .unwrap();
        assert!(!server.is_active());

        assert!(!api.get_server(&server.id).await.unwrap().is_active());
        assert!(api.get_server(&server.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_connector_checks_password() {
        let api = Arc::new(InMemoryOpenStack::new());
        let connector = InMemoryConnector::new(api).with_password("secret");
        let mut credentials: Credentials = [
            ("identity_endpoint", "http://keystone:5000/v2.0"),
            ("username", "admin"),
            ("password", "secret"),
            ("tenant_id", "t-1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert!(connector.connect(&credentials, "").await.is_ok());

        credentials.insert("password".into(), "wrong".into());
        assert!(matches!(
            connector.connect(&credentials, "").await,
            Err(OpenStackError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_floating_ip_addresses_stay_unique() {
        let api = InMemoryOpenStack::new();
        let external = api.networks().into_iter().find(|n| n.external).unwrap();

        let mut addresses = std::collections::HashSet::new();
        for _ in 0..300 {
            let fip = api.create_floating_ip(&external.id).await.unwrap();
            assert!(addresses.insert(fip.floating_ip_address));
        }
        assert!(addresses.contains("203.0.113.1"));
        assert!(addresses.contains("203.0.114.44"));
    }
}
