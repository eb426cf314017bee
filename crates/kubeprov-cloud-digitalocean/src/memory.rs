//! In-memory DigitalOcean account
//!
//! Page-numbered listings, 404 on unknown ids, 422 on invalid requests.
//! Droplets and load balancers can be made to stay in `new` for a number of
//! polls, volumes to stay unreadable. Used for dry runs and tests.

use crate::api::{
    BlockVolume, Connector, CreateDroplet, CreateLoadBalancer, CreateVolume, DigitalOceanApi,
    Droplet, DropletNetworks, ForwardingRule, LoadBalancer, NetworkV4, NumberedPage,
};
use crate::error::{DigitalOceanError, Result};
use async_trait::async_trait;
use kubeprov_cloud::{Credentials, Page};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

const DROPLET_ADDRESSES: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 0);
const LOAD_BALANCER_ADDRESSES: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 0);

#[derive(Debug, Clone)]
struct DropletRecord {
    droplet: Droplet,
    region: String,
    size: String,
    user_data: String,

    /// Assigned on creation, exposed once the droplet is active
    address: String,

    /// `get_droplet` calls left before the droplet turns active
    build_polls: u32,
}

#[derive(Debug, Clone)]
struct VolumeRecord {
    volume: BlockVolume,
    region: String,

    /// `get_volume` calls answered with 404 before the volume is readable
    settle_polls: u32,
}

#[derive(Debug, Clone)]
struct LoadBalancerRecord {
    load_balancer: LoadBalancer,
    address: String,
    build_polls: u32,
}

#[derive(Debug, Default)]
struct Inventory {
    droplets: Vec<DropletRecord>,
    tags: Vec<String>,
    volumes: Vec<VolumeRecord>,
    load_balancers: Vec<LoadBalancerRecord>,
    next_id: u64,
    next_address: u32,
    failures: HashMap<String, u16>,
    list_calls: HashMap<&'static str, usize>,
    operations: Vec<String>,
}

impl Inventory {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn address(&mut self, base: Ipv4Addr) -> String {
        self.next_address += 1;
        Ipv4Addr::from(u32::from(base) + self.next_address).to_string()
    }

    /// Fail `op` when a failure was injected for it, otherwise log it
    fn call(&mut self, op: &str, target: &str) -> Result<()> {
        let injected = self
            .failures
            .get(op)
            .or_else(|| self.failures.get(&format!("{} {}", op, target)));
        if let Some(status) = injected {
            return Err(http_error(op, target, *status, &format!("injected failure on {}", op)));
        }
        self.operations.push(format!("{} {}", op, target));
        Ok(())
    }
}

fn http_error(op: &str, target: &str, status: u16, message: &str) -> DigitalOceanError {
    DigitalOceanError::Http {
        method: "MEMORY".into(),
        url: format!("{}/{}", op, target),
        status,
        message: message.to_string(),
    }
}

fn page<T: Clone>(items: &[T], page: Option<u32>, per_page: usize) -> NumberedPage<T> {
    let number = page.unwrap_or(1).max(1);
    let start = (number as usize - 1) * per_page;
    let end = (start + per_page).min(items.len());
    let slice = items[start.min(end)..end].to_vec();
    let next = (end < items.len()).then_some(number + 1);
    Page::new(slice, next)
}

/// Thread-safe in-memory DigitalOcean account
#[derive(Debug)]
pub struct InMemoryDigitalOcean {
    inventory: Mutex<Inventory>,
    page_size: usize,
    build_polls: u32,
    settle_polls: u32,
}

impl Default for InMemoryDigitalOcean {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDigitalOcean {
    pub fn new() -> Self {
        Self {
            inventory: Mutex::new(Inventory::default()),
            page_size: 50,
            build_polls: 0,
            settle_polls: 0,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Droplets and load balancers report `new` for this many polls
    pub fn with_build_polls(mut self, polls: u32) -> Self {
        self.build_polls = polls;
        self
    }

    /// Volumes answer 404 for this many `get_volume` calls
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    /// Make every later call of `op` fail with `status`.
    ///
    /// `op` is either an operation ("create_tag") or an operation and its
    /// target ("create_droplet demo-minion").
    pub fn fail_on(&self, op: &str, status: u16) {
        self.lock().failures.insert(op.to_string(), status);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Add an active droplet that was not created through the API
    pub fn seed_droplet(&self, name: &str, tags: &[&str]) -> Droplet {
        let mut inventory = self.lock();
        let id = inventory.id();
        let address = inventory.address(DROPLET_ADDRESSES);
        let droplet = Droplet {
            id,
            name: name.to_string(),
            status: "active".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            networks: public_network(&address),
        };
        inventory.droplets.push(DropletRecord {
            droplet: droplet.clone(),
            region: String::new(),
            size: String::new(),
            user_data: String::new(),
            address,
            build_polls: 0,
        });
        droplet
    }

    pub fn droplets(&self) -> Vec<Droplet> {
        self.lock().droplets.iter().map(|d| d.droplet.clone()).collect()
    }

    pub fn tags(&self) -> Vec<String> {
        self.lock().tags.clone()
    }

    pub fn volumes(&self) -> Vec<BlockVolume> {
        self.lock().volumes.iter().map(|v| v.volume.clone()).collect()
    }

    pub fn load_balancers(&self) -> Vec<LoadBalancer> {
        self.lock()
            .load_balancers
            .iter()
            .map(|l| l.load_balancer.clone())
            .collect()
    }

    /// Boot payload the named droplet was created with
    pub fn user_data(&self, droplet_name: &str) -> Option<String> {
        self.lock()
            .droplets
            .iter()
            .find(|d| d.droplet.name == droplet_name)
            .map(|d| d.user_data.clone())
    }

    /// Region and size the named droplet was created with
    pub fn droplet_placement(&self, droplet_name: &str) -> Option<(String, String)> {
        self.lock()
            .droplets
            .iter()
            .find(|d| d.droplet.name == droplet_name)
            .map(|d| (d.region.clone(), d.size.clone()))
    }

    /// Region the named volume was created in
    pub fn volume_region(&self, volume_name: &str) -> Option<String> {
        self.lock()
            .volumes
            .iter()
            .find(|v| v.volume.name == volume_name)
            .map(|v| v.region.clone())
    }

    /// Number of listing pages fetched for `kind` ("droplets", "volumes", ...)
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
        number: Option<u32>,
        select: impl FnOnce(&Inventory) -> Vec<T>,
    ) -> Result<NumberedPage<T>> {
        let mut inventory = self.lock();
        if let Some(status) = inventory.failures.get(&format!("list_{}", kind)) {
            return Err(http_error(
                &format!("list_{}", kind),
                kind,
                *status,
                "injected failure",
            ));
        }
        *inventory.list_calls.entry(kind).or_default() += 1;
        let items = select(&*inventory);
        Ok(page(&items, number, self.page_size))
    }
}

fn public_network(address: &str) -> DropletNetworks {
    DropletNetworks {
        v4: vec![NetworkV4 {
            ip_address: address.to_string(),
            kind: "public".to_string(),
        }],
    }
}

#[async_trait]
impl DigitalOceanApi for InMemoryDigitalOcean {
    async fn account_status(&self) -> Result<()> {
        Ok(())
    }

    async fn list_droplets(&self, page: Option<u32>) -> Result<NumberedPage<Droplet>> {
        self.list("droplets", page, |inv| {
            inv.droplets.iter().map(|d| d.droplet.clone()).collect()
        })
    }

    async fn get_droplet(&self, id: u64) -> Result<Droplet> {
        let mut inventory = self.lock();
        let record = inventory
            .droplets
            .iter_mut()
            .find(|d| d.droplet.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("droplet {}", id)))?;
        if record.build_polls > 0 {
            record.build_polls -= 1;
            if record.build_polls == 0 {
                record.droplet.status = "active".to_string();
                record.droplet.networks = public_network(&record.address);
            }
        }
        Ok(record.droplet.clone())
    }

    async fn create_droplet(&self, droplet: &CreateDroplet) -> Result<Droplet> {
        let mut inventory = self.lock();
        if droplet.region.is_empty() || droplet.size.is_empty() {
            return Err(http_error(
                "create_droplet",
                &droplet.name,
                422,
                "region and size are required",
            ));
        }
        inventory.call("create_droplet", &droplet.name)?;
        let id = inventory.id();
        let address = inventory.address(DROPLET_ADDRESSES);
        let building = self.build_polls > 0;
        let created = Droplet {
            id,
            name: droplet.name.clone(),
            status: (if building { "new" } else { "active" }).to_string(),
            tags: droplet.tags.clone(),
            networks: if building {
                DropletNetworks::default()
            } else {
                public_network(&address)
            },
        };
        inventory.droplets.push(DropletRecord {
            droplet: created.clone(),
            region: droplet.region.clone(),
            size: droplet.size.clone(),
            user_data: droplet.user_data.clone(),
            address,
            build_polls: self.build_polls,
        });
        Ok(created)
    }

    async fn delete_droplet(&self, id: u64) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .droplets
            .iter()
            .position(|d| d.droplet.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("droplet {}", id)))?;
        inventory.call("delete_droplet", &id.to_string())?;
        inventory.droplets.remove(index);
        for record in inventory.volumes.iter_mut() {
            record.volume.droplet_ids.retain(|d| *d != id);
        }
        Ok(())
    }

    /// Creating an existing tag succeeds without a change
    async fn create_tag(&self, name: &str) -> Result<()> {
        let mut inventory = self.lock();
        if inventory.tags.iter().any(|t| t == name) {
            return Ok(());
        }
        inventory.call("create_tag", name)?;
        inventory.tags.push(name.to_string());
        Ok(())
    }

    async fn delete_tag(&self, name: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .tags
            .iter()
            .position(|t| t == name)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("tag {}", name)))?;
        inventory.call("delete_tag", name)?;
        inventory.tags.remove(index);
        for record in inventory.droplets.iter_mut() {
            record.droplet.tags.retain(|t| t != name);
        }
        Ok(())
    }

    async fn list_volumes(&self, page: Option<u32>) -> Result<NumberedPage<BlockVolume>> {
        self.list("volumes", page, |inv| {
            inv.volumes.iter().map(|v| v.volume.clone()).collect()
        })
    }

    async fn get_volume(&self, id: &str) -> Result<BlockVolume> {
        let mut inventory = self.lock();
        let record = inventory
            .volumes
            .iter_mut()
            .find(|v| v.volume.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("volume {}", id)))?;
        if record.settle_polls > 0 {
            record.settle_polls -= 1;
            return Err(DigitalOceanError::NotFound(format!("volume {}", id)));
        }
        Ok(record.volume.clone())
    }

    async fn create_volume(&self, volume: &CreateVolume) -> Result<BlockVolume> {
        let mut inventory = self.lock();
        if volume.size_gigabytes == 0 {
            return Err(http_error("create_volume", &volume.name, 422, "size must be positive"));
        }
        if inventory.volumes.iter().any(|v| v.volume.name == volume.name) {
            return Err(http_error(
                "create_volume",
                &volume.name,
                409,
                "a volume with that name already exists",
            ));
        }
        inventory.call("create_volume", &volume.name)?;
        let id = format!("vol-{}", inventory.id());
        let created = BlockVolume {
            id,
            name: volume.name.clone(),
            size_gigabytes: volume.size_gigabytes,
            droplet_ids: Vec::new(),
            tags: volume.tags.clone(),
        };
        inventory.volumes.push(VolumeRecord {
            volume: created.clone(),
            region: volume.region.clone(),
            settle_polls: self.settle_polls,
        });
        Ok(created)
    }

    async fn resize_volume(&self, id: &str, size_gigabytes: u32, region: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .volumes
            .iter()
            .position(|v| v.volume.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("volume {}", id)))?;
        let record = &inventory.volumes[index];
        if record.region != region {
            return Err(http_error("resize_volume", id, 422, "region does not match"));
        }
        if size_gigabytes <= record.volume.size_gigabytes {
            return Err(http_error("resize_volume", id, 422, "volumes can only grow"));
        }
        inventory.call("resize_volume", id)?;
        inventory.volumes[index].volume.size_gigabytes = size_gigabytes;
        Ok(())
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .volumes
            .iter()
            .position(|v| v.volume.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("volume {}", id)))?;
        if !inventory.volumes[index].volume.droplet_ids.is_empty() {
            return Err(http_error("delete_volume", id, 409, "volume is attached"));
        }
        inventory.call("delete_volume", id)?;
        inventory.volumes.remove(index);
        Ok(())
    }

    async fn list_load_balancers(&self, page: Option<u32>) -> Result<NumberedPage<LoadBalancer>> {
        self.list("load_balancers", page, |inv| {
            inv.load_balancers
                .iter()
                .map(|l| l.load_balancer.clone())
                .collect()
        })
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
        let mut inventory = self.lock();
        let record = inventory
            .load_balancers
            .iter_mut()
            .find(|l| l.load_balancer.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("load balancer {}", id)))?;
        if record.build_polls > 0 {
            record.build_polls -= 1;
            if record.build_polls == 0 {
                record.load_balancer.status = "active".to_string();
                record.load_balancer.ip = record.address.clone();
            }
        }
        Ok(record.load_balancer.clone())
    }

    async fn create_load_balancer(&self, lb: &CreateLoadBalancer) -> Result<LoadBalancer> {
        let mut inventory = self.lock();
        if lb.forwarding_rules.is_empty() {
            return Err(http_error(
                "create_load_balancer",
                &lb.name,
                422,
                "at least one forwarding rule is required",
            ));
        }
        inventory.call("create_load_balancer", &lb.name)?;
        let id = format!("lb-{}", inventory.id());
        let address = inventory.address(LOAD_BALANCER_ADDRESSES);
        let building = self.build_polls > 0;
        let created = LoadBalancer {
            id,
            name: lb.name.clone(),
            ip: if building { String::new() } else { address.clone() },
            status: (if building { "new" } else { "active" }).to_string(),
            tag: lb.tag.clone(),
            forwarding_rules: lb.forwarding_rules.clone(),
        };
        inventory.load_balancers.push(LoadBalancerRecord {
            load_balancer: created.clone(),
            address,
            build_polls: self.build_polls,
        });
        Ok(created)
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .load_balancers
            .iter()
            .position(|l| l.load_balancer.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("load balancer {}", id)))?;
        inventory.call("delete_load_balancer", id)?;
        inventory.load_balancers.remove(index);
        Ok(())
    }

    async fn add_forwarding_rules(&self, id: &str, rules: &[ForwardingRule]) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .load_balancers
            .iter()
            .position(|l| l.load_balancer.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("load balancer {}", id)))?;
        let existing = &inventory.load_balancers[index].load_balancer.forwarding_rules;
        if rules
            .iter()
            .any(|rule| existing.iter().any(|r| r.entry_port == rule.entry_port))
        {
            return Err(http_error(
                "add_forwarding_rules",
                id,
                422,
                "entry port already in use",
            ));
        }
        inventory.call("add_forwarding_rules", id)?;
        inventory.load_balancers[index]
            .load_balancer
            .forwarding_rules
            .extend(rules.iter().cloned());
        Ok(())
    }

    async fn remove_forwarding_rules(&self, id: &str, rules: &[ForwardingRule]) -> Result<()> {
        let mut inventory = self.lock();
        let index = inventory
            .load_balancers
            .iter()
            .position(|l| l.load_balancer.id == id)
            .ok_or_else(|| DigitalOceanError::NotFound(format!("load balancer {}", id)))?;
        let remaining = inventory.load_balancers[index]
            .load_balancer
            .forwarding_rules
            .iter()
            .filter(|r| !rules.contains(r))
            .count();
        if remaining == 0 {
            return Err(http_error(
                "remove_forwarding_rules",
                id,
                422,
                "a load balancer needs at least one forwarding rule",
            ));
        }
        inventory.call("remove_forwarding_rules", id)?;
        inventory.load_balancers[index]
            .load_balancer
            .forwarding_rules
            .retain(|r| !rules.contains(r));
        Ok(())
    }
}

/// Connector handing out one shared [`InMemoryDigitalOcean`]
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    api: Arc<InMemoryDigitalOcean>,
    token: Option<String>,
}

impl InMemoryConnector {
    pub fn new(api: Arc<InMemoryDigitalOcean>) -> Self {
        Self { api, token: None }
    }

    /// Reject every token but this one
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl Connector for InMemoryConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn DigitalOceanApi>> {
        let token = credentials
            .get("token")
            .filter(|t| !t.is_empty())
            .ok_or(DigitalOceanError::MissingToken)?;
        if self.token.as_ref().is_some_and(|expected| expected != token) {
            return Err(http_error("account", "", 401, "Unable to authenticate you"));
        }
        Ok(self.api.clone())
    }
}
