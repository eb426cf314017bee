//! Operator-wide defaults for each backend

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All backend settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openstack: OpenStackSettings,
    pub digitalocean: DigitalOceanSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.openstack.validate()?;
        self.digitalocean.validate()
    }
}

/// How often to poll and when to give up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl PollSettings {
    pub const fn new(interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            interval_secs,
            timeout_secs,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(format!("{}: interval_secs must be > 0", name)));
        }
        if self.timeout_secs < self.interval_secs {
            return Err(ConfigError::Invalid(format!(
                "{}: timeout_secs must be at least interval_secs",
                name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenStackSettings {
    /// CIDR of the cluster subnet
    pub subnet_cidr: String,

    pub image_name: String,

    /// External network to use; the first external network when unset
    pub public_network_name: Option<String>,

    pub dns_nameservers: Vec<String>,

    /// Items requested per listing page
    pub page_size: u32,

    pub server_active: PollSettings,

    pub server_deleted: PollSettings,
}

impl Default for OpenStackSettings {
    fn default() -> Self {
        Self {
            subnet_cidr: "172.20.0.0/24".to_string(),
            image_name: "ubuntu-16.04".to_string(),
            public_network_name: None,
            dns_nameservers: vec!["8.8.8.8".to_string()],
            page_size: 100,
            server_active: PollSettings::new(5, 300),
            server_deleted: PollSettings::new(5, 300),
        }
    }
}

impl OpenStackSettings {
    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("openstack.page_size must be > 0".into()));
        }
        self.server_active.validate("openstack.server_active")?;
        self.server_deleted.validate("openstack.server_deleted")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitalOceanSettings {
    pub api_base: String,

    pub image: String,

    pub page_size: u32,

    pub droplet_active: PollSettings,

    pub droplet_deleted: PollSettings,

    pub volume_available: PollSettings,

    pub load_balancer_active: PollSettings,
}

impl Default for DigitalOceanSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.digitalocean.com/v2".to_string(),
            image: "ubuntu-16-04-x64".to_string(),
            page_size: 50,
            droplet_active: PollSettings::new(5, 300),
            droplet_deleted: PollSettings::new(5, 300),
            volume_available: PollSettings::new(2, 120),
            load_balancer_active: PollSettings::new(10, 600),
        }
    }
}

impl DigitalOceanSettings {
    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("digitalocean.page_size must be > 0".into()));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "digitalocean.api_base is not an http(s) URL: {}",
                self.api_base
            )));
        }
        self.droplet_active.validate("digitalocean.droplet_active")?;
        self.droplet_deleted.validate("digitalocean.droplet_deleted")?;
        self.volume_available.validate("digitalocean.volume_available")?;
        self.load_balancer_active
            .validate("digitalocean.load_balancer_active")
    }
}
