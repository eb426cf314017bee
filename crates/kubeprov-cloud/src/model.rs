//! Domain records handed to providers
//!
//! These are the cluster, node, volume and entrypoint records owned by the
//! caller. Providers read their configuration and write back the fields they
//! discover (public addresses, provider ids).

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Provider-specific credential key/value pairs
pub type Credentials = HashMap<String, String>;

/// The closed set of supported cloud backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenStack,
    DigitalOcean,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenStack, ProviderKind::DigitalOcean];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenStack => "openstack",
            ProviderKind::DigitalOcean => "digitalocean",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CloudError::UnknownProvider(s.to_string()))
    }
}

/// Credentials plus the provider they belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudAccount {
    /// Assigned by the account store on creation
    #[serde(default)]
    pub id: Option<i64>,

    pub name: String,

    /// Provider discriminator, parsed into [`ProviderKind`] on dispatch
    pub provider: String,

    #[serde(default)]
    pub credentials: Credentials,
}

impl CloudAccount {
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            provider: provider.into(),
            credentials: Credentials::new(),
        }
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials.get(key).map(String::as_str)
    }

    /// Credential that must be present for the provider to authenticate
    pub fn require_credential(&self, key: &str) -> Result<&str> {
        self.credential(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloudError::Validation(format!("missing credential: {}", key)))
    }

    pub fn provider_kind(&self) -> Result<ProviderKind> {
        self.provider.parse()
    }
}

/// Role of a compute instance within a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    #[default]
    Minion,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Minion => "minion",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenStack settings attached to a cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenStackKubeConfig {
    /// Region used to pick service endpoints; empty means the first one listed
    #[serde(default)]
    pub region: String,

    /// Overrides the operator-wide subnet CIDR
    #[serde(default)]
    pub subnet_cidr: Option<String>,

    /// Overrides the operator-wide image
    #[serde(default)]
    pub image_name: Option<String>,

    /// External network used as router gateway and floating IP pool
    #[serde(default)]
    pub public_network_name: Option<String>,
}

/// DigitalOcean settings attached to a cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigitalOceanKubeConfig {
    pub region: String,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub ssh_key_fingerprints: Vec<String>,
}

/// A Kubernetes cluster and the account it is provisioned with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kube {
    pub name: String,

    pub cloud_account: CloudAccount,

    pub master_node_size: String,

    /// Sizes of the minions created with the cluster
    #[serde(default)]
    pub node_sizes: Vec<String>,

    #[serde(default)]
    pub openstack_config: Option<OpenStackKubeConfig>,

    #[serde(default)]
    pub digitalocean_config: Option<DigitalOceanKubeConfig>,

    /// Filled in by cluster creation
    #[serde(default)]
    pub master_public_ip: Option<String>,
}

impl Kube {
    pub fn new(
        name: impl Into<String>,
        cloud_account: CloudAccount,
        master_node_size: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cloud_account,
            master_node_size: master_node_size.into(),
            node_sizes: Vec::new(),
            openstack_config: None,
            digitalocean_config: None,
            master_public_ip: None,
        }
    }

    pub fn with_node_sizes<I, S>(mut self, sizes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_sizes = sizes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_openstack_config(mut self, config: OpenStackKubeConfig) -> Self {
        self.openstack_config = Some(config);
        self
    }

    pub fn with_digitalocean_config(mut self, config: DigitalOceanKubeConfig) -> Self {
        self.digitalocean_config = Some(config);
        self
    }

    /// Minion sizes to create; a cluster always gets at least one minion,
    /// sized like the master when nothing is configured.
    pub fn minion_sizes(&self) -> Vec<&str> {
        if self.node_sizes.is_empty() {
            vec![self.master_node_size.as_str()]
        } else {
            self.node_sizes.iter().map(String::as_str).collect()
        }
    }
}

/// A single compute instance added to an existing cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    pub size: String,

    #[serde(default)]
    pub role: NodeRole,

    #[serde(default)]
    pub provider_id: Option<String>,

    #[serde(default)]
    pub public_ip: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
            role: NodeRole::Minion,
            provider_id: None,
            public_ip: None,
        }
    }
}

/// Block storage volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,

    pub size_gb: u32,

    #[serde(default)]
    pub volume_type: Option<String>,

    #[serde(default)]
    pub provider_id: Option<String>,
}

impl Volume {
    pub fn new(name: impl Into<String>, size_gb: u32) -> Self {
        Self {
            name: name.into(),
            size_gb,
            volume_type: None,
            provider_id: None,
        }
    }
}

/// Externally reachable load balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entrypoint {
    pub name: String,

    #[serde(default)]
    pub provider_id: Option<String>,

    #[serde(default)]
    pub address: Option<String>,
}

impl Entrypoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_id: None,
            address: None,
        }
    }
}

/// Port/protocol rule on an entrypoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrypointListener {
    pub entrypoint_name: String,
    pub name: String,
    pub entrypoint_port: u16,
    pub entrypoint_protocol: String,
    pub node_port: u16,
    pub node_protocol: String,
}

/// In-cluster volume definition that lets Kubernetes attach a cloud volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub flex_volume: FlexVolume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexVolume {
    pub driver: String,
    pub fs_type: String,
    pub options: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("openstack".parse::<ProviderKind>().unwrap(), ProviderKind::OpenStack);
        assert_eq!(
            "DigitalOcean".parse::<ProviderKind>().unwrap(),
            ProviderKind::DigitalOcean
        );
        let err = "aws".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, CloudError::UnknownProvider(p) if p == "aws"));
    }

    #[test]
    fn test_require_credential() {
        let account = CloudAccount::new("lab", "openstack")
            .with_credential("username", "admin")
            .with_credential("password", "");

        assert_eq!(account.require_credential("username").unwrap(), "admin");
        assert!(matches!(
            account.require_credential("password"),
            Err(CloudError::Validation(_))
        ));
        assert!(account.require_credential("tenant_id").is_err());
    }

    #[test]
    fn test_minion_sizes_default_to_master() {
        let account = CloudAccount::new("lab", "openstack");
        let kube = Kube::new("demo", account.clone(), "m1.small");
        assert_eq!(kube.minion_sizes(), vec!["m1.small"]);

        let kube =
            Kube::new("demo", account, "m1.small").with_node_sizes(["m1.large", "m1.medium"]);
        assert_eq!(kube.minion_sizes(), vec!["m1.large", "m1.medium"]);
    }

    #[test]
    fn test_volume_mount_serializes_like_kubernetes() {
        let mount = VolumeMount {
            name: "data".into(),
            flex_volume: FlexVolume {
                driver: "kubeprov.io/digitalocean".into(),
                fs_type: "ext4".into(),
                options: [("volumeID".to_string(), "vol-1".to_string())]
                    .into_iter()
                    .collect(),
            },
        };
        let json = serde_json::to_value(&mount).unwrap();
        assert_eq!(json["flexVolume"]["fsType"], "ext4");
        assert_eq!(json["flexVolume"]["options"]["volumeID"], "vol-1");
    }
}
