//! Discovered fields produced by procedures

use crate::model::{Entrypoint, Kube, Node, Volume};
use crate::procedure::StepOutputs;

/// What cluster creation learns about the resources it created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeOutputs {
    pub master_public_ip: Option<String>,
}

impl KubeOutputs {
    /// Write the fields the cluster record keeps
    pub fn apply_to(&self, kube: &mut Kube) {
        if let Some(ip) = &self.master_public_ip {
            kube.master_public_ip = Some(ip.clone());
        }
    }
}

impl StepOutputs for KubeOutputs {
    fn merge(&mut self, discovered: Self) {
        if discovered.master_public_ip.is_some() {
            self.master_public_ip = discovered.master_public_ip;
        }
    }
}

/// What node creation learns about the instance it created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOutputs {
    pub provider_id: Option<String>,
    pub public_ip: Option<String>,
}

impl NodeOutputs {
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(id) = &self.provider_id {
            node.provider_id = Some(id.clone());
        }
        if let Some(ip) = &self.public_ip {
            node.public_ip = Some(ip.clone());
        }
    }
}

impl StepOutputs for NodeOutputs {
    fn merge(&mut self, discovered: Self) {
        if discovered.provider_id.is_some() {
            self.provider_id = discovered.provider_id;
        }
        if discovered.public_ip.is_some() {
            self.public_ip = discovered.public_ip;
        }
    }
}

/// Provider id of a created volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeOutputs {
    pub provider_id: Option<String>,
}

impl VolumeOutputs {
    pub fn apply_to(&self, volume: &mut Volume) {
        if let Some(id) = &self.provider_id {
            volume.provider_id = Some(id.clone());
        }
    }
}

impl StepOutputs for VolumeOutputs {
    fn merge(&mut self, discovered: Self) {
        if discovered.provider_id.is_some() {
            self.provider_id = discovered.provider_id;
        }
    }
}

/// Provider id and public address of a created entrypoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrypointOutputs {
    pub provider_id: Option<String>,
    pub address: Option<String>,
}

impl EntrypointOutputs {
    pub fn apply_to(&self, entrypoint: &mut Entrypoint) {
        if let Some(id) = &self.provider_id {
            entrypoint.provider_id = Some(id.clone());
        }
        if let Some(address) = &self.address {
            entrypoint.address = Some(address.clone());
        }
    }
}

impl StepOutputs for EntrypointOutputs {
    fn merge(&mut self, discovered: Self) {
        if discovered.provider_id.is_some() {
            self.provider_id = discovered.provider_id;
        }
        if discovered.address.is_some() {
            self.address = discovered.address;
        }
    }
}
