//! Naming and tagging conventions for cluster resources
//!
//! Every resource a cluster owns is found again by one of these names or
//! tags, never by a stored provider id.

use crate::model::NodeRole;
use std::collections::HashMap;

/// Metadata key carrying the owning cluster name
pub const CLUSTER_TAG: &str = "kubernetes-cluster";

/// Metadata key carrying the node role
pub const ROLE_TAG: &str = "Role";

pub fn network_name(cluster: &str) -> String {
    format!("{}-network", cluster)
}

pub fn subnet_name(cluster: &str) -> String {
    format!("{}-subnet", cluster)
}

pub fn router_name(cluster: &str) -> String {
    format!("{}-router", cluster)
}

pub fn master_name(cluster: &str) -> String {
    format!("{}-master", cluster)
}

pub fn minion_name(cluster: &str) -> String {
    format!("{}-minion", cluster)
}

/// Key/value metadata attached to every instance of a cluster
pub fn instance_tags(cluster: &str, role: NodeRole) -> HashMap<String, String> {
    [
        (CLUSTER_TAG.to_string(), cluster.to_string()),
        (ROLE_TAG.to_string(), role.as_str().to_string()),
    ]
    .into_iter()
    .collect()
}

/// Whether `tags` carries exactly `key=value`
pub fn has_tag(tags: &HashMap<String, String>, key: &str, value: &str) -> bool {
    tags.get(key).is_some_and(|v| v == value)
}

/// Flat label form for providers whose tags are plain strings
pub fn flat_tag(key: &str, value: &str) -> String {
    format!("{}:{}", key.to_lowercase(), value)
}
