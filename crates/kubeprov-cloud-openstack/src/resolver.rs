//! Name and tag lookups against the OpenStack inventory

use crate::api::{FloatingIp, Network, OpenStackApi, Router, Server, Subnet};
use kubeprov_cloud::naming::{CLUSTER_TAG, has_tag};
use kubeprov_cloud::{CloudError, Result, collect_matching, find_first};

/// Read-only resolver; every lookup lists afresh and filters locally
#[derive(Clone, Copy)]
pub struct OpenStackResolver<'a> {
    api: &'a dyn OpenStackApi,
}

impl<'a> OpenStackResolver<'a> {
    pub fn new(api: &'a dyn OpenStackApi) -> Self {
        Self { api }
    }

    pub async fn find_network_by_name(&self, name: &str) -> Result<Option<Network>> {
        let api = self.api;
        Ok(find_first(|marker| api.list_networks(marker), |n: &Network| n.name == name).await?)
    }

    /// The named external network, or the first external one when no name is given
    pub async fn find_external_network(&self, name: Option<&str>) -> Result<Option<Network>> {
        let api = self.api;
        Ok(find_first(
            |marker| api.list_networks(marker),
            |n: &Network| n.external && name.is_none_or(|name| n.name == name),
        )
        .await?)
    }

    pub async fn find_subnet_by_name(&self, name: &str) -> Result<Option<Subnet>> {
        let api = self.api;
        Ok(find_first(|marker| api.list_subnets(marker), |s: &Subnet| s.name == name).await?)
    }

    pub async fn find_router_by_name(&self, name: &str) -> Result<Option<Router>> {
        let api = self.api;
        Ok(find_first(|marker| api.list_routers(marker), |r: &Router| r.name == name).await?)
    }

    pub async fn find_floating_ip_by_address(&self, address: &str) -> Result<Option<FloatingIp>> {
        let api = self.api;
        Ok(find_first(
            |marker| api.list_floating_ips(marker),
            |f: &FloatingIp| f.floating_ip_address == address,
        )
        .await?)
    }

    /// Every server carrying `key=value`, across all pages
    pub async fn list_servers_by_tag(&self, key: &str, value: &str) -> Result<Vec<Server>> {
        let api = self.api;
        Ok(collect_matching(
            |marker| api.list_servers(marker),
            |s: &Server| has_tag(&s.metadata, key, value),
        )
        .await?)
    }

    /// First server of `cluster` that also carries `key=value`
    pub async fn find_cluster_server_by_tag(
        &self,
        cluster: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<Server>> {
        let api = self.api;
        Ok(find_first(
            |marker| api.list_servers(marker),
            |s: &Server| {
                has_tag(&s.metadata, CLUSTER_TAG, cluster) && has_tag(&s.metadata, key, value)
            },
        )
        .await?)
    }

    /// Server of `cluster` with the given name
    pub async fn find_cluster_server_by_name(
        &self,
        cluster: &str,
        name: &str,
    ) -> Result<Option<Server>> {
        let api = self.api;
        Ok(find_first(
            |marker| api.list_servers(marker),
            |s: &Server| s.name == name && has_tag(&s.metadata, CLUSTER_TAG, cluster),
        )
        .await?)
    }
}

/// Turn a lookup that must succeed into a not-found error
pub fn require<T>(found: Option<T>, what: impl FnOnce() -> String) -> Result<T> {
    found.ok_or_else(|| CloudError::NotFound(what()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryOpenStack, PUBLIC_NETWORK};
    use kubeprov_cloud::NodeRole;
    use kubeprov_cloud::naming::{ROLE_TAG, instance_tags};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_lookups_return_none_when_absent() {
        let api = InMemoryOpenStack::new();
        let resolver = OpenStackResolver::new(&api);

        assert!(resolver.find_network_by_name("demo-network").await.unwrap().is_none());
        assert!(resolver.find_router_by_name("demo-router").await.unwrap().is_none());
        assert!(
            resolver
                .find_floating_ip_by_address("203.0.113.1")
                .await
                .unwrap()
                .is_none()
        );
        assert!(resolver.list_servers_by_tag(CLUSTER_TAG, "demo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_external_network() {
        let api = InMemoryOpenStack::new();
        api.create_network("demo-network").await.unwrap();
        let resolver = OpenStackResolver::new(&api);

        let public = resolver.find_external_network(None).await.unwrap().unwrap();
        assert_eq!(public.name, PUBLIC_NETWORK);
        assert!(
            resolver
                .find_external_network(Some("demo-network"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_singular_lookup_stops_early() {
        let api = InMemoryOpenStack::new().with_page_size(2);
        for i in 0..6 {
            api.create_network(&format!("net-{}", i)).await.unwrap();
        }
        let resolver = OpenStackResolver::new(&api);

        // "public" + net-0 on page one, net-1 + net-2 on page two
        let found = resolver.find_network_by_name("net-2").await.unwrap().unwrap();
        assert_eq!(found.name, "net-2");
        assert_eq!(api.list_calls("networks"), 2);
    }

    #[tokio::test]
    async fn test_tag_gather_spans_pages() {
        let api = InMemoryOpenStack::new().with_page_size(2);
        for i in 0..5 {
            api.seed_server(&format!("demo-minion-{}", i), instance_tags("demo", NodeRole::Minion));
            api.seed_server(&format!("other-{}", i), instance_tags("other", NodeRole::Minion));
        }
        api.seed_server("untagged", HashMap::new());
        let resolver = OpenStackResolver::new(&api);

        let servers = resolver.list_servers_by_tag(CLUSTER_TAG, "demo").await.unwrap();

        assert_eq!(servers.len(), 5);
        assert!(servers.iter().all(|s| s.name.starts_with("demo-")));
        assert_eq!(api.list_calls("servers"), 6);
    }

    #[tokio::test]
    async fn test_cluster_server_by_tag() {
        let api = InMemoryOpenStack::new();
        api.seed_server("other-master", instance_tags("other", NodeRole::Master));
        api.seed_server("demo-minion", instance_tags("demo", NodeRole::Minion));
        api.seed_server("demo-master", instance_tags("demo", NodeRole::Master));
        let resolver = OpenStackResolver::new(&api);

        let master = resolver
            .find_cluster_server_by_tag("demo", ROLE_TAG, "master")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(master.name, "demo-master");
    }
}
