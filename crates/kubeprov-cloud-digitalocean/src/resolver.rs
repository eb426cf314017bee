//! Name and tag lookups against a DigitalOcean account

use crate::api::{BlockVolume, DigitalOceanApi, Droplet, LoadBalancer};
use kubeprov_cloud::naming::{CLUSTER_TAG, flat_tag};
use kubeprov_cloud::{Result, collect_matching, find_first};

/// Read-only resolver; every lookup lists afresh and filters locally
#[derive(Clone, Copy)]
pub struct DigitalOceanResolver<'a> {
    api: &'a dyn DigitalOceanApi,
}

impl<'a> DigitalOceanResolver<'a> {
    pub fn new(api: &'a dyn DigitalOceanApi) -> Self {
        Self { api }
    }

    /// Every droplet carrying the flat tag `key:value`, across all pages
    pub async fn list_droplets_by_tag(&self, key: &str, value: &str) -> Result<Vec<Droplet>> {
        let api = self.api;
        let tag = flat_tag(key, value);
        Ok(collect_matching(|page| api.list_droplets(page), |d: &Droplet| d.has_tag(&tag)).await?)
    }

    /// First droplet of `cluster` that also carries `key:value`
    pub async fn find_cluster_droplet_by_tag(
        &self,
        cluster: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<Droplet>> {
        let api = self.api;
        let cluster_tag = flat_tag(CLUSTER_TAG, cluster);
        let tag = flat_tag(key, value);
        Ok(find_first(
            |page| api.list_droplets(page),
            |d: &Droplet| d.has_tag(&cluster_tag) && d.has_tag(&tag),
        )
        .await?)
    }

    /// Droplet of `cluster` with the given name
    pub async fn find_cluster_droplet_by_name(
        &self,
        cluster: &str,
        name: &str,
    ) -> Result<Option<Droplet>> {
        let api = self.api;
        let cluster_tag = flat_tag(CLUSTER_TAG, cluster);
        Ok(find_first(
            |page| api.list_droplets(page),
            |d: &Droplet| d.name == name && d.has_tag(&cluster_tag),
        )
        .await?)
    }

    /// Volume of `cluster` with the given name
    pub async fn find_cluster_volume_by_name(
        &self,
        cluster: &str,
        name: &str,
    ) -> Result<Option<BlockVolume>> {
        let api = self.api;
        let cluster_tag = flat_tag(CLUSTER_TAG, cluster);
        Ok(find_first(
            |page| api.list_volumes(page),
            |v: &BlockVolume| v.name == name && v.tags.contains(&cluster_tag),
        )
        .await?)
    }

    /// Load balancer targeting `cluster`'s droplets with the given name
    pub async fn find_cluster_load_balancer_by_name(
        &self,
        cluster: &str,
        name: &str,
    ) -> Result<Option<LoadBalancer>> {
        let api = self.api;
        let cluster_tag = flat_tag(CLUSTER_TAG, cluster);
        Ok(find_first(
            |page| api.list_load_balancers(page),
            |l: &LoadBalancer| l.name == name && l.tag == cluster_tag,
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CreateLoadBalancer, CreateVolume};
    use crate::recipe::default_forwarding_rule;
    use crate::memory::InMemoryDigitalOcean;
    use kubeprov_cloud::naming::ROLE_TAG;

    #[tokio::test]
    async fn test_lookups_return_none_when_absent() {
        let api = InMemoryDigitalOcean::new();
        let resolver = DigitalOceanResolver::new(&api);

        assert!(
            resolver
                .find_cluster_volume_by_name("demo", "data")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            resolver
                .find_cluster_load_balancer_by_name("demo", "web")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            resolver
                .list_droplets_by_tag(CLUSTER_TAG, "demo")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_cluster_droplets_are_scoped_by_tag() {
        let api = InMemoryDigitalOcean::new();
        api.seed_droplet("demo-master", &["kubernetes-cluster:demo", "role:master"]);
        api.seed_droplet("other-master", &["kubernetes-cluster:other", "role:master"]);
        api.seed_droplet("demo-minion", &["kubernetes-cluster:demo", "role:minion"]);
        let resolver = DigitalOceanResolver::new(&api);

        let master = resolver
            .find_cluster_droplet_by_tag("other", ROLE_TAG, "master")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(master.name, "other-master");

        let names: Vec<_> = resolver
            .list_droplets_by_tag(CLUSTER_TAG, "demo")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["demo-master", "demo-minion"]);

        assert!(
            resolver
                .find_cluster_droplet_by_name("other", "demo-minion")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_singular_lookup_stops_early() {
        let api = InMemoryDigitalOcean::new().with_page_size(2);
        for i in 0..6 {
            api.create_volume(&CreateVolume {
                name: format!("vol-{}", i),
                size_gigabytes: 1,
                region: "nyc3".into(),
                tags: vec!["kubernetes-cluster:demo".into()],
            })
            .await
            .unwrap();
        }
        let resolver = DigitalOceanResolver::new(&api);

        let found = resolver
            .find_cluster_volume_by_name("demo", "vol-2")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(api.list_calls("volumes"), 2);
    }

    #[tokio::test]
    async fn test_volumes_and_load_balancers_are_scoped_by_cluster() {
        let api = InMemoryDigitalOcean::new();
        api.create_volume(&CreateVolume {
            name: "data".into(),
            size_gigabytes: 10,
            region: "nyc3".into(),
            tags: vec!["kubernetes-cluster:demo".into()],
        })
        .await
        .unwrap();
        api.create_load_balancer(&CreateLoadBalancer {
            name: "web".into(),
            region: "nyc3".into(),
            tag: "kubernetes-cluster:demo".into(),
            forwarding_rules: vec![default_forwarding_rule()],
        })
        .await
        .unwrap();
        let resolver = DigitalOceanResolver::new(&api);

        assert!(
            resolver
                .find_cluster_volume_by_name("demo", "data")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            resolver
                .find_cluster_volume_by_name("other", "data")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            resolver
                .find_cluster_load_balancer_by_name("other", "web")
                .await
                .unwrap()
                .is_none()
        );
    }
}
