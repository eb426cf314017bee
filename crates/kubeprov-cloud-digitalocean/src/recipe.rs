//! Cluster, node, volume and entrypoint procedures for DigitalOcean
//!
//! DigitalOcean has no private network to build: a cluster is a set of
//! droplets sharing the `kubernetes-cluster:<name>` tag, and the master's
//! public interface is the cluster address. Every resource is found again by
//! tag or name; deletion treats anything already gone as deleted.

use crate::api::{CreateDroplet, CreateLoadBalancer, CreateVolume, DigitalOceanApi, ForwardingRule};
use crate::error::DigitalOceanError;
use crate::resolver::DigitalOceanResolver;
use kubeprov_cloud::naming::{self, CLUSTER_TAG, ROLE_TAG, flat_tag};
use kubeprov_cloud::{
    ActionSink, BootConfig, BootParams, CloudError, DigitalOceanKubeConfig, Entrypoint,
    EntrypointListener, EntrypointOutputs, Kube, KubeOutputs, Node, NodeOutputs, NodeRole,
    PollPolicy, Procedure, Result, Volume, VolumeOutputs, poll_until, tolerate_not_found,
};
use kubeprov_config::{DigitalOceanSettings, PollSettings};

/// Step descriptions, as reported to the action
pub mod steps {
    pub const CREATE_TAGS: &str = "Creating Kubernetes Tags";
    pub const CREATE_MASTER: &str = "Creating Kubernetes Master";
    pub const WAIT_MASTER: &str = "Waiting for Kubernetes Master";
    pub const CREATE_MINION: &str = "Creating Kubernetes Minion";

    pub const DELETE_DROPLETS: &str = "Deleting Kubernetes Droplets";
    pub const DELETE_TAGS: &str = "Deleting Kubernetes Tags";

    pub const CREATE_NODE: &str = "Creating Kubernetes Node";
    pub const WAIT_NODE: &str = "Waiting for Kubernetes Node";
    pub const DELETE_NODE: &str = "Deleting Kubernetes Node";

    pub const CREATE_VOLUME: &str = "Creating Kubernetes Volume";
    pub const RESIZE_VOLUME: &str = "Resizing Kubernetes Volume";
    pub const DELETE_VOLUME: &str = "Deleting Kubernetes Volume";

    pub const CREATE_ENTRYPOINT: &str = "Creating Kubernetes Entrypoint";
    pub const WAIT_ENTRYPOINT: &str = "Waiting for Kubernetes Entrypoint";
    pub const DELETE_ENTRYPOINT: &str = "Deleting Kubernetes Entrypoint";
    pub const CREATE_LISTENER: &str = "Creating Kubernetes Entrypoint Listener";
    pub const DELETE_LISTENER: &str = "Deleting Kubernetes Entrypoint Listener";
}

/// Rule every new load balancer starts with; DigitalOcean rejects a load
/// balancer without one
pub fn default_forwarding_rule() -> ForwardingRule {
    ForwardingRule {
        entry_protocol: "http".to_string(),
        entry_port: 80,
        target_protocol: "http".to_string(),
        target_port: 80,
    }
}

/// Forwarding rule a listener maps to
pub fn forwarding_rule(listener: &EntrypointListener) -> ForwardingRule {
    ForwardingRule {
        entry_protocol: listener.entrypoint_protocol.to_lowercase(),
        entry_port: listener.entrypoint_port,
        target_protocol: listener.node_protocol.to_lowercase(),
        target_port: listener.node_port,
    }
}

fn poll_policy(settings: &PollSettings) -> PollPolicy {
    PollPolicy::new(settings.interval(), settings.timeout())
}

/// A delete that found nothing to delete still succeeded
fn deleted(result: crate::error::Result<()>) -> Result<()> {
    tolerate_not_found(result.map_err(CloudError::from)).map(|_| ())
}

fn require<T>(found: Option<T>, what: impl FnOnce() -> String) -> Result<T> {
    found.ok_or_else(|| CloudError::NotFound(what()))
}

/// Everything a step needs, borrowed for the lifetime of one procedure
#[derive(Clone, Copy)]
pub struct RecipeContext<'a> {
    pub api: &'a dyn DigitalOceanApi,
    pub kube: &'a Kube,
    pub config: &'a DigitalOceanKubeConfig,
    pub settings: &'a DigitalOceanSettings,
    pub boot: &'a BootConfig,
}

impl<'a> RecipeContext<'a> {
    pub fn resolver(&self) -> DigitalOceanResolver<'a> {
        DigitalOceanResolver::new(self.api)
    }

    pub fn region(&self) -> &'a str {
        &self.config.region
    }

    pub fn image(&self) -> &'a str {
        self.config.image.as_deref().unwrap_or(&self.settings.image)
    }

    /// Tag shared by every droplet, volume and load balancer of the cluster
    pub fn cluster_tag(&self) -> String {
        flat_tag(CLUSTER_TAG, &self.kube.name)
    }

    fn render_boot(
        &self,
        node_name: &str,
        size: &str,
        role: NodeRole,
        master_ip: Option<String>,
    ) -> Result<String> {
        self.boot.render(&BootParams {
            cluster_name: self.kube.name.clone(),
            node_name: node_name.to_string(),
            node_size: size.to_string(),
            role,
            provider: "digitalocean".to_string(),
            master_ip,
        })
    }

    /// Create one droplet carrying the cluster and role tags
    async fn create_droplet(
        &self,
        name: &str,
        size: &str,
        role: NodeRole,
        master_ip: Option<String>,
    ) -> Result<u64> {
        let user_data = self.render_boot(name, size, role, master_ip)?;
        let droplet = self
            .api
            .create_droplet(&CreateDroplet {
                name: name.to_string(),
                region: self.region().to_string(),
                size: size.to_string(),
                image: self.image().to_string(),
                ssh_keys: self.config.ssh_key_fingerprints.clone(),
                tags: vec![self.cluster_tag(), flat_tag(ROLE_TAG, role.as_str())],
                user_data,
            })
            .await?;
        tracing::info!(droplet = %droplet.name, id = droplet.id, %role, "Droplet created");
        Ok(droplet.id)
    }

    /// Poll until the droplet is active with a public address; returns the address
    async fn wait_for_active(&self, id: u64, name: &str) -> Result<String> {
        let api = self.api;
        let policy = poll_policy(&self.settings.droplet_active);
        poll_until(&policy, &format!("droplet {} active", name), move || async move {
            let droplet = api.get_droplet(id).await?;
            if !droplet.is_active() {
                return Ok(None);
            }
            Ok(droplet.public_ipv4().map(str::to_string))
        })
        .await
    }

    /// Poll until the volume can be read back
    pub async fn wait_for_volume(&self, id: &str, name: &str) -> Result<()> {
        let api = self.api;
        let policy = poll_policy(&self.settings.volume_available);
        poll_until(&policy, &format!("volume {} available", name), move || async move {
            match api.get_volume(id).await {
                Ok(_) => Ok(Some(())),
                Err(e) if e.status() == Some(404) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Poll until the load balancer is active; an errored one ends the wait
    async fn wait_for_load_balancer(&self, id: &str, name: &str) -> Result<String> {
        let api = self.api;
        let policy = poll_policy(&self.settings.load_balancer_active);
        poll_until(&policy, &format!("load balancer {} active", name), move || async move {
            let lb = api.get_load_balancer(id).await?;
            if lb.status == "errored" {
                return Err(DigitalOceanError::Fault {
                    resource: format!("load balancer {}", lb.name),
                    status: lb.status,
                }
                .into());
            }
            Ok(lb.is_active().then_some(lb.ip))
        })
        .await
    }
}

/// Tags, master, wait for the master's address, minions
pub fn create_kube<'a>(
    ctx: RecipeContext<'a>,
    action: &'a dyn ActionSink,
) -> Procedure<'a, KubeOutputs> {
    let mut procedure = Procedure::new(format!("create kube {}", ctx.kube.name), action);

    procedure.add_step(steps::CREATE_TAGS, move |_| async move {
        let tags = [
            ctx.cluster_tag(),
            flat_tag(ROLE_TAG, NodeRole::Master.as_str()),
            flat_tag(ROLE_TAG, NodeRole::Minion.as_str()),
        ];
        for tag in &tags {
            ctx.api.create_tag(tag).await?;
        }
        tracing::info!(tag = %tags[0], "Cluster tags ready");
        Ok(KubeOutputs::default())
    });

    procedure.add_step(steps::CREATE_MASTER, move |_| async move {
        let name = naming::master_name(&ctx.kube.name);
        ctx.create_droplet(&name, &ctx.kube.master_node_size, NodeRole::Master, None)
            .await?;
        Ok(KubeOutputs::default())
    });

    procedure.add_step(steps::WAIT_MASTER, move |_| async move {
        let master = require(
            ctx.resolver()
                .find_cluster_droplet_by_tag(&ctx.kube.name, ROLE_TAG, NodeRole::Master.as_str())
                .await?,
            || format!("master of {}", ctx.kube.name),
        )?;
        let address = ctx.wait_for_active(master.id, &master.name).await?;
        tracing::info!(droplet = %master.name, %address, "Master is reachable");
        Ok(KubeOutputs {
            master_public_ip: Some(address),
        })
    });

    procedure.add_step(steps::CREATE_MINION, move |outputs: KubeOutputs| async move {
        let name = naming::minion_name(&ctx.kube.name);
        for size in ctx.kube.minion_sizes() {
            ctx.create_droplet(&name, size, NodeRole::Minion, outputs.master_public_ip.clone())
                .await?;
        }
        Ok(KubeOutputs::default())
    });

    procedure
}

/// Droplets, then the cluster tag; each may already be gone
pub fn delete_kube<'a>(ctx: RecipeContext<'a>, action: &'a dyn ActionSink) -> Procedure<'a, ()> {
    let mut procedure = Procedure::new(format!("delete kube {}", ctx.kube.name), action);

    procedure.add_step(steps::DELETE_DROPLETS, move |_| async move {
        let resolver = ctx.resolver();
        let cluster = ctx.kube.name.as_str();
        let droplets = resolver.list_droplets_by_tag(CLUSTER_TAG, cluster).await?;
        if droplets.is_empty() {
            return Ok(());
        }

        for droplet in &droplets {
            tracing::info!(droplet = %droplet.name, id = droplet.id, "Deleting droplet");
            deleted(ctx.api.delete_droplet(droplet.id).await)?;
        }

        let policy = poll_policy(&ctx.settings.droplet_deleted);
        poll_until(&policy, &format!("droplets of {} deleted", cluster), move || async move {
            let remaining = resolver.list_droplets_by_tag(CLUSTER_TAG, cluster).await?;
            Ok(remaining.is_empty().then_some(()))
        })
        .await
    });

    // role tags are shared between clusters and stay
    procedure.add_step(steps::DELETE_TAGS, move |_| async move {
        deleted(ctx.api.delete_tag(&ctx.cluster_tag()).await)
    });

    procedure
}

/// One more droplet on an existing cluster
pub fn create_node<'a>(
    ctx: RecipeContext<'a>,
    node: &'a Node,
    action: &'a dyn ActionSink,
) -> Procedure<'a, NodeOutputs> {
    let mut procedure = Procedure::new(format!("create node {}", node.name), action);

    procedure.add_step(steps::CREATE_NODE, move |_| async move {
        let id = ctx
            .create_droplet(&node.name, &node.size, node.role, ctx.kube.master_public_ip.clone())
            .await?;
        Ok(NodeOutputs {
            provider_id: Some(id.to_string()),
            ..Default::default()
        })
    });

    procedure.add_step(steps::WAIT_NODE, move |outputs: NodeOutputs| async move {
        let id = require(outputs.provider_id, || format!("droplet {}", node.name))?;
        let id = id
            .parse::<u64>()
            .map_err(|_| CloudError::NotFound(format!("droplet {}", id)))?;
        let address = ctx.wait_for_active(id, &node.name).await?;
        Ok(NodeOutputs {
            public_ip: Some(address),
            ..Default::default()
        })
    });

    procedure
}

pub fn delete_node<'a>(
    ctx: RecipeContext<'a>,
    node: &'a Node,
    action: &'a dyn ActionSink,
) -> Procedure<'a, ()> {
    let mut procedure = Procedure::new(format!("delete node {}", node.name), action);

    procedure.add_step(steps::DELETE_NODE, move |_| async move {
        match ctx
            .resolver()
            .find_cluster_droplet_by_name(&ctx.kube.name, &node.name)
            .await?
        {
            Some(droplet) => deleted(ctx.api.delete_droplet(droplet.id).await),
            None => Ok(()),
        }
    });

    procedure
}

pub fn create_volume<'a>(
    ctx: RecipeContext<'a>,
    volume: &'a Volume,
    action: &'a dyn ActionSink,
) -> Procedure<'a, VolumeOutputs> {
    let mut procedure = Procedure::new(format!("create volume {}", volume.name), action);

    procedure.add_step(steps::CREATE_VOLUME, move |_| async move {
        let created = ctx
            .api
            .create_volume(&CreateVolume {
                name: volume.name.clone(),
                size_gigabytes: volume.size_gb,
                region: ctx.region().to_string(),
                tags: vec![ctx.cluster_tag()],
            })
            .await?;
        tracing::info!(
            volume = %created.name,
            id = %created.id,
            size_gb = created.size_gigabytes,
            "Volume created"
        );
        Ok(VolumeOutputs {
            provider_id: Some(created.id),
        })
    });

    procedure
}

/// Grow the cluster's volume found by name to the requested size
pub fn resize_volume<'a>(
    ctx: RecipeContext<'a>,
    volume: &'a Volume,
    action: &'a dyn ActionSink,
) -> Procedure<'a, VolumeOutputs> {
    let mut procedure = Procedure::new(format!("resize volume {}", volume.name), action);

    procedure.add_step(steps::RESIZE_VOLUME, move |_| async move {
        let existing = require(
            ctx.resolver()
                .find_cluster_volume_by_name(&ctx.kube.name, &volume.name)
                .await?,
            || format!("volume {}", volume.name),
        )?;
        ctx.api
            .resize_volume(&existing.id, volume.size_gb, ctx.region())
            .await?;
        tracing::info!(
            volume = %existing.name,
            from_gb = existing.size_gigabytes,
            to_gb = volume.size_gb,
            "Volume resized"
        );
        Ok(VolumeOutputs {
            provider_id: Some(existing.id),
        })
    });

    procedure
}

pub fn delete_volume<'a>(
    ctx: RecipeContext<'a>,
    volume: &'a Volume,
    action: &'a dyn ActionSink,
) -> Procedure<'a, ()> {
    let mut procedure = Procedure::new(format!("delete volume {}", volume.name), action);

    procedure.add_step(steps::DELETE_VOLUME, move |_| async move {
        match ctx
            .resolver()
            .find_cluster_volume_by_name(&ctx.kube.name, &volume.name)
            .await?
        {
            Some(existing) => deleted(ctx.api.delete_volume(&existing.id).await),
            None => Ok(()),
        }
    });

    procedure
}

/// Load balancer in front of the cluster's droplets, then wait for its address
pub fn create_entrypoint<'a>(
    ctx: RecipeContext<'a>,
    entrypoint: &'a Entrypoint,
    action: &'a dyn ActionSink,
) -> Procedure<'a, EntrypointOutputs> {
    let mut procedure = Procedure::new(format!("create entrypoint {}", entrypoint.name), action);

    procedure.add_step(steps::CREATE_ENTRYPOINT, move |_| async move {
        let lb = ctx
            .api
            .create_load_balancer(&CreateLoadBalancer {
                name: entrypoint.name.clone(),
                region: ctx.region().to_string(),
                tag: ctx.cluster_tag(),
                forwarding_rules: vec![default_forwarding_rule()],
            })
            .await?;
        tracing::info!(load_balancer = %lb.name, id = %lb.id, "Load balancer created");
        Ok(EntrypointOutputs {
            provider_id: Some(lb.id),
            ..Default::default()
        })
    });

    procedure.add_step(
        steps::WAIT_ENTRYPOINT,
        move |outputs: EntrypointOutputs| async move {
            let id = require(outputs.provider_id, || {
                format!("load balancer {}", entrypoint.name)
            })?;
            let address = ctx.wait_for_load_balancer(&id, &entrypoint.name).await?;
            Ok(EntrypointOutputs {
                address: Some(address),
                ..Default::default()
            })
        },
    );

    procedure
}

pub fn delete_entrypoint<'a>(
    ctx: RecipeContext<'a>,
    entrypoint: &'a Entrypoint,
    action: &'a dyn ActionSink,
) -> Procedure<'a, ()> {
    let mut procedure = Procedure::new(format!("delete entrypoint {}", entrypoint.name), action);

    procedure.add_step(steps::DELETE_ENTRYPOINT, move |_| async move {
        match ctx
            .resolver()
            .find_cluster_load_balancer_by_name(&ctx.kube.name, &entrypoint.name)
            .await?
        {
            Some(lb) => deleted(ctx.api.delete_load_balancer(&lb.id).await),
            None => Ok(()),
        }
    });

    procedure
}

/// Forwarding rule on the load balancer named by the listener
pub fn create_entrypoint_listener<'a>(
    ctx: RecipeContext<'a>,
    listener: &'a EntrypointListener,
    action: &'a dyn ActionSink,
) -> Procedure<'a, ()> {
    let mut procedure = Procedure::new(format!("create listener {}", listener.name), action);

    procedure.add_step(steps::CREATE_LISTENER, move |_| async move {
        let lb = require(
            ctx.resolver()
                .find_cluster_load_balancer_by_name(&ctx.kube.name, &listener.entrypoint_name)
                .await?,
            || format!("load balancer {}", listener.entrypoint_name),
        )?;
        let rule = forwarding_rule(listener);
        ctx.api.add_forwarding_rules(&lb.id, &[rule]).await?;
        tracing::info!(
            load_balancer = %lb.name,
            listener = %listener.name,
            port = listener.entrypoint_port,
            node_port = listener.node_port,
            "Forwarding rule added"
        );
        Ok(())
    });

    procedure
}

pub fn delete_entrypoint_listener<'a>(
    ctx: RecipeContext<'a>,
    listener: &'a EntrypointListener,
    action: &'a dyn ActionSink,
) -> Procedure<'a, ()> {
    let mut procedure = Procedure::new(format!("delete listener {}", listener.name), action);

    procedure.add_step(steps::DELETE_LISTENER, move |_| async move {
        let Some(lb) = ctx
            .resolver()
            .find_cluster_load_balancer_by_name(&ctx.kube.name, &listener.entrypoint_name)
            .await?
        else {
            return Ok(());
        };
        let rule = forwarding_rule(listener);
        if !lb.forwarding_rules.contains(&rule) {
            return Ok(());
        }
        deleted(ctx.api.remove_forwarding_rules(&lb.id, &[rule]).await)
    });

    procedure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_protocols_are_lowercased() {
        let listener = EntrypointListener {
            entrypoint_name: "web".into(),
            name: "https".into(),
            entrypoint_port: 443,
            entrypoint_protocol: "HTTPS".into(),
            node_port: 30443,
            node_protocol: "HTTP".into(),
        };

        let rule = forwarding_rule(&listener);
        assert_eq!(rule.entry_protocol, "https");
        assert_eq!(rule.entry_port, 443);
        assert_eq!(rule.target_protocol, "http");
        assert_eq!(rule.target_port, 30443);
    }
}
