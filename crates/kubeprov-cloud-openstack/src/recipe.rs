//! Cluster and node procedures for OpenStack
//!
//! Creation builds network, subnet, router, master, floating IP and minions in
//! that order. Deletion walks the same resources in reverse, finding each one
//! again by name or tag, and treats anything already gone as deleted.

use crate::api::{CreateServer, CreateSubnet, Network, OpenStackApi};
use crate::error::OpenStackError;
use crate::resolver::{OpenStackResolver, require};
use kubeprov_cloud::naming::{self, CLUSTER_TAG, ROLE_TAG};
use kubeprov_cloud::{
    ActionSink, BootConfig, BootParams, CloudError, Kube, KubeOutputs, Node, NodeOutputs,
    NodeRole, PollPolicy, Procedure, Result, poll_until, tolerate_not_found,
};
use kubeprov_config::{OpenStackSettings, PollSettings};

/// Step descriptions, as reported to the action
pub mod steps {
    pub const CREATE_NETWORK: &str = "Creating Kubernetes Network";
    pub const CREATE_SUBNET: &str = "Creating Kubernetes Subnet";
    pub const CREATE_ROUTER: &str = "Creating Kubernetes Router";
    pub const CREATE_MASTER: &str = "Creating Kubernetes Master";
    pub const CREATE_FLOATING_IP: &str = "Creating Kubernetes Floating IP";
    pub const CREATE_MINION: &str = "Creating Kubernetes Minion";

    pub const DELETE_FLOATING_IP: &str = "Deleting Kubernetes Floating IP";
    pub const DELETE_SERVERS: &str = "Deleting Kubernetes Servers";
    pub const DELETE_ROUTER: &str = "Deleting Kubernetes Router";
    pub const DELETE_SUBNET: &str = "Deleting Kubernetes Subnet";
    pub const DELETE_NETWORK: &str = "Deleting Kubernetes Network";

    pub const CREATE_NODE: &str = "Creating Kubernetes Node";
    pub const WAIT_NODE: &str = "Waiting for Kubernetes Node";
    pub const DELETE_NODE: &str = "Deleting Kubernetes Node";
}

pub(crate) fn poll_policy(settings: &PollSettings) -> PollPolicy {
    PollPolicy::new(settings.interval(), settings.timeout())
}

/// A delete that found nothing to delete still succeeded
fn deleted(result: crate::error::Result<()>) -> Result<()> {
    tolerate_not_found(result.map_err(CloudError::from)).map(|_| ())
}

/// Everything a step needs, borrowed for the lifetime of one procedure
#[derive(Clone, Copy)]
pub struct RecipeContext<'a> {
    pub api: &'a dyn OpenStackApi,
    pub kube: &'a Kube,
    pub settings: &'a OpenStackSettings,
    pub boot: &'a BootConfig,
}

impl<'a> RecipeContext<'a> {
    pub fn resolver(&self) -> OpenStackResolver<'a> {
        OpenStackResolver::new(self.api)
    }

    pub fn subnet_cidr(&self) -> &'a str {
        self.kube
            .openstack_config
            .as_ref()
            .and_then(|c| c.subnet_cidr.as_deref())
            .unwrap_or(&self.settings.subnet_cidr)
    }

    pub fn image_name(&self) -> &'a str {
        self.kube
            .openstack_config
            .as_ref()
            .and_then(|c| c.image_name.as_deref())
            .unwrap_or(&self.settings.image_name)
    }

    pub fn public_network_name(&self) -> Option<&'a str> {
        self.kube
            .openstack_config
            .as_ref()
            .and_then(|c| c.public_network_name.as_deref())
            .or(self.settings.public_network_name.as_deref())
    }

    async fn cluster_network(&self) -> Result<Network> {
        let name = naming::network_name(&self.kube.name);
        require(self.resolver().find_network_by_name(&name).await?, || {
            format!("network {}", name)
        })
    }

    async fn external_network(&self) -> Result<Network> {
        let name = self.public_network_name();
        require(self.resolver().find_external_network(name).await?, || {
            format!("external network {}", name.unwrap_or("(any)"))
        })
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
            provider: "openstack".to_string(),
            master_ip,
        })
    }

    /// Create one instance on the cluster network, tagged with the cluster
    async fn create_server(
        &self,
        name: &str,
        size: &str,
        role: NodeRole,
        master_ip: Option<String>,
    ) -> Result<String> {
        let user_data = self.render_boot(name, size, role, master_ip)?;
        let network = self.cluster_network().await?;
        let server = self
            .api
            .create_server(&CreateServer {
                name: name.to_string(),
                flavor_name: size.to_string(),
                image_name: self.image_name().to_string(),
                network_id: network.id,
                metadata: naming::instance_tags(&self.kube.name, role),
                user_data,
            })
            .await?;
        tracing::info!(server = %server.name, id = %server.id, %role, "Server created");
        Ok(server.id)
    }

    /// Poll until the server is ACTIVE; an ERROR status ends the wait
    async fn wait_for_active(&self, id: &str, name: &str) -> Result<()> {
        let api = self.api;
        let policy = poll_policy(&self.settings.server_active);
        poll_until(&policy, &format!("server {} active", name), move || async move {
            let server = api.get_server(id).await?;
            if server.is_error() {
                return Err(OpenStackError::ServerFault {
                    name: server.name,
                    message: format!("status {}", server.status),
                }
                .into());
            }
            Ok(server.is_active().then_some(()))
        })
        .await
    }
}

/// Network, subnet, router, master, floating IP, minions
pub fn create_kube<'a>(
    ctx: RecipeContext<'a>,
    action: &'a dyn ActionSink,
) -> Procedure<'a, KubeOutputs> {
    let mut procedure = Procedure::new(format!("create kube {}", ctx.kube.name), action);

    procedure.add_step(steps::CREATE_NETWORK, move |_| async move {
        let network = ctx
            .api
            .create_network(&naming::network_name(&ctx.kube.name))
            .await?;
        tracing::info!(network = %network.name, id = %network.id, "Network created");
        Ok(KubeOutputs::default())
    });

    procedure.add_step(steps::CREATE_SUBNET, move |_| async move {
        let network = ctx.cluster_network().await?;
        let subnet = ctx
            .api
            .create_subnet(&CreateSubnet {
                name: naming::subnet_name(&ctx.kube.name),
                network_id: network.id,
                cidr: ctx.subnet_cidr().to_string(),
                ip_version: 4,
                dns_nameservers: ctx.settings.dns_nameservers.clone(),
            })
            .await?;
        tracing::info!(subnet = %subnet.name, cidr = %subnet.cidr, "Subnet created");
        Ok(KubeOutputs::default())
    });

    procedure.add_step(steps::CREATE_ROUTER, move |_| async move {
        let external = ctx.external_network().await?;
        let router = ctx
            .api
            .create_router(&naming::router_name(&ctx.kube.name), &external.id)
            .await?;

        let subnet_name = naming::subnet_name(&ctx.kube.name);
        let subnet = require(ctx.resolver().find_subnet_by_name(&subnet_name).await?, || {
            format!("subnet {}", subnet_name)
        })?;
        ctx.api.add_router_interface(&router.id, &subnet.id).await?;
        tracing::info!(router = %router.name, gateway = %external.name, "Router created");
        Ok(KubeOutputs::default())
    });

    procedure.add_step(steps::CREATE_MASTER, move |_| async move {
        let name = naming::master_name(&ctx.kube.name);
        ctx.create_server(&name, &ctx.kube.master_node_size, NodeRole::Master, None)
            .await?;
        Ok(KubeOutputs::default())
    });

    // the address is only allocated once the master can take it
    procedure.add_step(steps::CREATE_FLOATING_IP, move |_| async move {
        let master = require(
            ctx.resolver()
                .find_cluster_server_by_tag(&ctx.kube.name, ROLE_TAG, NodeRole::Master.as_str())
                .await?,
            || format!("master of {}", ctx.kube.name),
        )?;
        ctx.wait_for_active(&master.id, &master.name).await?;

        let external = ctx.external_network().await?;
        let floating_ip = ctx.api.create_floating_ip(&external.id).await?;
        if let Err(err) = ctx
            .api
            .associate_floating_ip(&master.id, &floating_ip.floating_ip_address)
            .await
        {
            if let Err(release) = ctx.api.delete_floating_ip(&floating_ip.id).await {
                tracing::warn!(
                    address = %floating_ip.floating_ip_address,
                    error = %release,
                    "Could not release unassociated floating IP"
                );
            }
            return Err(err.into());
        }
        tracing::info!(
            server = %master.name,
            address = %floating_ip.floating_ip_address,
            "Floating IP associated"
        );
        Ok(KubeOutputs {
            master_public_ip: Some(floating_ip.floating_ip_address),
        })
    });

    procedure.add_step(steps::CREATE_MINION, move |outputs: KubeOutputs| async move {
        let name = naming::minion_name(&ctx.kube.name);
        for size in ctx.kube.minion_sizes() {
            ctx.create_server(&name, size, NodeRole::Minion, outputs.master_public_ip.clone())
                .await?;
        }
        Ok(KubeOutputs::default())
    });

    procedure
}

/// Floating IP, servers, router, subnet, network; each may already be gone
pub fn delete_kube<'a>(ctx: RecipeContext<'a>, action: &'a dyn ActionSink) -> Procedure<'a, ()> {
    let mut procedure = Procedure::new(format!("delete kube {}", ctx.kube.name), action);

    procedure.add_step(steps::DELETE_FLOATING_IP, move |_| async move {
        let Some(address) = ctx.kube.master_public_ip.as_deref() else {
            tracing::debug!("No public address recorded");
            return Ok(());
        };
        match ctx.resolver().find_floating_ip_by_address(address).await? {
            Some(floating_ip) => deleted(ctx.api.delete_floating_ip(&floating_ip.id).await),
            None => Ok(()),
        }
    });

    procedure.add_step(steps::DELETE_SERVERS, move |_| async move {
        let resolver = ctx.resolver();
        let cluster = ctx.kube.name.as_str();
        let servers = resolver.list_servers_by_tag(CLUSTER_TAG, cluster).await?;
        if servers.is_empty() {
            return Ok(());
        }

        for server in &servers {
            tracing::info!(server = %server.name, id = %server.id, "Deleting server");
            deleted(ctx.api.delete_server(&server.id).await)?;
        }

        // ports must be released before the router and network can go
        let policy = poll_policy(&ctx.settings.server_deleted);
        poll_until(&policy, &format!("servers of {} deleted", cluster), move || async move {
            let remaining = resolver.list_servers_by_tag(CLUSTER_TAG, cluster).await?;
            Ok(remaining.is_empty().then_some(()))
        })
        .await
    });

    procedure.add_step(steps::DELETE_ROUTER, move |_| async move {
        let resolver = ctx.resolver();
        let Some(router) = resolver
            .find_router_by_name(&naming::router_name(&ctx.kube.name))
            .await?
        else {
            return Ok(());
        };
        if let Some(subnet) = resolver
            .find_subnet_by_name(&naming::subnet_name(&ctx.kube.name))
            .await?
        {
            deleted(ctx.api.remove_router_interface(&router.id, &subnet.id).await)?;
        }
        deleted(ctx.api.delete_router(&router.id).await)
    });

    procedure.add_step(steps::DELETE_SUBNET, move |_| async move {
        match ctx
            .resolver()
            .find_subnet_by_name(&naming::subnet_name(&ctx.kube.name))
            .await?
        {
            Some(subnet) => deleted(ctx.api.delete_subnet(&subnet.id).await),
            None => Ok(()),
        }
    });

    procedure.add_step(steps::DELETE_NETWORK, move |_| async move {
        match ctx
            .resolver()
            .find_network_by_name(&naming::network_name(&ctx.kube.name))
            .await?
        {
            Some(network) => deleted(ctx.api.delete_network(&network.id).await),
            None => Ok(()),
        }
    });

    procedure
}

/// One more minion on an existing cluster
pub fn create_node<'a>(
    ctx: RecipeContext<'a>,
    node: &'a Node,
    action: &'a dyn ActionSink,
) -> Procedure<'a, NodeOutputs> {
    let mut procedure = Procedure::new(format!("create node {}", node.name), action);

    procedure.add_step(steps::CREATE_NODE, move |_| async move {
        let id = ctx
            .create_server(&node.name, &node.size, node.role, ctx.kube.master_public_ip.clone())
            .await?;
        Ok(NodeOutputs {
            provider_id: Some(id),
            ..Default::default()
        })
    });

    procedure.add_step(steps::WAIT_NODE, move |outputs: NodeOutputs| async move {
        let id = require(outputs.provider_id, || format!("server {}", node.name))?;
        ctx.wait_for_active(&id, &node.name).await?;
        Ok(NodeOutputs::default())
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
            .find_cluster_server_by_name(&ctx.kube.name, &node.name)
            .await?
        {
            Some(server) => deleted(ctx.api.delete_server(&server.id).await),
            None => Ok(()),
        }
    });

    procedure
}
