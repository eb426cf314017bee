//! Node boot configuration rendering
//!
//! Master and minion instances boot from a cloud-config payload rendered with
//! Tera from the cluster parameters. The built-in templates only bring up the
//! kubelet; deployments that need more register their own.

use crate::error::Result;
use crate::model::NodeRole;
use serde::Serialize;
use tera::{Context, Tera};

const MASTER_TEMPLATE: &str = "master.cloud-config";
const MINION_TEMPLATE: &str = "minion.cloud-config";

/// Built-in master cloud-config
pub const MASTER_CLOUD_CONFIG: &str = r#"#cloud-config
hostname: {{ node_name }}
write_files:
  - path: /etc/kubernetes/cluster.env
    permissions: "0644"
    content: |
      CLUSTER_NAME={{ cluster_name }}
      NODE_ROLE=master
      NODE_SIZE={{ node_size }}
      PROVIDER={{ provider }}
runcmd:
  - systemctl enable --now kubelet
  - kubeadm init --node-name {{ node_name }} --token-ttl 0
"#;

/// Built-in minion cloud-config
pub const MINION_CLOUD_CONFIG: &str = r#"#cloud-config
hostname: {{ node_name }}
write_files:
  - path: /etc/kubernetes/cluster.env
    permissions: "0644"
    content: |
      CLUSTER_NAME={{ cluster_name }}
      NODE_ROLE=minion
      NODE_SIZE={{ node_size }}
      PROVIDER={{ provider }}
{%- if master_ip %}
      MASTER_IP={{ master_ip }}
{%- endif %}
runcmd:
  - systemctl enable --now kubelet
{%- if master_ip %}
  - kubeadm join {{ master_ip }}:6443 --discovery-token-unsafe-skip-ca-verification
{%- endif %}
"#;

/// Parameters available to boot templates
#[derive(Debug, Clone, Serialize)]
pub struct BootParams {
    pub cluster_name: String,
    pub node_name: String,
    pub node_size: String,
    pub role: NodeRole,
    pub provider: String,
    pub master_ip: Option<String>,
}

/// Renders boot payloads for master and minion instances
#[derive(Debug, Clone)]
pub struct BootConfig {
    tera: Tera,
}

impl BootConfig {
    /// Renderer using the built-in templates
    pub fn builtin() -> Result<Self> {
        Self::with_templates(MASTER_CLOUD_CONFIG, MINION_CLOUD_CONFIG)
    }

    /// Renderer using caller-supplied template sources
    pub fn with_templates(master: &str, minion: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![(MASTER_TEMPLATE, master), (MINION_TEMPLATE, minion)])?;
        Ok(Self { tera })
    }

    pub fn render(&self, params: &BootParams) -> Result<String> {
        let template = match params.role {
            NodeRole::Master => MASTER_TEMPLATE,
            NodeRole::Minion => MINION_TEMPLATE,
        };
        let context = Context::from_serialize(params)?;
        let rendered = self.tera.render(template, &context)?;
        tracing::debug!(
            cluster = %params.cluster_name,
            node = %params.node_name,
            bytes = rendered.len(),
            "Rendered boot configuration"
        );
        Ok(rendered)
    }
}
