//! OpenStack provider implementation

use crate::api::{Connector, OpenStackApi};
use crate::http::HttpConnector;
use crate::recipe::{self, RecipeContext};
use async_trait::async_trait;
use kubeprov_cloud::{
    ActionSink, BootConfig, CloudAccount, FlexVolume, Kube, KubeOutputs, Node, NodeOutputs,
    Provider, ProviderKind, Result, Volume, VolumeMount,
};
use kubeprov_config::OpenStackSettings;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flex-volume driver name for OpenStack volumes
pub const VOLUME_DRIVER: &str = "kubeprov.io/openstack";

/// OpenStack provider
///
/// Volumes and entrypoints are not implemented for OpenStack and fail with
/// `CloudError::Unsupported`.
pub struct OpenStackProvider {
    connector: Arc<dyn Connector>,
    settings: OpenStackSettings,
    boot: BootConfig,
}

impl OpenStackProvider {
    pub fn new(connector: Arc<dyn Connector>, settings: OpenStackSettings) -> Result<Self> {
        Ok(Self {
            connector,
            settings,
            boot: BootConfig::builtin()?,
        })
    }

    /// Provider talking to real OpenStack endpoints
    pub fn http(settings: OpenStackSettings) -> Result<Self> {
        let connector = Arc::new(HttpConnector::new(settings.page_size));
        Self::new(connector, settings)
    }

    pub fn with_boot_config(mut self, boot: BootConfig) -> Self {
        self.boot = boot;
        self
    }

    pub fn settings(&self) -> &OpenStackSettings {
        &self.settings
    }

    async fn connect(&self, account: &CloudAccount, region: &str) -> Result<Arc<dyn OpenStackApi>> {
        Ok(self.connector.connect(&account.credentials, region).await?)
    }

    /// Cluster region, falling back to the account's `region` credential
    async fn connect_kube(&self, kube: &Kube) -> Result<Arc<dyn OpenStackApi>> {
        let region = kube
            .openstack_config
            .as_ref()
            .map(|c| c.region.as_str())
            .filter(|r| !r.is_empty())
            .or_else(|| kube.cloud_account.credential("region"))
            .unwrap_or_default();
        self.connect(&kube.cloud_account, region).await
    }

    fn context<'a>(&'a self, api: &'a dyn OpenStackApi, kube: &'a Kube) -> RecipeContext<'a> {
        RecipeContext {
            api,
            kube,
            settings: &self.settings,
            boot: &self.boot,
        }
    }
}

#[async_trait]
impl Provider for OpenStackProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenStack
    }

    /// Authenticating is the validation: it proves the endpoint, the
    /// credentials and the tenant are all accepted.
    #[tracing::instrument(skip(self, account), fields(account = %account.name))]
    async fn validate_account(&self, account: &CloudAccount) -> Result<()> {
        let region = account.credential("region").unwrap_or_default();
        self.connect(account, region).await?;
        tracing::info!("OpenStack credentials accepted");
        Ok(())
    }

    #[tracing::instrument(skip(self, kube, action), fields(kube = %kube.name))]
    async fn create_kube(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()> {
        let api = self.connect_kube(kube).await?;
        let spec = kube.clone();
        let procedure = recipe::create_kube(self.context(api.as_ref(), &spec), action);

        let mut outputs = KubeOutputs::default();
        let result = procedure.run(&mut outputs).await;
        outputs.apply_to(kube);
        result
    }

    #[tracing::instrument(skip(self, kube, action), fields(kube = %kube.name))]
    async fn delete_kube(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()> {
        let api = self.connect_kube(kube).await?;
        let spec = kube.clone();
        recipe::delete_kube(self.context(api.as_ref(), &spec), action)
            .run(&mut ())
            .await?;
        kube.master_public_ip = None;
        Ok(())
    }

    #[tracing::instrument(
        skip(self, kube, node, action),
        fields(kube = %kube.name, node = %node.name)
    )]
    async fn create_node(
        &self,
        kube: &Kube,
        node: &mut Node,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let api = self.connect_kube(kube).await?;
        let spec = node.clone();
        let procedure = recipe::create_node(self.context(api.as_ref(), kube), &spec, action);

        let mut outputs = NodeOutputs::default();
        let result = procedure.run(&mut outputs).await;
        outputs.apply_to(node);
        result
    }

    #[tracing::instrument(
        skip(self, kube, node, action),
        fields(kube = %kube.name, node = %node.name)
    )]
    async fn delete_node(
        &self,
        kube: &Kube,
        node: &mut Node,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let api = self.connect_kube(kube).await?;
        let spec = node.clone();
        recipe::delete_node(self.context(api.as_ref(), kube), &spec, action)
            .run(&mut ())
            .await?;
        node.provider_id = None;
        node.public_ip = None;
        Ok(())
    }

    fn kubernetes_volume_definition(&self, volume: &Volume) -> VolumeMount {
        let mut options = BTreeMap::new();
        options.insert(
            "volumeID".to_string(),
            volume.provider_id.clone().unwrap_or_default(),
        );
        options.insert("name".to_string(), volume.name.clone());
        VolumeMount {
            name: volume.name.clone(),
            flex_volume: FlexVolume {
                driver: VOLUME_DRIVER.to_string(),
                fs_type: "ext4".to_string(),
                options,
            },
        }
    }
}
