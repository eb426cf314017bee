//! DigitalOcean provider implementation

use crate::api::{Connector, DigitalOceanApi};
use crate::http::HttpConnector;
use crate::recipe::{self, RecipeContext};
use async_trait::async_trait;
use kubeprov_cloud::{
    ActionSink, BootConfig, CloudAccount, CloudError, DigitalOceanKubeConfig, Entrypoint,
    EntrypointListener, EntrypointOutputs, FlexVolume, Kube, KubeOutputs, Node, NodeOutputs,
    Provider, ProviderKind, Result, Volume, VolumeMount, VolumeOutputs,
};
use kubeprov_config::DigitalOceanSettings;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Flex-volume driver name for DigitalOcean block storage
pub const VOLUME_DRIVER: &str = "kubeprov.io/digitalocean";

/// DigitalOcean provider
pub struct DigitalOceanProvider {
    connector: Arc<dyn Connector>,
    settings: DigitalOceanSettings,
    boot: BootConfig,
}

impl DigitalOceanProvider {
    pub fn new(connector: Arc<dyn Connector>, settings: DigitalOceanSettings) -> Result<Self> {
        Ok(Self {
            connector,
            settings,
            boot: BootConfig::builtin()?,
        })
    }

    /// Provider talking to the DigitalOcean API at `settings.api_base`
    pub fn http(settings: DigitalOceanSettings) -> Result<Self> {
        let connector = Arc::new(HttpConnector::new(
            settings.api_base.clone(),
            settings.page_size,
        ));
        Self::new(connector, settings)
    }

    pub fn with_boot_config(mut self, boot: BootConfig) -> Self {
        self.boot = boot;
        self
    }

    pub fn settings(&self) -> &DigitalOceanSettings {
        &self.settings
    }

    fn connect(&self, account: &CloudAccount) -> Result<Arc<dyn DigitalOceanApi>> {
        Ok(self.connector.connect(&account.credentials)?)
    }

    fn config(kube: &Kube) -> Result<&DigitalOceanKubeConfig> {
        kube.digitalocean_config
            .as_ref()
            .filter(|c| !c.region.is_empty())
            .ok_or_else(|| {
                CloudError::InvalidConfig(format!(
                    "cluster {} has no DigitalOcean region",
                    kube.name
                ))
            })
    }

    fn context<'a>(
        &'a self,
        api: &'a dyn DigitalOceanApi,
        kube: &'a Kube,
        config: &'a DigitalOceanKubeConfig,
    ) -> RecipeContext<'a> {
        RecipeContext {
            api,
            kube,
            config,
            settings: &self.settings,
            boot: &self.boot,
        }
    }
}

#[async_trait]
impl Provider for DigitalOceanProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DigitalOcean
    }

    #[tracing::instrument(skip(self, account), fields(account = %account.name))]
    async fn validate_account(&self, account: &CloudAccount) -> Result<()> {
        let api = self.connect(account)?;
        api.account_status().await?;
        tracing::info!("DigitalOcean token accepted");
        Ok(())
    }

    #[tracing::instrument(skip(self, kube, action), fields(kube = %kube.name))]
    async fn create_kube(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()> {
        let spec = kube.clone();
        let config = Self::config(&spec)?;
        let api = self.connect(&spec.cloud_account)?;
        let procedure = recipe::create_kube(self.context(api.as_ref(), &spec, config), action);

        let mut outputs = KubeOutputs::default();
        let result = procedure.run(&mut outputs).await;
        outputs.apply_to(kube);
        result
    }

    #[tracing::instrument(skip(self, kube, action), fields(kube = %kube.name))]
    async fn delete_kube(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()> {
        let spec = kube.clone();
        let config = Self::config(&spec)?;
        let api = self.connect(&spec.cloud_account)?;
        recipe::delete_kube(self.context(api.as_ref(), &spec, config), action)
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
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let spec = node.clone();
        let ctx = self.context(api.as_ref(), kube, config);
        let procedure = recipe::create_node(ctx, &spec, action);

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
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let spec = node.clone();
        recipe::delete_node(self.context(api.as_ref(), kube, config), &spec, action)
            .run(&mut ())
            .await?;
        node.provider_id = None;
        node.public_ip = None;
        Ok(())
    }

    #[tracing::instrument(
        skip(self, kube, volume, action),
        fields(kube = %kube.name, volume = %volume.name)
    )]
    async fn create_volume(
        &self,
        kube: &Kube,
        volume: &mut Volume,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let spec = volume.clone();
        let ctx = self.context(api.as_ref(), kube, config);
        let procedure = recipe::create_volume(ctx, &spec, action);

        let mut outputs = VolumeOutputs::default();
        let result = procedure.run(&mut outputs).await;
        outputs.apply_to(volume);
        result
    }

    #[tracing::instrument(
        skip(self, kube, volume, action),
        fields(kube = %kube.name, volume = %volume.name)
    )]
    async fn resize_volume(
        &self,
        kube: &Kube,
        volume: &mut Volume,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let spec = volume.clone();
        let ctx = self.context(api.as_ref(), kube, config);
        let procedure = recipe::resize_volume(ctx, &spec, action);

        let mut outputs = VolumeOutputs::default();
        let result = procedure.run(&mut outputs).await;
        outputs.apply_to(volume);
        result
    }

    /// A freshly created volume can take a while to be readable; 404 keeps
    /// the wait going until `volume_available` runs out.
    #[tracing::instrument(
        skip(self, kube, volume),
        fields(kube = %kube.name, volume = %volume.name)
    )]
    async fn wait_for_volume_available(&self, kube: &Kube, volume: &Volume) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let ctx = self.context(api.as_ref(), kube, config);

        let id = match &volume.provider_id {
            Some(id) => id.clone(),
            None => ctx
                .resolver()
                .find_cluster_volume_by_name(&kube.name, &volume.name)
                .await?
                .map(|v| v.id)
                .ok_or_else(|| CloudError::NotFound(format!("volume {}", volume.name)))?,
        };
        ctx.wait_for_volume(&id, &volume.name).await
    }

    #[tracing::instrument(
        skip(self, kube, volume, action),
        fields(kube = %kube.name, volume = %volume.name)
    )]
    async fn delete_volume(
        &self,
        kube: &Kube,
        volume: &mut Volume,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let spec = volume.clone();
        recipe::delete_volume(self.context(api.as_ref(), kube, config), &spec, action)
            .run(&mut ())
            .await?;
        volume.provider_id = None;
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

    #[tracing::instrument(
        skip(self, kube, entrypoint, action),
        fields(kube = %kube.name, entrypoint = %entrypoint.name)
    )]
    async fn create_entrypoint(
        &self,
        kube: &Kube,
        entrypoint: &mut Entrypoint,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let spec = entrypoint.clone();
        let procedure =
            recipe::create_entrypoint(self.context(api.as_ref(), kube, config), &spec, action);

        let mut outputs = EntrypointOutputs::default();
        let result = procedure.run(&mut outputs).await;
        outputs.apply_to(entrypoint);
        result
    }

    #[tracing::instrument(
        skip(self, kube, entrypoint, action),
        fields(kube = %kube.name, entrypoint = %entrypoint.name)
    )]
    async fn delete_entrypoint(
        &self,
        kube: &Kube,
        entrypoint: &mut Entrypoint,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let spec = entrypoint.clone();
        recipe::delete_entrypoint(self.context(api.as_ref(), kube, config), &spec, action)
            .run(&mut ())
            .await?;
        entrypoint.provider_id = None;
        entrypoint.address = None;
        Ok(())
    }

    #[tracing::instrument(
        skip(self, kube, listener, action),
        fields(kube = %kube.name, listener = %listener.name)
    )]
    async fn create_entrypoint_listener(
        &self,
        kube: &Kube,
        listener: &EntrypointListener,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let ctx = self.context(api.as_ref(), kube, config);
        recipe::create_entrypoint_listener(ctx, listener, action)
            .run(&mut ())
            .await
    }

    #[tracing::instrument(
        skip(self, kube, listener, action),
        fields(kube = %kube.name, listener = %listener.name)
    )]
    async fn delete_entrypoint_listener(
        &self,
        kube: &Kube,
        listener: &EntrypointListener,
        action: &dyn ActionSink,
    ) -> Result<()> {
        let config = Self::config(kube)?;
        let api = self.connect(&kube.cloud_account)?;
        let ctx = self.context(api.as_ref(), kube, config);
        recipe::delete_entrypoint_listener(ctx, listener, action)
            .run(&mut ())
            .await
    }
}
