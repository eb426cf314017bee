//! kubeprov
//!
//! Provisions and tears down Kubernetes clusters on OpenStack and
//! DigitalOcean. This crate wires the backends into one
//! [`ProviderRegistry`] built from operator [`Settings`]; accounts and
//! clusters are then driven through [`CloudAccounts`] and [`KubeGateway`].
//!
//! ```ignore
//! use kubeprov::{KubeGateway, LogAction};
//! use std::sync::Arc;
//!
//! let (_settings, registry) = kubeprov::registry_from_env()?;
//! let gateway = KubeGateway::new(Arc::new(registry));
//! gateway.create(&mut kube, &LogAction::new("create demo")).await?;
//! ```

use std::sync::Arc;
use thiserror::Error;

pub use kubeprov_cloud::{
    AccountStore, ActionSink, CloudAccount, CloudAccounts, CloudError, Entrypoint,
    EntrypointListener, Kube, KubeGateway, LogAction, Node, Provider, ProviderKind,
    ProviderRegistry, RecordingAction, Volume, VolumeMount,
};
pub use kubeprov_cloud_digitalocean::{DigitalOceanProvider, InMemoryDigitalOcean};
pub use kubeprov_cloud_openstack::{InMemoryOpenStack, OpenStackProvider};
pub use kubeprov_config::{ConfigError, Settings};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Registry over the given providers, one per kind
fn assemble(
    openstack: Arc<dyn Provider>,
    digitalocean: Arc<dyn Provider>,
) -> ProviderRegistry {
    ProviderRegistry::from_fn(|kind| match kind {
        ProviderKind::OpenStack => openstack.clone(),
        ProviderKind::DigitalOcean => digitalocean.clone(),
    })
}

/// Registry whose providers talk to the real cloud APIs
pub fn registry(settings: &Settings) -> Result<ProviderRegistry> {
    settings.validate()?;
    let openstack = OpenStackProvider::http(settings.openstack.clone())?;
    let digitalocean = DigitalOceanProvider::http(settings.digitalocean.clone())?;
    tracing::debug!(
        digitalocean_api = %settings.digitalocean.api_base,
        "Provider registry ready"
    );
    Ok(assemble(Arc::new(openstack), Arc::new(digitalocean)))
}

/// Load settings the usual way (see [`kubeprov_config::load`]) and build
/// the registry from them
pub fn registry_from_env() -> Result<(Settings, ProviderRegistry)> {
    let settings = kubeprov_config::load()?;
    let registry = registry(&settings)?;
    Ok((settings, registry))
}

/// Providers backed by in-memory clouds, for dry runs
pub struct DryRun {
    pub registry: ProviderRegistry,
    pub openstack: Arc<InMemoryOpenStack>,
    pub digitalocean: Arc<InMemoryDigitalOcean>,
}

impl DryRun {
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let openstack = Arc::new(InMemoryOpenStack::new());
        let digitalocean = Arc::new(InMemoryDigitalOcean::new());

        let openstack_provider = OpenStackProvider::new(
            Arc::new(kubeprov_cloud_openstack::InMemoryConnector::new(openstack.clone())),
            settings.openstack.clone(),
        )?;
        let digitalocean_provider = DigitalOceanProvider::new(
            Arc::new(kubeprov_cloud_digitalocean::InMemoryConnector::new(
                digitalocean.clone(),
            )),
            settings.digitalocean.clone(),
        )?;

        Ok(Self {
            registry: assemble(Arc::new(openstack_provider), Arc::new(digitalocean_provider)),
            openstack,
            digitalocean,
        })
    }
}
