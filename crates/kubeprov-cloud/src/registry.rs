//! Provider dispatch
//!
//! Maps every [`ProviderKind`] to a provider instance. The registry is built
//! from a function over the closed kind set, so every kind is always present;
//! only an unparseable discriminator can fail, and it fails with
//! [`CloudError::UnknownProvider`].

use crate::error::{CloudError, Result};
use crate::model::{CloudAccount, ProviderKind};
use crate::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Build the registry by asking `build` for each provider kind
    pub fn from_fn<F>(mut build: F) -> Self
    where
        F: FnMut(ProviderKind) -> Arc<dyn Provider>,
    {
        let providers = ProviderKind::ALL
            .into_iter()
            .map(|kind| (kind, build(kind)))
            .collect();
        Self { providers }
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| CloudError::UnknownProvider(kind.to_string()))
    }

    /// Provider for a discriminator string such as `"openstack"`
    pub fn resolve(&self, provider: &str) -> Result<Arc<dyn Provider>> {
        self.get(provider.parse()?)
    }

    pub fn for_account(&self, account: &CloudAccount) -> Result<Arc<dyn Provider>> {
        self.resolve(&account.provider)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
    }
}
