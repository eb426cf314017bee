//! Entry points used by account and cluster management
//!
//! [`CloudAccounts`] validates credentials through the account's provider
//! before anything is persisted. [`KubeGateway`] drives cluster creation and
//! teardown and keeps at most one of them in flight per cluster.

use crate::action::ActionSink;
use crate::error::{CloudError, Result};
use crate::model::{CloudAccount, Kube};
use crate::registry::ProviderRegistry;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Persistence seam for cloud accounts
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Store a validated account, assigning its id
    async fn create(&self, account: &mut CloudAccount) -> Result<()>;
}

/// Account creation guarded by provider-side credential validation
pub struct CloudAccounts<S> {
    registry: Arc<ProviderRegistry>,
    store: S,
}

impl<S: AccountStore> CloudAccounts<S> {
    pub fn new(registry: Arc<ProviderRegistry>, store: S) -> Self {
        Self { registry, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate the credentials, then persist the account.
    ///
    /// An unknown provider or a failed validation returns before the store
    /// is touched.
    #[tracing::instrument(
        skip(self, account),
        fields(account = %account.name, provider = %account.provider)
    )]
    pub async fn create(&self, account: &mut CloudAccount) -> Result<()> {
        let provider = self.registry.for_account(account)?;

        if let Err(e) = provider.validate_account(account).await {
            tracing::warn!(error = %e, "Account validation failed");
            return Err(match e {
                CloudError::Validation(_) => e,
                other => CloudError::Validation(other.to_string()),
            });
        }

        self.store.create(account).await?;
        tracing::info!(id = ?account.id, "Account created");
        Ok(())
    }
}

/// Cluster lifecycle calls, one in-flight operation per cluster
pub struct KubeGateway {
    registry: Arc<ProviderRegistry>,
    in_flight: Mutex<HashSet<String>>,
}

impl KubeGateway {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    #[tracing::instrument(skip(self, kube, action), fields(kube = %kube.name))]
    pub async fn create(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()> {
        let _guard = self.claim(kube)?;
        let provider = self.registry.for_account(&kube.cloud_account)?;
        provider.create_kube(kube, action).await
    }

    #[tracing::instrument(skip(self, kube, action), fields(kube = %kube.name))]
    pub async fn delete(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()> {
        let _guard = self.claim(kube)?;
        let provider = self.registry.for_account(&kube.cloud_account)?;
        provider.delete_kube(kube, action).await
    }

    /// Whether an operation on this cluster is currently running
    pub fn is_busy(&self, kube: &Kube) -> bool {
        self.lock().contains(&cluster_key(kube))
    }

    fn claim(&self, kube: &Kube) -> Result<InFlight<'_>> {
        let key = cluster_key(kube);
        if !self.lock().insert(key.clone()) {
            return Err(CloudError::ClusterBusy(kube.name.clone()));
        }
        Ok(InFlight { gateway: self, key })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cluster names are unique per account
fn cluster_key(kube: &Kube) -> String {
    format!("{}/{}", kube.cloud_account.name, kube.name)
}

struct InFlight<'a> {
    gateway: &'a KubeGateway,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.gateway.lock().remove(&self.key);
    }
}
