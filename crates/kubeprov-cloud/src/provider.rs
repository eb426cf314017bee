//! Cloud provider trait definition

use crate::action::ActionSink;
use crate::error::{CloudError, Result};
use crate::model::{
    CloudAccount, Entrypoint, EntrypointListener, Kube, Node, ProviderKind, Volume, VolumeMount,
};
use async_trait::async_trait;

/// Cloud provider abstraction trait
///
/// Every backend (OpenStack, DigitalOcean, ...) implements this trait so that
/// accounts and clusters are handled the same way whatever the cloud. Cluster
/// operations build and run a [`Procedure`](crate::Procedure) and report each
/// step to the given action.
///
/// Capabilities a backend does not have keep the default bodies, which fail
/// with [`CloudError::Unsupported`] instead of silently succeeding.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Returns the provider name (e.g., "openstack", "digitalocean")
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Prove the credentials work with one cheap authenticated call
    async fn validate_account(&self, account: &CloudAccount) -> Result<()>;

    /// Provision every resource of the cluster, recording discovered fields
    async fn create_kube(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()>;

    /// Tear down whatever resources of the cluster exist
    async fn delete_kube(&self, kube: &mut Kube, action: &dyn ActionSink) -> Result<()>;

    async fn create_node(
        &self,
        _kube: &Kube,
        _node: &mut Node,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "create_node"))
    }

    async fn delete_node(
        &self,
        _kube: &Kube,
        _node: &mut Node,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "delete_node"))
    }

    async fn create_volume(
        &self,
        _kube: &Kube,
        _volume: &mut Volume,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "create_volume"))
    }

    async fn resize_volume(
        &self,
        _kube: &Kube,
        _volume: &mut Volume,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "resize_volume"))
    }

    /// Block until the volume can be attached; the backend owns the timeout
    async fn wait_for_volume_available(&self, _kube: &Kube, _volume: &Volume) -> Result<()> {
        Err(unsupported(self.kind(), "wait_for_volume_available"))
    }

    async fn delete_volume(
        &self,
        _kube: &Kube,
        _volume: &mut Volume,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "delete_volume"))
    }

    /// In-cluster mount definition for a volume. No I/O.
    fn kubernetes_volume_definition(&self, volume: &Volume) -> VolumeMount;

    async fn create_entrypoint(
        &self,
        _kube: &Kube,
        _entrypoint: &mut Entrypoint,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "create_entrypoint"))
    }

    async fn delete_entrypoint(
        &self,
        _kube: &Kube,
        _entrypoint: &mut Entrypoint,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "delete_entrypoint"))
    }

    async fn create_entrypoint_listener(
        &self,
        _kube: &Kube,
        _listener: &EntrypointListener,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "create_entrypoint_listener"))
    }

    async fn delete_entrypoint_listener(
        &self,
        _kube: &Kube,
        _listener: &EntrypointListener,
        _action: &dyn ActionSink,
    ) -> Result<()> {
        Err(unsupported(self.kind(), "delete_entrypoint_listener"))
    }
}

/// Error for a capability the backend does not implement
pub fn unsupported(kind: ProviderKind, operation: &'static str) -> CloudError {
    CloudError::Unsupported {
        provider: kind.to_string(),
        operation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::RecordingAction;
    use crate::model::FlexVolume;

    struct Bare;

    #[async_trait]
    impl Provider for Bare {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenStack
        }

        async fn validate_account(&self, _account: &CloudAccount) -> Result<()> {
            Ok(())
        }

        async fn create_kube(&self, _kube: &mut Kube, _action: &dyn ActionSink) -> Result<()> {
            Ok(())
        }

        async fn delete_kube(&self, _kube: &mut Kube, _action: &dyn ActionSink) -> Result<()> {
            Ok(())
        }

        fn kubernetes_volume_definition(&self, volume: &Volume) -> VolumeMount {
            VolumeMount {
                name: volume.name.clone(),
                flex_volume: FlexVolume {
                    driver: "test".into(),
                    fs_type: "ext4".into(),
                    options: Default::default(),
                },
            }
        }
    }

    #[tokio::test]
    async fn test_default_operations_are_unsupported() {
        let provider = Bare;
        let kube = Kube::new("demo", CloudAccount::new("lab", "openstack"), "m1.small");
        let action = RecordingAction::new();
        let mut volume = Volume::new("data", 10);

        let err = provider
            .create_volume(&kube, &mut volume, &action)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CloudError::Unsupported {
                ref provider,
                operation: "create_volume"
            } if provider == "openstack"
        ));
        assert_eq!(err.to_string(), "openstack does not support create_volume");

        let mut node = Node::new("demo-minion-2", "m1.small");
        assert!(matches!(
            provider.create_node(&kube, &mut node, &action).await,
            Err(CloudError::Unsupported { operation: "create_node", .. })
        ));
        assert!(provider.wait_for_volume_available(&kube, &volume).await.is_err());
    }
}
