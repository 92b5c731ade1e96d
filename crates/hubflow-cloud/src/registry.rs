//! Device-registry client trait

use crate::connection::DeviceRegistryConnection;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A device identity to import into the registry
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceRegistration {
    pub device_id: String,
    pub primary_key: String,
    pub secondary_key: String,
    /// Register as an edge device
    pub edge: bool,
}

impl std::fmt::Debug for DeviceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistration")
            .field("device_id", &self.device_id)
            .field("edge", &self.edge)
            .finish_non_exhaustive()
    }
}

/// Response to a device creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created,
    /// The device id is already registered
    Conflict,
}

/// Data-plane client of a device registry
#[async_trait]
pub trait DeviceRegistryClient: Send + Sync {
    /// Create a device identity with the given symmetric keys
    async fn create_device(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<RegistrationOutcome>;

    /// Merge `tags` into the device twin
    async fn update_twin(&self, device_id: &str, tags: &serde_json::Value) -> Result<()>;
}

#[async_trait]
impl<T: DeviceRegistryClient + ?Sized> DeviceRegistryClient for Arc<T> {
    async fn create_device(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<RegistrationOutcome> {
        (**self).create_device(registration).await
    }

    async fn update_twin(&self, device_id: &str, tags: &serde_json::Value) -> Result<()> {
        (**self).update_twin(device_id, tags).await
    }
}

/// Opens a registry client from a registry connection string
pub trait RegistryConnector: Send + Sync {
    fn connect(
        &self,
        connection: &DeviceRegistryConnection,
    ) -> Result<Box<dyn DeviceRegistryClient>>;
}
