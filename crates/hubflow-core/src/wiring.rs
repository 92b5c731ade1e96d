//! Credential wiring
//!
//! Reads keys and endpoints back from provisioned resources and turns them
//! into the named settings the function host is configured with.

use crate::error::{DeployError, Result};
use hubflow_cloud::{
    AccessKey, ControlPlane, DeviceRegistryConnection, ProvisionResult, REGISTRY_OWNER_POLICY,
    ResourceDescriptor, ResourceKind, document_store_connection_string,
    storage_connection_string,
};
use serde_json::{Value, json};

pub const STORAGE_SETTING: &str = "AzureWebJobsStorage";
pub const CONTENT_STORAGE_SETTING: &str = "WEBSITE_CONTENTAZUREFILECONNECTIONSTRING";
pub const DOCUMENT_STORE_SETTING_SUFFIX: &str = "_DOCUMENTDB";
pub const REGISTRY_SETTING_SUFFIX: &str = "_IOTHUB";

const RUNTIME_SETTINGS: [(&str, &str); 3] = [
    ("FUNCTIONS_EXTENSION_VERSION", "~3"),
    ("FUNCTIONS_WORKER_RUNTIME", "node"),
    ("WEBSITE_NODE_DEFAULT_VERSION", "~14"),
];

/// Setting name of a document store's connection string
pub fn document_store_setting(store_name: &str) -> String {
    format!("{}{}", store_name, DOCUMENT_STORE_SETTING_SUFFIX)
}

/// Setting name of a device registry's connection string
pub fn registry_setting(registry_name: &str) -> String {
    format!("{}{}", registry_name, REGISTRY_SETTING_SUFFIX)
}

/// Ordered host settings. Built fresh per run, never persisted.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WiredConfiguration {
    settings: Vec<(String, String)>,
}

impl WiredConfiguration {
    fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.settings.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.settings.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.settings.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// `[{ "name": ..., "value": ... }]` as the host's site configuration expects
    pub fn to_app_settings(&self) -> Value {
        Value::Array(
            self.settings
                .iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect(),
        )
    }
}

impl std::fmt::Debug for WiredConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WiredConfiguration")
            .field("settings", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

pub struct CredentialWirer<'a> {
    cloud: &'a dyn ControlPlane,
}

impl<'a> CredentialWirer<'a> {
    pub fn new(cloud: &'a dyn ControlPlane) -> Self {
        Self { cloud }
    }

    /// Registry connection over the owner policy's secondary key
    pub async fn registry_connection(
        &self,
        registry: &ResourceDescriptor,
    ) -> Result<DeviceRegistryConnection> {
        expect_kind(registry, ResourceKind::DeviceRegistry)?;
        let host_name = self.endpoint(registry).await?;
        let keys = self.keys(registry).await?;
        let key = named_key(&keys, "secondaryKey", registry)?;
        Ok(DeviceRegistryConnection::new(
            host_name,
            REGISTRY_OWNER_POLICY,
            key,
        ))
    }

    /// Document-store connection over its primary master key
    pub async fn document_store_connection(&self, store: &ResourceDescriptor) -> Result<String> {
        expect_kind(store, ResourceKind::DocumentStore)?;
        let endpoint = self.endpoint(store).await?;
        let keys = self.keys(store).await?;
        let key = named_key(&keys, "primaryMasterKey", store)?;
        Ok(document_store_connection_string(&endpoint, &key))
    }

    /// Storage connection over the account's second access key
    pub async fn storage_connection(&self, storage: &ResourceDescriptor) -> Result<String> {
        expect_kind(storage, ResourceKind::StorageAccount)?;
        let keys = self.keys(storage).await?;
        let key = keys
            .get(1)
            .ok_or_else(|| DeployError::missing_secret(&storage.name, "no second access key"))?;
        Ok(storage_connection_string(&storage.name, &key.value))
    }

    /// All host settings, or an error; never a partial configuration
    pub async fn build_configuration(
        &self,
        storage: &ProvisionResult,
        document_store: &ProvisionResult,
        device_registry: &ProvisionResult,
    ) -> Result<WiredConfiguration> {
        let storage_conn = self.storage_connection(storage.descriptor()).await?;
        let store_conn = self
            .document_store_connection(document_store.descriptor())
            .await?;
        let registry_conn = self
            .registry_connection(device_registry.descriptor())
            .await?;

        let mut config = WiredConfiguration::default();
        config.insert(STORAGE_SETTING, storage_conn.clone());
        config.insert(CONTENT_STORAGE_SETTING, storage_conn);
        for (name, value) in RUNTIME_SETTINGS {
            config.insert(name, value);
        }
        config.insert(document_store_setting(document_store.name()), store_conn);
        config.insert(
            registry_setting(device_registry.name()),
            registry_conn.to_string(),
        );

        tracing::debug!("Wired {} host settings", config.len());
        Ok(config)
    }

    async fn endpoint(&self, descriptor: &ResourceDescriptor) -> Result<String> {
        self.cloud
            .get_endpoint(descriptor)
            .await
            .map_err(|e| DeployError::missing_secret(&descriptor.name, e))
    }

    async fn keys(&self, descriptor: &ResourceDescriptor) -> Result<Vec<AccessKey>> {
        self.cloud
            .get_keys(descriptor)
            .await
            .map_err(|e| DeployError::missing_secret(&descriptor.name, e))
    }
}

fn expect_kind(descriptor: &ResourceDescriptor, kind: ResourceKind) -> Result<()> {
    if descriptor.kind != kind {
        return Err(DeployError::UpstreamMissing(format!(
            "{} (got {} '{}')",
            kind.display_name(),
            descriptor.kind.display_name(),
            descriptor.name
        )));
    }
    Ok(())
}

fn named_key(keys: &[AccessKey], name: &str, owner: &ResourceDescriptor) -> Result<String> {
    keys.iter()
        .find(|k| k.name == name)
        .map(|k| k.value.clone())
        .ok_or_else(|| DeployError::missing_secret(&owner.name, format!("no {} returned", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubflow_cloud::ProvisionStatus;
    use hubflow_cloud::memory::InMemoryControlPlane;

    fn provisioned(kind: ResourceKind, name: &str) -> ProvisionResult {
        let descriptor = ResourceDescriptor::new(kind, name, "North Europe", "IoT-project");
        ProvisionResult::new(descriptor, ProvisionStatus::Created, format!("/id/{}", name))
    }

    fn upstream() -> (ProvisionResult, ProvisionResult, ProvisionResult) {
        (
            provisioned(ResourceKind::StorageAccount, "storage1"),
            provisioned(ResourceKind::DocumentStore, "cosmos1"),
            provisioned(ResourceKind::DeviceRegistry, "hub1"),
        )
    }

    fn seeded(upstream: &(ProvisionResult, ProvisionResult, ProvisionResult)) -> InMemoryControlPlane {
        InMemoryControlPlane::new()
            .with_existing(upstream.0.descriptor())
            .with_existing(upstream.1.descriptor())
            .with_existing(upstream.2.descriptor())
    }

    #[tokio::test]
    async fn test_build_configuration() {
        let up = upstream();
        let cloud = seeded(&up);
        let config = CredentialWirer::new(&cloud)
            .build_configuration(&up.0, &up.1, &up.2)
            .await
            .unwrap();

        let storage = config.get(STORAGE_SETTING).unwrap();
        assert!(storage.contains("AccountName=storage1;AccountKey=storage1-key2;"));
        assert_eq!(config.get(CONTENT_STORAGE_SETTING), Some(storage));
        assert_eq!(config.get("FUNCTIONS_EXTENSION_VERSION"), Some("~3"));
        assert_eq!(config.get("FUNCTIONS_WORKER_RUNTIME"), Some("node"));
        assert_eq!(config.get("WEBSITE_NODE_DEFAULT_VERSION"), Some("~14"));
        assert_eq!(
            config.get("cosmos1_DOCUMENTDB"),
            Some("AccountEndpoint=https://cosmos1.documents.azure.com:443/;AccountKey=cosmos1-master1;")
        );
        assert_eq!(
            config.get("hub1_IOTHUB"),
            Some("HostName=hub1.azure-devices.net;SharedAccessKeyName=iothubowner;SharedAccessKey=hub1-owner2")
        );
        assert_eq!(config.len(), 7);
        assert_eq!(
            config.to_app_settings()[0],
            json!({ "name": STORAGE_SETTING, "value": storage })
        );
    }

    #[tokio::test]
    async fn test_failed_read_back_yields_no_configuration() {
        let up = upstream();
        let cloud = seeded(&up).with_failing_reads(ResourceKind::DocumentStore);
        let err = CredentialWirer::new(&cloud)
            .build_configuration(&up.0, &up.1, &up.2)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingSecret { ref resource, .. } if resource == "cosmos1"));
    }

    #[tokio::test]
    async fn test_wrong_kind_is_rejected() {
        let up = upstream();
        let cloud = seeded(&up);
        let err = CredentialWirer::new(&cloud)
            .build_configuration(&up.1, &up.1, &up.2)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::UpstreamMissing(_)));
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_debug_hides_values() {
        let mut config = WiredConfiguration::default();
        config.insert(STORAGE_SETTING, "AccountKey=secret");
        let debug = format!("{:?}", config);
        assert!(debug.contains(STORAGE_SETTING));
        assert!(!debug.contains("secret"));
    }
}
