//! Connection strings assembled from read-back secrets

/// Shared-access policy with registry read/write rights
pub const REGISTRY_OWNER_POLICY: &str = "iothubowner";

/// `HostName=…;SharedAccessKeyName=…;SharedAccessKey=…`
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceRegistryConnection {
    pub host_name: String,
    pub key_name: String,
    pub key: String,
}

impl DeviceRegistryConnection {
    pub fn new(
        host_name: impl Into<String>,
        key_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            host_name: host_name.into(),
            key_name: key_name.into(),
            key: key.into(),
        }
    }

    /// Parse a registry connection string. Values may contain `=` (base64 padding).
    #[cfg(any(test, feature = "test-utils"))]
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        use crate::error::CloudError;

        let mut host_name = None;
        let mut key_name = None;
        let mut key = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                CloudError::InvalidConfig(format!("malformed connection string segment '{}'", part))
            })?;
            match name {
                "HostName" => host_name = Some(value.to_string()),
                "SharedAccessKeyName" => key_name = Some(value.to_string()),
                "SharedAccessKey" => key = Some(value.to_string()),
                _ => {}
            }
        }

        match (host_name, key_name, key) {
            (Some(host_name), Some(key_name), Some(key)) => Ok(Self {
                host_name,
                key_name,
                key,
            }),
            _ => Err(CloudError::InvalidConfig(
                "connection string requires HostName, SharedAccessKeyName and SharedAccessKey"
                    .to_string(),
            )),
        }
    }
}

impl std::fmt::Display for DeviceRegistryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HostName={};SharedAccessKeyName={};SharedAccessKey={}",
            self.host_name, self.key_name, self.key
        )
    }
}

impl std::fmt::Debug for DeviceRegistryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistryConnection")
            .field("host_name", &self.host_name)
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

/// Storage account connection string
pub fn storage_connection_string(account_name: &str, account_key: &str) -> String {
    format!(
        "DefaultEndpointsProtocol=https;AccountName={};AccountKey={};EndpointSuffix=core.windows.net",
        account_name, account_key
    )
}

/// Document-store connection string
pub fn document_store_connection_string(endpoint: &str, key: &str) -> String {
    format!("AccountEndpoint={};AccountKey={};", endpoint, key)
}
