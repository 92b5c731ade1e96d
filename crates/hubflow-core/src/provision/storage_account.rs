use super::ResourceProvisioner;
use hubflow_cloud::{ResourceDescriptor, ResourceKind};
use serde_json::{Value, json};

/// Storage account backing the function host
pub struct StorageAccountProvisioner {
    descriptor: ResourceDescriptor,
}

impl StorageAccountProvisioner {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: ResourceDescriptor::new(ResourceKind::StorageAccount, name, location, group),
        }
    }
}

impl ResourceProvisioner for StorageAccountProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        json!({
            "location": self.descriptor.region,
            "kind": "StorageV2",
            "sku": { "name": "Standard_LRS" },
            "properties": {
                "accessTier": "Hot",
                "supportsHttpsTrafficOnly": true,
                "minimumTlsVersion": "TLS1_2",
            }
        })
    }
}
