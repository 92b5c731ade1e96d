use super::ResourceProvisioner;
use hubflow_cloud::{ResourceDescriptor, ResourceKind};
use serde_json::{Value, json};

/// Pricing tier of the device registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySku {
    /// `F1` (free) or `S1` (standard)
    pub name: String,
    pub capacity: u32,
}

impl Default for RegistrySku {
    fn default() -> Self {
        Self {
            name: "F1".to_string(),
            capacity: 1,
        }
    }
}

pub struct DeviceRegistryProvisioner {
    descriptor: ResourceDescriptor,
    sku: RegistrySku,
}

impl DeviceRegistryProvisioner {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        group: impl Into<String>,
        sku: RegistrySku,
    ) -> Self {
        Self {
            descriptor: ResourceDescriptor::new(ResourceKind::DeviceRegistry, name, location, group),
            sku,
        }
    }
}

impl ResourceProvisioner for DeviceRegistryProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        json!({
            "location": self.descriptor.region,
            "sku": {
                "name": self.sku.name,
                "capacity": self.sku.capacity,
            },
            "properties": {
                "publicNetworkAccess": "Enabled",
                "features": "DeviceManagement",
            }
        })
    }
}
