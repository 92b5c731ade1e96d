use super::ResourceProvisioner;
use hubflow_cloud::{ResourceDescriptor, ResourceKind};
use serde_json::{Value, json};

/// Consumption plan the function host runs on
pub struct ComputePlanProvisioner {
    descriptor: ResourceDescriptor,
}

impl ComputePlanProvisioner {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: ResourceDescriptor::new(ResourceKind::ComputePlan, name, location, group),
        }
    }
}

impl ResourceProvisioner for ComputePlanProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        json!({
            "location": self.descriptor.region,
            "kind": "functionapp",
            "sku": {
                "name": "Y1",
                "tier": "Dynamic",
                "size": "Y1",
                "family": "Y",
                "capacity": 0,
            },
            "properties": {
                "reserved": false,
            }
        })
    }
}
