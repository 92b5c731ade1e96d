use super::{ResourceProvisioner, require};
use crate::error::{DeployError, Result};
use crate::wiring::{STORAGE_SETTING, WiredConfiguration};
use hubflow_cloud::{ProvisionResult, ResourceDescriptor, ResourceKind};
use serde_json::{Value, json};

/// Function host on an existing plan, configured with wired settings.
///
/// Construction requires the plan and storage account results, so a host
/// request can only be built once both exist.
pub struct ComputeHostProvisioner {
    descriptor: ResourceDescriptor,
    plan_id: String,
    settings: WiredConfiguration,
}

impl ComputeHostProvisioner {
    pub fn new(
        name: impl Into<String>,
        plan: &ProvisionResult,
        storage: &ProvisionResult,
        settings: WiredConfiguration,
    ) -> Result<Self> {
        let plan = require(plan, ResourceKind::ComputePlan)?;
        let storage = require(storage, ResourceKind::StorageAccount)?;

        if settings.get(STORAGE_SETTING).is_none() {
            return Err(DeployError::UpstreamMissing(format!(
                "credentials of storage account '{}'",
                storage.name()
            )));
        }

        let plan_descriptor = plan.descriptor();
        Ok(Self {
            descriptor: ResourceDescriptor::new(
                ResourceKind::ComputeHost,
                name,
                plan_descriptor.region.clone(),
                plan_descriptor.group.clone(),
            ),
            plan_id: plan.id().to_string(),
            settings,
        })
    }
}

impl ResourceProvisioner for ComputeHostProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        json!({
            "location": self.descriptor.region,
            "kind": "functionapp",
            "properties": {
                "enabled": true,
                "serverFarmId": self.plan_id,
                "reserved": false,
                "httpsOnly": true,
                "clientCertMode": "Required",
                "siteConfig": {
                    "appSettings": self.settings.to_app_settings(),
                    "managedPipelineMode": "Integrated",
                    "loadBalancing": "LeastRequests",
                    "ipSecurityRestrictions": [{
                        "ipAddress": "Any",
                        "action": "Allow",
                        "priority": 1,
                        "name": "Allow all",
                        "description": "Allow all access"
                    }],
                    "http20Enabled": true,
                    "minTlsVersion": "1.2",
                    "ftpsState": "FtpsOnly",
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubflow_cloud::ProvisionStatus;

    fn result(kind: ResourceKind, name: &str) -> ProvisionResult {
        ProvisionResult::new(
            ResourceDescriptor::new(kind, name, "North Europe", "IoT-project"),
            ProvisionStatus::AlreadyExists,
            format!("/id/{}", name),
        )
    }

    #[test]
    fn test_requires_plan_and_storage() {
        let plan = result(ResourceKind::ComputePlan, "asp");
        let storage = result(ResourceKind::StorageAccount, "st");

        let err = ComputeHostProvisioner::new("fn", &storage, &storage, WiredConfiguration::default())
            .err()
            .unwrap();
        assert!(matches!(err, DeployError::UpstreamMissing(_)));

        let err = ComputeHostProvisioner::new("fn", &plan, &storage, WiredConfiguration::default())
            .err()
            .unwrap();
        assert!(matches!(err, DeployError::UpstreamMissing(_)));
    }
}
