use super::{ConflictPolicy, ResourceProvisioner};
use hubflow_cloud::ResourceDescriptor;
use serde_json::{Value, json};

/// Resource groups only distinguish "exists" from "create"; a name clash
/// inside the subscription is the group we want.
pub struct ResourceGroupProvisioner {
    descriptor: ResourceDescriptor,
}

impl ResourceGroupProvisioner {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            descriptor: ResourceDescriptor::resource_group(name, location),
        }
    }
}

impl ResourceProvisioner for ResourceGroupProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        json!({ "location": self.descriptor.region })
    }

    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::AlreadyExists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubflow_cloud::ProvisionStatus;
    use hubflow_cloud::memory::{Call, InMemoryControlPlane};

    #[tokio::test]
    async fn test_existing_group_uses_direct_query() {
        let provisioner = ResourceGroupProvisioner::new("IoT-project", "North Europe");
        let cloud = InMemoryControlPlane::new().with_existing(provisioner.descriptor());

        let result = provisioner.ensure(&cloud).await.unwrap();
        assert_eq!(result.status(), ProvisionStatus::AlreadyExists);
        assert_eq!(
            cloud.calls(),
            vec![Call::ResourceGroupExists("IoT-project".to_string())]
        );
    }

    #[tokio::test]
    async fn test_new_group_skips_name_check() {
        let provisioner = ResourceGroupProvisioner::new("IoT-project", "North Europe");
        let cloud = InMemoryControlPlane::new();

        let result = provisioner.ensure(&cloud).await.unwrap();
        assert!(result.is_created());
        assert_eq!(
            cloud.spec_of(provisioner.descriptor()).unwrap(),
            json!({ "location": "North Europe" })
        );
        assert!(
            !cloud
                .calls()
                .iter()
                .any(|c| matches!(c, Call::CheckNameAvailability { .. }))
        );
    }
}
