//! Document store account, its SQL database and containers

use super::{ConflictPolicy, ResourceProvisioner};
use hubflow_cloud::{ResourceDescriptor, ResourceKind};
use serde_json::{Value, json};

pub const DATABASE_NAME: &str = "iot";
/// Every message as it arrives
pub const MESSAGES_CONTAINER: &str = "messages";
/// Last message per device
pub const LATEST_MESSAGES_CONTAINER: &str = "latest_messages";
pub const PARTITION_KEY_PATH: &str = "/deviceId";

pub struct DocumentStoreProvisioner {
    descriptor: ResourceDescriptor,
}

impl DocumentStoreProvisioner {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: ResourceDescriptor::new(ResourceKind::DocumentStore, name, location, group),
        }
    }

    pub fn database(&self, name: impl Into<String>) -> DocumentDatabaseProvisioner {
        DocumentDatabaseProvisioner {
            descriptor: self.descriptor.child(ResourceKind::DocumentDatabase, name),
        }
    }
}

impl ResourceProvisioner for DocumentStoreProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        let region = &self.descriptor.region;
        json!({
            "location": region,
            "kind": "GlobalDocumentDB",
            "properties": {
                "databaseAccountOfferType": "Standard",
                "locations": [
                    { "locationName": region, "failoverPriority": 0, "isZoneRedundant": false }
                ],
                "consistencyPolicy": { "defaultConsistencyLevel": "Session" },
                "isVirtualNetworkFilterEnabled": false,
                "enableAutomaticFailover": true,
                "enableMultipleWriteLocations": false,
                "disableKeyBasedMetadataWriteAccess": false,
                "publicNetworkAccess": "Enabled",
                "enableFreeTier": true,
                "enableAnalyticalStorage": false,
                "backupPolicy": { "type": "Periodic" },
                "networkAclBypass": "None",
                "networkAclBypassResourceIds": [],
            }
        })
    }
}

pub struct DocumentDatabaseProvisioner {
    descriptor: ResourceDescriptor,
}

impl DocumentDatabaseProvisioner {
    pub fn container(
        &self,
        name: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> DocumentContainerProvisioner {
        DocumentContainerProvisioner {
            descriptor: self.descriptor.child(ResourceKind::DocumentContainer, name),
            partition_key: partition_key.into(),
        }
    }
}

impl ResourceProvisioner for DocumentDatabaseProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        json!({
            "properties": {
                "resource": { "id": self.descriptor.name },
                "options": {}
            }
        })
    }

    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::AlreadyExists
    }
}

pub struct DocumentContainerProvisioner {
    descriptor: ResourceDescriptor,
    partition_key: String,
}

impl ResourceProvisioner for DocumentContainerProvisioner {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn spec(&self) -> Value {
        json!({
            "properties": {
                "resource": {
                    "id": self.descriptor.name,
                    "partitionKey": { "paths": [self.partition_key], "kind": "Hash" }
                },
                "options": {}
            }
        })
    }

    fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::AlreadyExists
    }
}
