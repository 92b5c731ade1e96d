//! Resource descriptors and provisioning results

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};

/// Kind of a managed cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ResourceGroup,
    DeviceRegistry,
    DocumentStore,
    DocumentDatabase,
    DocumentContainer,
    ComputePlan,
    StorageAccount,
    ComputeHost,
}

impl ResourceKind {
    /// Kinds whose names end up in public DNS and must be claimed globally.
    pub fn requires_name_check(self) -> bool {
        matches!(
            self,
            ResourceKind::DeviceRegistry
                | ResourceKind::DocumentStore
                | ResourceKind::StorageAccount
                | ResourceKind::ComputeHost
        )
    }

    /// Human readable name used in progress output
    pub fn display_name(self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "Resource group",
            ResourceKind::DeviceRegistry => "IoT Hub",
            ResourceKind::DocumentStore => "Cosmos DB account",
            ResourceKind::DocumentDatabase => "Cosmos DB database",
            ResourceKind::DocumentContainer => "Cosmos DB container",
            ResourceKind::ComputePlan => "App Service plan",
            ResourceKind::StorageAccount => "Storage account",
            ResourceKind::ComputeHost => "Function app",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ResourceGroup => write!(f, "resource-group"),
            ResourceKind::DeviceRegistry => write!(f, "device-registry"),
            ResourceKind::DocumentStore => write!(f, "document-store"),
            ResourceKind::DocumentDatabase => write!(f, "document-database"),
            ResourceKind::DocumentContainer => write!(f, "document-container"),
            ResourceKind::ComputePlan => write!(f, "compute-plan"),
            ResourceKind::StorageAccount => write!(f, "storage-account"),
            ResourceKind::ComputeHost => write!(f, "compute-host"),
        }
    }
}

/// Identity of a resource to be ensured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,

    /// Resource name (globally or group-unique depending on kind)
    pub name: String,

    /// Region, e.g. "North Europe"
    pub region: String,

    /// Enclosing resource group. A resource group is its own group.
    pub group: String,

    /// Names of enclosing parent resources below the group, outermost first
    #[serde(default)]
    pub parents: Vec<String>,
}

impl ResourceDescriptor {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        region: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            region: region.into(),
            group: group.into(),
            parents: Vec::new(),
        }
    }

    pub fn resource_group(name: impl Into<String>, region: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ResourceKind::ResourceGroup, name.clone(), region, name)
    }

    /// Descriptor of a child resource nested below this one
    pub fn child(&self, kind: ResourceKind, name: impl Into<String>) -> Self {
        let mut parents = self.parents.clone();
        parents.push(self.name.clone());
        Self {
            kind,
            name: name.into(),
            region: self.region.clone(),
            group: self.group.clone(),
            parents,
        }
    }

    /// Reject descriptors that can never be created
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "{} name must not be empty",
                self.kind
            )));
        }
        if self.region.trim().is_empty() || self.region.chars().any(char::is_control) {
            return Err(CloudError::InvalidConfig(format!(
                "{} '{}' has an invalid region '{}'",
                self.kind, self.name, self.region
            )));
        }
        if self.group.trim().is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "{} '{}' has no resource group",
                self.kind, self.name
            )));
        }
        Ok(())
    }

    /// Scope in which names of this kind are listed (group plus parents)
    pub fn scope(&self) -> String {
        let mut scope = self.group.clone();
        for parent in &self.parents {
            scope.push('/');
            scope.push_str(parent);
        }
        scope
    }

    /// Get the full resource key (kind:scope/name)
    pub fn key(&self) -> String {
        format!("{}:{}/{}", self.kind, self.scope(), self.name)
    }
}

/// Outcome of ensuring a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    /// Found by the existence check, nothing was submitted
    AlreadyExists,
    /// Created by this run
    Created,
}

impl std::fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionStatus::AlreadyExists => write!(f, "already provisioned"),
            ProvisionStatus::Created => write!(f, "created"),
        }
    }
}

/// Result of a single `ensure` call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionResult {
    descriptor: ResourceDescriptor,
    status: ProvisionStatus,
    id: String,
}

impl ProvisionResult {
    pub fn new(descriptor: ResourceDescriptor, status: ProvisionStatus, id: impl Into<String>) -> Self {
        Self {
            descriptor,
            status,
            id: id.into(),
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> ResourceKind {
        self.descriptor.kind
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn status(&self) -> ProvisionStatus {
        self.status
    }

    /// Resolved provider identifier of the resource
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_created(&self) -> bool {
        self.status == ProvisionStatus::Created
    }
}

/// A named secret read back from a provisioned resource
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub name: String,
    pub value: String,
}

impl AccessKey {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKey")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}
