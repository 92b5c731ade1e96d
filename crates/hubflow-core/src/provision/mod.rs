//! Idempotent resource provisioning
//!
//! Every resource kind goes through the same primitive: list the enclosing
//! scope, claim the name if it is globally scoped, then create and wait.
//! Concrete provisioners only contribute the creation request body and the
//! way a create-time conflict is read.

mod compute_host;
mod compute_plan;
mod device_registry;
mod document_store;
mod resource_group;
mod storage_account;

pub use compute_host::ComputeHostProvisioner;
pub use compute_plan::ComputePlanProvisioner;
pub use device_registry::{DeviceRegistryProvisioner, RegistrySku};
pub use document_store::{
    DATABASE_NAME, DocumentContainerProvisioner, DocumentDatabaseProvisioner,
    DocumentStoreProvisioner, LATEST_MESSAGES_CONTAINER, MESSAGES_CONTAINER, PARTITION_KEY_PATH,
};
pub use resource_group::ResourceGroupProvisioner;
pub use storage_account::StorageAccountProvisioner;

use crate::error::{DeployError, Result};
use async_trait::async_trait;
use hubflow_cloud::{ControlPlane, ProvisionResult, ProvisionStatus, ResourceDescriptor};
use serde_json::Value;
use tracing::{info, warn};

/// How a conflict answered to a create request is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Somebody created it in the meantime within our scope
    AlreadyExists,
    /// The name belongs to someone else
    NameTaken,
}

#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Body of the create-or-update request
    fn spec(&self) -> Value;

    fn conflict_policy(&self) -> ConflictPolicy {
        if self.descriptor().kind.requires_name_check() {
            ConflictPolicy::NameTaken
        } else {
            ConflictPolicy::AlreadyExists
        }
    }

    async fn ensure(&self, cloud: &dyn ControlPlane) -> Result<ProvisionResult> {
        ensure(cloud, self.descriptor(), &self.spec(), self.conflict_policy()).await
    }
}

/// Make sure the described resource exists.
///
/// Found resources return [`ProvisionStatus::AlreadyExists`] without further
/// calls. A globally scoped name that is taken aborts with
/// [`DeployError::NameUnavailable`] before anything is submitted.
pub async fn ensure(
    cloud: &dyn ControlPlane,
    descriptor: &ResourceDescriptor,
    spec: &Value,
    conflict: ConflictPolicy,
) -> Result<ProvisionResult> {
    descriptor.validate()?;
    let label = descriptor.kind.display_name();

    if cloud.exists(descriptor).await? {
        info!("{} '{}' is already provisioned", label, descriptor.name);
        return Ok(already_exists(cloud, descriptor));
    }

    if descriptor.kind.requires_name_check()
        && !cloud
            .check_name_availability(descriptor.kind, &descriptor.name)
            .await?
    {
        return Err(name_unavailable(descriptor));
    }

    let operation = match cloud.create_or_update(descriptor, spec).await {
        Ok(operation) => operation,
        Err(e) if e.is_conflict() => {
            return match conflict {
                ConflictPolicy::AlreadyExists => {
                    warn!("{} '{}' appeared concurrently: {}", label, descriptor.name, e);
                    Ok(already_exists(cloud, descriptor))
                }
                ConflictPolicy::NameTaken => Err(name_unavailable(descriptor)),
            };
        }
        Err(e) => return Err(e.into()),
    };

    let id = cloud.wait_for_completion(operation).await?;
    info!("Provisioned {} '{}'", label, descriptor.name);
    Ok(ProvisionResult::new(
        descriptor.clone(),
        ProvisionStatus::Created,
        id,
    ))
}

fn already_exists(cloud: &dyn ControlPlane, descriptor: &ResourceDescriptor) -> ProvisionResult {
    ProvisionResult::new(
        descriptor.clone(),
        ProvisionStatus::AlreadyExists,
        cloud.resource_id(descriptor),
    )
}

fn name_unavailable(descriptor: &ResourceDescriptor) -> DeployError {
    DeployError::NameUnavailable {
        kind: descriptor.kind,
        name: descriptor.name.clone(),
    }
}

/// Check that `result` is of the expected kind
pub(crate) fn require<'r>(
    result: &'r ProvisionResult,
    kind: hubflow_cloud::ResourceKind,
) -> Result<&'r ProvisionResult> {
    if result.kind() != kind {
        return Err(DeployError::UpstreamMissing(format!(
            "{} (got {} '{}')",
            kind.display_name(),
            result.kind().display_name(),
            result.name()
        )));
    }
    Ok(result)
}
