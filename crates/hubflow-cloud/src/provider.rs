//! Control-plane trait definition

use crate::error::Result;
use crate::resource::{AccessKey, ResourceDescriptor, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloud control-plane abstraction
///
/// One handle is created per run and shared read-only by every provisioner.
/// Implementations hold their own authenticated client; there is no state
/// between calls beyond that handle.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Returns the provider name (e.g., "azure")
    fn name(&self) -> &str;

    /// Check if the control plane is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Direct existence query for a resource group
    async fn resource_group_exists(&self, name: &str) -> Result<bool>;

    /// Names of all resources of `kind` in the descriptor's scope
    async fn list_by_group(
        &self,
        kind: ResourceKind,
        group: &str,
        parents: &[String],
    ) -> Result<Vec<String>>;

    /// Whether a globally scoped name is still free to claim
    async fn check_name_availability(&self, kind: ResourceKind, name: &str) -> Result<bool>;

    /// Submit a create-or-update request
    async fn create_or_update(
        &self,
        descriptor: &ResourceDescriptor,
        spec: &serde_json::Value,
    ) -> Result<Operation>;

    /// Block until a submitted operation reaches a terminal state.
    /// Returns the resolved resource identifier.
    async fn wait_for_completion(&self, operation: Operation) -> Result<String>;

    /// Read back the access keys of a provisioned resource
    async fn get_keys(&self, descriptor: &ResourceDescriptor) -> Result<Vec<AccessKey>>;

    /// Read back the public endpoint (hostname or URL) of a provisioned resource
    async fn get_endpoint(&self, descriptor: &ResourceDescriptor) -> Result<String>;

    /// Deterministic identifier of a resource, computed without a network call
    fn resource_id(&self, descriptor: &ResourceDescriptor) -> String;

    /// Existence check shared by every kind.
    ///
    /// Resource groups use the direct existence query. Everything else lists
    /// the enclosing scope and checks set membership by name.
    async fn exists(&self, descriptor: &ResourceDescriptor) -> Result<bool> {
        if descriptor.kind == ResourceKind::ResourceGroup {
            return self.resource_group_exists(&descriptor.name).await;
        }
        let names = self
            .list_by_group(descriptor.kind, &descriptor.group, &descriptor.parents)
            .await?;
        let found = names.iter().any(|n| n == &descriptor.name);
        tracing::debug!(
            "{} '{}' in {}: {}",
            descriptor.kind,
            descriptor.name,
            descriptor.scope(),
            if found { "found" } else { "absent" }
        );
        Ok(found)
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/subscription information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// A submitted create-or-update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Identifier of the resource being created
    pub resource_id: String,

    /// Where to poll for completion; `None` when the request completed synchronously
    pub poll: Option<PollTarget>,
}

impl Operation {
    pub fn completed(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            poll: None,
        }
    }

    pub fn pending(resource_id: impl Into<String>, poll: PollTarget) -> Self {
        Self {
            resource_id: resource_id.into(),
            poll: Some(poll),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.poll.is_none()
    }
}

/// How to observe an asynchronous operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    /// A status document with a `status` field
    StatusUrl(String),
    /// A location that answers 202 until the operation is done
    Location(String),
    /// The resource itself, until its provisioning state is terminal
    Resource(String),
}

/// Polling configuration for asynchronous operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between polls when the service gives no `Retry-After`
    pub interval: Duration,

    /// Give up after this long
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}
