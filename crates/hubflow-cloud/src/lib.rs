//! HubFlow Cloud Control Plane
//!
//! This crate provides the cloud abstraction HubFlow provisions against:
//! resource descriptors, the uniform control-plane contract every resource
//! kind is driven through, and the device-registry data-plane client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  HubFlow CLI                     │
//! │              (hubflow deploy/onboard)            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 hubflow-core                     │
//! │   provisioners · credential wiring · onboarding  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                hubflow-cloud                     │
//! │  trait ControlPlane { ... }                      │
//! │  trait DeviceRegistryClient { ... }              │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────────┐
//! │ hubflow-cloud-    │
//! │ azure             │
//! └───────────────────┘
//! ```

pub mod connection;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod provider;
pub mod registry;
pub mod resource;

// Re-exports
pub use connection::{
    DeviceRegistryConnection, REGISTRY_OWNER_POLICY, document_store_connection_string,
    storage_connection_string,
};
pub use error::{CloudError, Result};
pub use provider::{AuthStatus, ControlPlane, Operation, PollConfig, PollTarget};
pub use registry::{
    DeviceRegistration, DeviceRegistryClient, RegistrationOutcome, RegistryConnector,
};
pub use resource::{AccessKey, ProvisionResult, ProvisionStatus, ResourceDescriptor, ResourceKind};
