//! Azure provider for HubFlow
//!
//! This crate implements the [`ControlPlane`](hubflow_cloud::ControlPlane)
//! trait over the Azure Resource Manager REST API and the
//! [`DeviceRegistryClient`](hubflow_cloud::DeviceRegistryClient) trait over
//! the IoT Hub service API.
//!
//! # Requirements
//!
//! - `az` CLI must be installed and logged in (`az login`)
//! - Management tokens are obtained from the CLI session
//!
//! # Example
//!
//! ```ignore
//! use hubflow_cloud::ControlPlane;
//! use hubflow_cloud_azure::{AzureCliCredential, AzureControlPlane};
//! use std::sync::Arc;
//!
//! let credential = Arc::new(AzureCliCredential::new(None));
//! let azure = AzureControlPlane::new("<subscription-id>", credential);
//!
//! let auth = azure.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! ```

mod api;
pub mod arm;
pub mod az;
pub mod error;
pub mod iothub;
pub mod provider;
pub mod sas;

pub use arm::ArmClient;
pub use az::{AccessToken, AzAccount, AzCli, AzureCliCredential, MANAGEMENT_RESOURCE};
pub use error::{AzureError, Result};
pub use iothub::{IotHubConnector, IotHubRegistry};
pub use provider::AzureControlPlane;
pub use sas::generate_sas_token;
