//! HubFlow provisioning core
//!
//! Idempotent provisioning of an IoT ingestion stack, device onboarding with
//! locally generated identity keys, and credential wiring between the
//! provisioned resources.
//!
//! Everything here runs against the [`hubflow_cloud::ControlPlane`] and
//! [`hubflow_cloud::DeviceRegistryClient`] traits, so the same pipeline drives
//! the Azure backend and the in-memory backend used in tests.

pub mod devices;
pub mod error;
pub mod functions;
pub mod keystore;
pub mod onboard;
pub mod pipeline;
pub mod provision;
pub mod settings;
pub mod wiring;

pub use devices::{KEY_STORE_SUFFIX, keys_path, load_device_ids, parse_device_ids};
pub use error::{DeployError, Result};
pub use functions::{
    FunctionBindings, FunctionFile, VendorCredentials, remove_vendor_credentials,
    write_function_files,
};
pub use keystore::{IdentityKeyStore, KeyPair};
pub use onboard::{
    DeviceOnboarder, DeviceOutcome, DeviceState, OnboardOptions, OnboardReport, PersistPolicy,
    iiot_tags,
};
pub use pipeline::{
    DEPLOY_STEPS, DeploymentReport, Pipeline, ProgressReporter, check_inputs,
    ensure_authenticated, onboard_devices, onboard_existing,
};
pub use provision::{ConflictPolicy, RegistrySku, ResourceProvisioner};
pub use settings::{DEFAULT_LOCATION, DEFAULT_RESOURCE_GROUP, DeploySettings, ResourceNames, random_suffix};
pub use wiring::{CredentialWirer, WiredConfiguration};
