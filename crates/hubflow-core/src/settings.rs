//! Deployment settings and generated resource names

use crate::error::{DeployError, Result};
use crate::onboard::{OnboardOptions, PersistPolicy};
use crate::provision::RegistrySku;
use rand::Rng;
use std::path::PathBuf;

pub const DEFAULT_RESOURCE_GROUP: &str = "IoT-project";
pub const DEFAULT_LOCATION: &str = "North Europe";

/// Five-digit suffix shared by all generated names of one run
pub fn random_suffix() -> String {
    format!("{:05}", rand::thread_rng().gen_range(1..100_000))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub resource_group: String,
    pub device_registry: String,
    pub document_store: String,
    pub compute_plan: String,
    pub storage_account: String,
    pub compute_host: String,
}

impl ResourceNames {
    pub fn generated(suffix: &str) -> Self {
        Self {
            resource_group: DEFAULT_RESOURCE_GROUP.to_string(),
            device_registry: format!("iot-hub-materialfluss{}", suffix),
            document_store: format!("cosmosdb-materialfluss{}", suffix),
            compute_plan: format!("ASP-materialfluss{}", suffix),
            storage_account: format!("storage0materialfluss{}", suffix),
            compute_host: format!("functions-materialfluss{}", suffix),
        }
    }
}

/// Everything one deployment run needs, resolved before any network call
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub location: String,
    pub names: ResourceNames,
    pub registry_sku: RegistrySku,
    /// Devices to onboard once the registry exists
    pub device_ids_file: Option<PathBuf>,
    pub edge: bool,
    pub iiot: bool,
    pub persist: PersistPolicy,
    /// Where function bindings are written
    pub functions_code_path: Option<PathBuf>,
    pub vendor_credentials_path: Option<PathBuf>,
}

impl DeploySettings {
    pub fn new(location: impl Into<String>, names: ResourceNames) -> Self {
        Self {
            location: location.into(),
            names,
            registry_sku: RegistrySku::default(),
            device_ids_file: None,
            edge: false,
            iiot: false,
            persist: PersistPolicy::default(),
            functions_code_path: None,
            vendor_credentials_path: None,
        }
    }

    /// Onboarding options; the key store sits next to the device-id file
    pub fn onboard_options(&self) -> OnboardOptions {
        OnboardOptions {
            edge: self.edge,
            iiot: self.iiot,
            key_store_path: self.device_ids_file.as_deref().map(crate::devices::keys_path),
            persist: self.persist,
        }
    }

    /// Local checks that must pass before anything is provisioned
    pub fn validate(&self) -> Result<()> {
        self.onboard_options().validate()?;

        let names = [
            ("resource group", &self.names.resource_group),
            ("IoT Hub", &self.names.device_registry),
            ("Cosmos DB", &self.names.document_store),
            ("App Service plan", &self.names.compute_plan),
            ("storage account", &self.names.storage_account),
            ("function app", &self.names.compute_host),
        ];
        for (label, name) in names {
            if name.trim().is_empty() {
                return Err(DeployError::InvalidInput(format!("{} name must not be empty", label)));
            }
        }
        if self.location.trim().is_empty() {
            return Err(DeployError::InvalidInput("location must not be empty".to_string()));
        }
        if self.functions_code_path.is_some() && self.vendor_credentials_path.is_none() {
            return Err(DeployError::InvalidInput(
                "a functions code path needs a vendor credentials file for its data pullers"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
