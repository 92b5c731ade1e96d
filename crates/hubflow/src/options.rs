//! Resolve command-line flags, environment and the settings file
//!
//! Precedence per value: flag, then environment variable (both via clap),
//! then the settings file, then the built-in default.

use crate::{AzureArgs, DeviceArgs};
use hubflow_cloud::{ResourceDescriptor, ResourceKind};
use hubflow_config::FileConfig;
use hubflow_core::{
    DEFAULT_LOCATION, DEFAULT_RESOURCE_GROUP, DeploySettings, OnboardOptions, PersistPolicy,
    RegistrySku, ResourceNames, keys_path, random_suffix,
};
use std::path::{Path, PathBuf};

const REGISTRY_SKUS: [&str; 7] = ["F1", "B1", "B2", "B3", "S1", "S2", "S3"];

/// Flags of `hubflow deploy`
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub azure: AzureArgs,
    pub iot_hub_name: Option<String>,
    pub iot_hub_sku: Option<String>,
    pub cosmosdb_name: Option<String>,
    pub app_srv_plan_name: Option<String>,
    pub storage_acc_name: Option<String>,
    pub functions_name: Option<String>,
    pub device_ids_file: Option<PathBuf>,
    pub devices: DeviceArgs,
    pub functions_code_path: Option<PathBuf>,
    pub vendor_credentials: Option<PathBuf>,
}

/// Registry and device list of `hubflow onboard`
#[derive(Debug, Clone)]
pub struct OnboardTarget {
    pub registry: ResourceDescriptor,
    pub device_ids_file: PathBuf,
}

pub fn subscription_id(azure: &AzureArgs, file: &FileConfig) -> Option<String> {
    azure
        .subscription_id
        .clone()
        .or_else(|| file.subscription_id.clone())
}

fn location(azure: &AzureArgs, file: &FileConfig) -> String {
    azure
        .location
        .clone()
        .or_else(|| file.location.clone())
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string())
}

fn resource_group(azure: &AzureArgs, file: &FileConfig) -> String {
    azure
        .resource_group
        .clone()
        .or_else(|| file.resource_group.clone())
        .unwrap_or_else(|| DEFAULT_RESOURCE_GROUP.to_string())
}

fn registry_sku(name: &str) -> anyhow::Result<RegistrySku> {
    let name = name.trim().to_uppercase();
    if !REGISTRY_SKUS.contains(&name.as_str()) {
        anyhow::bail!(
            "unknown IoT Hub SKU '{}' (expected one of {})",
            name,
            REGISTRY_SKUS.join(", ")
        );
    }
    Ok(RegistrySku { name, capacity: 1 })
}

pub fn onboard_options(devices: &DeviceArgs, device_ids_file: Option<&Path>) -> OnboardOptions {
    OnboardOptions {
        edge: devices.edge,
        iiot: devices.iiot,
        key_store_path: device_ids_file.map(keys_path),
        persist: persist_policy(devices),
    }
}

fn persist_policy(devices: &DeviceArgs) -> PersistPolicy {
    if devices.checkpoint {
        PersistPolicy::EachRegistration
    } else {
        PersistPolicy::AfterRun
    }
}

pub fn deploy_settings(request: DeployRequest, file: &FileConfig) -> anyhow::Result<DeploySettings> {
    let suffix = file.name_suffix.clone().unwrap_or_else(random_suffix);
    let generated = ResourceNames::generated(&suffix);
    let names = ResourceNames {
        resource_group: resource_group(&request.azure, file),
        device_registry: request.iot_hub_name.unwrap_or(generated.device_registry),
        document_store: request.cosmosdb_name.unwrap_or(generated.document_store),
        compute_plan: request.app_srv_plan_name.unwrap_or(generated.compute_plan),
        storage_account: request.storage_acc_name.unwrap_or(generated.storage_account),
        compute_host: request.functions_name.unwrap_or(generated.compute_host),
    };

    let mut settings = DeploySettings::new(location(&request.azure, file), names);
    if let Some(sku) = request.iot_hub_sku.or_else(|| file.iot_hub_sku.clone()) {
        settings.registry_sku = registry_sku(&sku)?;
    }
    settings.device_ids_file = request.device_ids_file;
    settings.edge = request.devices.edge;
    settings.iiot = request.devices.iiot;
    settings.persist = persist_policy(&request.devices);
    settings.functions_code_path = request
        .functions_code_path
        .or_else(|| file.functions_code_path.clone());
    settings.vendor_credentials_path = request
        .vendor_credentials
        .or_else(|| file.vendor_credentials_path.clone());
    Ok(settings)
}

pub fn onboard_target(
    azure: &AzureArgs,
    file: &FileConfig,
    iot_hub_name: String,
    device_ids_file: PathBuf,
) -> OnboardTarget {
    OnboardTarget {
        registry: ResourceDescriptor::new(
            ResourceKind::DeviceRegistry,
            iot_hub_name,
            location(azure, file),
            resource_group(azure, file),
        ),
        device_ids_file,
    }
}
