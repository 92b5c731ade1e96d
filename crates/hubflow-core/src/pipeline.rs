//! Deployment pipeline
//!
//! Runs one linear deployment: resource group, device registry, device
//! onboarding, document store, compute plan, storage account, credential
//! wiring, function host. Each step blocks until the previous one finished;
//! the first fatal error stops the run.

use crate::devices::load_device_ids;
use crate::error::{DeployError, Result};
use crate::functions::{FunctionBindings, FunctionFile, VendorCredentials, write_function_files};
use crate::onboard::{DeviceOnboarder, OnboardOptions, OnboardReport};
use crate::provision::{
    ComputeHostProvisioner, ComputePlanProvisioner, DATABASE_NAME, DeviceRegistryProvisioner,
    DocumentStoreProvisioner, LATEST_MESSAGES_CONTAINER, MESSAGES_CONTAINER, PARTITION_KEY_PATH,
    ResourceGroupProvisioner, ResourceProvisioner, StorageAccountProvisioner,
};
use crate::settings::DeploySettings;
use crate::wiring::CredentialWirer;
use hubflow_cloud::{
    CloudError, ControlPlane, ProvisionResult, ProvisionStatus, RegistryConnector,
    ResourceDescriptor, ResourceKind,
};
use std::path::PathBuf;
use tracing::info;

/// Number of progress steps a full deployment reports
pub const DEPLOY_STEPS: usize = 8;

/// Progress callbacks for user-facing output
pub trait ProgressReporter: Send + Sync {
    fn step(&self, _index: usize, _total: usize, _title: &str) {}

    fn provisioned(&self, _result: &ProvisionResult) {}

    fn onboarded(&self, _report: &OnboardReport) {}
}

/// Reports nothing
impl ProgressReporter for () {}

/// Outcome of a full deployment run
#[derive(Debug, Clone, Default)]
pub struct DeploymentReport {
    /// In provisioning order
    pub resources: Vec<ProvisionResult>,
    pub onboarding: Option<OnboardReport>,
    pub function_files: Vec<PathBuf>,
}

impl DeploymentReport {
    pub fn created(&self) -> usize {
        self.resources.iter().filter(|r| r.is_created()).count()
    }

    pub fn already_provisioned(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.status() == ProvisionStatus::AlreadyExists)
            .count()
    }

    pub fn find(&self, kind: ResourceKind) -> Option<&ProvisionResult> {
        self.resources.iter().find(|r| r.kind() == kind)
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} created, {} already provisioned",
            self.created(),
            self.already_provisioned()
        );
        if let Some(ref onboarding) = self.onboarding {
            summary.push_str(&format!(
                "; devices: {} registered, {} already registered",
                onboarding.registered(),
                onboarding.already_registered()
            ));
        }
        summary
    }
}

/// Inputs read from disk before the first network call
struct PreparedInputs {
    device_ids: Option<Vec<String>>,
    function_files: Vec<FunctionFile>,
}

/// Drives one deployment run against a control plane
pub struct Pipeline<'a> {
    cloud: &'a dyn ControlPlane,
    connector: &'a dyn RegistryConnector,
    progress: &'a dyn ProgressReporter,
    settings: DeploySettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cloud: &'a dyn ControlPlane,
        connector: &'a dyn RegistryConnector,
        settings: DeploySettings,
    ) -> Self {
        Self {
            cloud,
            connector,
            progress: &(),
            settings,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    pub async fn run(&self) -> Result<DeploymentReport> {
        let inputs = prepare(&self.settings).await?;
        ensure_authenticated(self.cloud).await?;

        let settings = &self.settings;
        let names = &settings.names;
        let group = names.resource_group.as_str();
        let location = settings.location.as_str();
        let mut report = DeploymentReport::default();

        self.progress.step(1, DEPLOY_STEPS, "Resource group");
        self.ensure(
            &mut report,
            &ResourceGroupProvisioner::new(group, location),
        )
        .await?;

        self.progress.step(2, DEPLOY_STEPS, "IoT Hub");
        let registry = self
            .ensure(
                &mut report,
                &DeviceRegistryProvisioner::new(
                    &names.device_registry,
                    location,
                    group,
                    settings.registry_sku.clone(),
                ),
            )
            .await?;

        self.progress.step(3, DEPLOY_STEPS, "Device onboarding");
        if let Some(ref device_ids) = inputs.device_ids {
            let onboarding = onboard_devices(
                self.cloud,
                self.connector,
                registry.descriptor(),
                device_ids,
                settings.onboard_options(),
            )
            .await?;
            self.progress.onboarded(&onboarding);
            report.onboarding = Some(onboarding);
        } else {
            info!("No device-id file given; skipping onboarding");
        }

        self.progress.step(4, DEPLOY_STEPS, "Cosmos DB");
        let account = DocumentStoreProvisioner::new(&names.document_store, location, group);
        let document_store = self.ensure(&mut report, &account).await?;
        let database = account.database(DATABASE_NAME);
        self.ensure(&mut report, &database).await?;
        for container in [MESSAGES_CONTAINER, LATEST_MESSAGES_CONTAINER] {
            self.ensure(&mut report, &database.container(container, PARTITION_KEY_PATH))
                .await?;
        }

        self.progress.step(5, DEPLOY_STEPS, "App Service plan");
        let plan = self
            .ensure(
                &mut report,
                &ComputePlanProvisioner::new(&names.compute_plan, location, group),
            )
            .await?;

        self.progress.step(6, DEPLOY_STEPS, "Storage account");
        let storage = self
            .ensure(
                &mut report,
                &StorageAccountProvisioner::new(&names.storage_account, location, group),
            )
            .await?;

        self.progress.step(7, DEPLOY_STEPS, "Function app");
        let wired = CredentialWirer::new(self.cloud)
            .build_configuration(&storage, &document_store, &registry)
            .await?;
        let host = ComputeHostProvisioner::new(&names.compute_host, &plan, &storage, wired)?;
        self.ensure(&mut report, &host).await?;

        self.progress.step(8, DEPLOY_STEPS, "Function bindings");
        if let Some(ref code_path) = settings.functions_code_path {
            report.function_files = write_function_files(code_path, &inputs.function_files).await?;
        }

        info!("Deployment finished: {}", report.summary());
        Ok(report)
    }

    async fn ensure(
        &self,
        report: &mut DeploymentReport,
        provisioner: &dyn ResourceProvisioner,
    ) -> Result<ProvisionResult> {
        let result = provisioner.ensure(self.cloud).await?;
        self.progress.provisioned(&result);
        report.resources.push(result.clone());
        Ok(result)
    }
}

/// Read and validate every local input a deployment needs, without touching
/// the control plane.
///
/// [`Pipeline::run`] performs the same checks; callers that must log in
/// first can run them beforehand to fail fast.
pub async fn check_inputs(settings: &DeploySettings) -> Result<()> {
    prepare(settings).await.map(|_| ())
}

async fn prepare(settings: &DeploySettings) -> Result<PreparedInputs> {
    settings.validate()?;

    let device_ids = match settings.device_ids_file {
        Some(ref path) => Some(load_device_ids(path).await?),
        None => None,
    };

    let function_files = match settings.vendor_credentials_path {
        Some(ref path) if settings.functions_code_path.is_some() => {
            let credentials = VendorCredentials::load(path).await?;
            FunctionBindings::new(
                &settings.names.document_store,
                &settings.names.device_registry,
            )
            .render(&credentials)?
        }
        _ => Vec::new(),
    };

    Ok(PreparedInputs {
        device_ids,
        function_files,
    })
}

/// Fail unless the control plane has a usable login
pub async fn ensure_authenticated(cloud: &dyn ControlPlane) -> Result<()> {
    let auth = cloud.check_auth().await?;
    if !auth.authenticated {
        return Err(DeployError::Cloud(CloudError::AuthenticationFailed(
            auth.error.unwrap_or_else(|| "not logged in".to_string()),
        )));
    }
    if let Some(ref account) = auth.account_info {
        info!("Using {} account {}", cloud.name(), account);
    }
    Ok(())
}

/// Onboard devices into a registry that already exists
pub async fn onboard_devices(
    cloud: &dyn ControlPlane,
    connector: &dyn RegistryConnector,
    registry: &ResourceDescriptor,
    device_ids: &[String],
    options: OnboardOptions,
) -> Result<OnboardReport> {
    options.validate()?;
    if device_ids.is_empty() {
        info!("Device-id list is empty; nothing to onboard");
        return Ok(OnboardReport::default());
    }

    let connection = CredentialWirer::new(cloud)
        .registry_connection(registry)
        .await?;
    let client = connector.connect(&connection)?;
    let mut onboarder = DeviceOnboarder::new(client.as_ref(), options)?;
    onboarder.run(device_ids).await
}

/// Onboarding against a registry provisioned by an earlier run
pub async fn onboard_existing(
    cloud: &dyn ControlPlane,
    connector: &dyn RegistryConnector,
    registry: &ResourceDescriptor,
    device_ids: &[String],
    options: OnboardOptions,
) -> Result<OnboardReport> {
    options.validate()?;
    ensure_authenticated(cloud).await?;
    if !cloud.exists(registry).await? {
        return Err(DeployError::UpstreamMissing(format!(
            "IoT Hub '{}' in resource group '{}'",
            registry.name, registry.group
        )));
    }
    onboard_devices(cloud, connector, registry, device_ids, options).await
}
