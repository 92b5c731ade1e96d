//! Bulk device onboarding

use crate::error::{DeployError, Result};
use crate::keystore::IdentityKeyStore;
use hubflow_cloud::{DeviceRegistration, DeviceRegistryClient, RegistrationOutcome};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Twin tags marking a device as an IIoT edge gateway
pub fn iiot_tags() -> Value {
    json!({ "__type__": "iiotedge", "os": "Linux" })
}

/// When confirmed keys are written to the key store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistPolicy {
    /// Once, after the whole device list
    #[default]
    AfterRun,
    /// After every newly registered device
    EachRegistration,
}

#[derive(Debug, Clone, Default)]
pub struct OnboardOptions {
    /// Register devices as edge devices
    pub edge: bool,
    /// Tag devices as IIoT gateways; requires `edge`
    pub iiot: bool,
    /// Key-store file; `None` keeps keys in memory only
    pub key_store_path: Option<PathBuf>,
    pub persist: PersistPolicy,
}

impl OnboardOptions {
    pub fn validate(&self) -> Result<()> {
        if self.iiot && !self.edge {
            return Err(DeployError::InvalidInput(
                "IIoT devices must be edge devices; pass --edge together with --iiot".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-device progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    KeyReserved,
    Submitted,
    Registered,
    AlreadyRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOutcome {
    pub device_id: String,
    pub state: DeviceState,
}

#[derive(Debug, Clone, Default)]
pub struct OnboardReport {
    /// One entry per input line, in input order
    pub outcomes: Vec<DeviceOutcome>,
    /// Whether the key store was written
    pub persisted: bool,
}

impl OnboardReport {
    pub fn registered(&self) -> usize {
        self.count(DeviceState::Registered)
    }

    pub fn already_registered(&self) -> usize {
        self.count(DeviceState::AlreadyRegistered)
    }

    fn count(&self, state: DeviceState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

/// Registers device ids against a device registry with freshly minted keys
pub struct DeviceOnboarder<'a> {
    client: &'a dyn DeviceRegistryClient,
    options: OnboardOptions,
    store: IdentityKeyStore,
}

impl<'a> DeviceOnboarder<'a> {
    /// Fails with [`DeployError::InvalidInput`] on an invalid flag combination
    pub fn new(client: &'a dyn DeviceRegistryClient, options: OnboardOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            client,
            options,
            store: IdentityKeyStore::new(),
        })
    }

    pub fn with_key_store(mut self, store: IdentityKeyStore) -> Self {
        self.store = store;
        self
    }

    pub fn key_store(&self) -> &IdentityKeyStore {
        &self.store
    }

    /// Onboard every id in order. A registration error other than a conflict
    /// aborts the remaining list; keys confirmed up to that point are still
    /// persisted before the error is returned, whatever the persist policy.
    pub async fn run(&mut self, device_ids: &[String]) -> Result<OnboardReport> {
        let mut report = OnboardReport::default();

        for device_id in device_ids {
            match self.onboard_one(device_id, &mut report).await {
                Ok(state) => {
                    report.outcomes.push(DeviceOutcome {
                        device_id: device_id.clone(),
                        state,
                    });
                }
                Err(e) => {
                    // The registration error wins over a failed save.
                    if let Err(persist_err) = self.persist().await {
                        error!(
                            "Could not save device keys after '{}' failed: {}",
                            device_id, persist_err
                        );
                    }
                    return Err(e);
                }
            }
        }

        if self.options.persist == PersistPolicy::AfterRun {
            report.persisted = self.persist().await?;
        }

        info!(
            "Onboarded {} device(s), {} already registered",
            report.registered(),
            report.already_registered()
        );
        Ok(report)
    }

    async fn onboard_one(
        &mut self,
        device_id: &str,
        report: &mut OnboardReport,
    ) -> Result<DeviceState> {
        let keys = self.store.generate(device_id);
        let mut state = DeviceState::KeyReserved;
        tracing::debug!("{}: {:?}", device_id, state);

        let registration = DeviceRegistration {
            device_id: device_id.to_string(),
            primary_key: keys.primary,
            secondary_key: keys.secondary,
            edge: self.options.edge,
        };
        state = DeviceState::Submitted;
        tracing::debug!("{}: {:?}", device_id, state);

        let outcome = match self.client.create_device(&registration).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_conflict() => RegistrationOutcome::Conflict,
            Err(source) => {
                self.store.remove(device_id);
                return Err(DeployError::Device {
                    device_id: device_id.to_string(),
                    source,
                });
            }
        };

        match outcome {
            RegistrationOutcome::Created => {
                self.store.confirm(device_id);
                info!("Device '{}' is registered", device_id);

                // Checkpoint before anything else can fail for this device.
                if self.options.persist == PersistPolicy::EachRegistration {
                    report.persisted |= self.persist().await?;
                }

                if self.options.iiot {
                    self.client
                        .update_twin(device_id, &iiot_tags())
                        .await
                        .map_err(|source| DeployError::Device {
                            device_id: device_id.to_string(),
                            source,
                        })?;
                }
                Ok(DeviceState::Registered)
            }
            RegistrationOutcome::Conflict => {
                self.store.remove(device_id);
                warn!("Device '{}' is already registered", device_id);
                Ok(DeviceState::AlreadyRegistered)
            }
        }
    }

    async fn persist(&self) -> Result<bool> {
        match self.options.key_store_path {
            Some(ref path) => self.store.merge_and_persist(path).await,
            None => Ok(false),
        }
    }
}
