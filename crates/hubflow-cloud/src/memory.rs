//! In-memory control plane and device registry
//!
//! Test doubles that record every call in order, so tests can assert on
//! idempotence, ordering and early aborts without a cloud account.

use crate::connection::DeviceRegistryConnection;
use crate::error::{CloudError, Result};
use crate::provider::{AuthStatus, ControlPlane, Operation, PollTarget};
use crate::registry::{
    DeviceRegistration, DeviceRegistryClient, RegistrationOutcome, RegistryConnector,
};
use crate::resource::{AccessKey, ResourceDescriptor, ResourceKind};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A recorded control-plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ResourceGroupExists(String),
    ListByGroup { kind: ResourceKind, scope: String },
    CheckNameAvailability { kind: ResourceKind, name: String },
    CreateOrUpdate { kind: ResourceKind, name: String },
    WaitForCompletion { resource_id: String },
    GetKeys { kind: ResourceKind, name: String },
    GetEndpoint { kind: ResourceKind, name: String },
}

impl Call {
    pub fn is_create(&self) -> bool {
        matches!(self, Call::CreateOrUpdate { .. })
    }
}

#[derive(Default)]
struct ControlPlaneState {
    groups: BTreeSet<String>,
    resources: BTreeMap<(ResourceKind, String), BTreeSet<String>>,
    specs: HashMap<String, serde_json::Value>,
    taken: HashSet<(ResourceKind, String)>,
    failing_reads: HashSet<ResourceKind>,
    failing_creates: HashSet<ResourceKind>,
    calls: Vec<Call>,
}

impl ControlPlaneState {
    fn contains(&self, descriptor: &ResourceDescriptor) -> bool {
        if descriptor.kind == ResourceKind::ResourceGroup {
            return self.groups.contains(&descriptor.name);
        }
        self.resources
            .get(&(descriptor.kind, descriptor.scope()))
            .is_some_and(|names| names.contains(&descriptor.name))
    }

    fn insert(&mut self, descriptor: &ResourceDescriptor) {
        if descriptor.kind == ResourceKind::ResourceGroup {
            self.groups.insert(descriptor.name.clone());
        } else {
            self.resources
                .entry((descriptor.kind, descriptor.scope()))
                .or_default()
                .insert(descriptor.name.clone());
        }
    }
}

/// Control plane backed by in-process maps
#[derive(Default)]
pub struct InMemoryControlPlane {
    state: Mutex<ControlPlaneState>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ControlPlaneState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pre-seed a resource as already provisioned by an earlier run
    pub fn with_existing(self, descriptor: &ResourceDescriptor) -> Self {
        self.state().insert(descriptor);
        self
    }

    /// Mark a globally scoped name as claimed by somebody else
    pub fn with_taken_name(self, kind: ResourceKind, name: impl Into<String>) -> Self {
        self.state().taken.insert((kind, name.into()));
        self
    }

    /// Make key and endpoint read-backs of `kind` fail
    pub fn with_failing_reads(self, kind: ResourceKind) -> Self {
        self.state().failing_reads.insert(kind);
        self
    }

    /// Make create requests of `kind` fail with a service error
    pub fn with_failing_creates(self, kind: ResourceKind) -> Self {
        self.state().failing_creates.insert(kind);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn create_count(&self) -> usize {
        self.state().calls.iter().filter(|c| c.is_create()).count()
    }

    pub fn contains(&self, descriptor: &ResourceDescriptor) -> bool {
        self.state().contains(descriptor)
    }

    /// Spec submitted by the last create request for `descriptor`
    pub fn spec_of(&self, descriptor: &ResourceDescriptor) -> Option<serde_json::Value> {
        self.state().specs.get(&descriptor.key()).cloned()
    }

    fn read_back(&self, call: Call, descriptor: &ResourceDescriptor) -> Result<()> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failing_reads.contains(&descriptor.kind) {
            return Err(CloudError::api(500, format!("read-back of {} failed", descriptor.name)));
        }
        if !state.contains(descriptor) {
            return Err(CloudError::ResourceNotFound(descriptor.key()));
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("in-memory"))
    }

    async fn resource_group_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.state();
        state.calls.push(Call::ResourceGroupExists(name.to_string()));
        Ok(state.groups.contains(name))
    }

    async fn list_by_group(
        &self,
        kind: ResourceKind,
        group: &str,
        parents: &[String],
    ) -> Result<Vec<String>> {
        let mut scope = group.to_string();
        for parent in parents {
            scope.push('/');
            scope.push_str(parent);
        }
        let mut state = self.state();
        state.calls.push(Call::ListByGroup {
            kind,
            scope: scope.clone(),
        });
        Ok(state
            .resources
            .get(&(kind, scope))
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn check_name_availability(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        let mut state = self.state();
        state.calls.push(Call::CheckNameAvailability {
            kind,
            name: name.to_string(),
        });
        Ok(!state.taken.contains(&(kind, name.to_string())))
    }

    async fn create_or_update(
        &self,
        descriptor: &ResourceDescriptor,
        spec: &serde_json::Value,
    ) -> Result<Operation> {
        let id = self.resource_id(descriptor);
        let mut state = self.state();
        state.calls.push(Call::CreateOrUpdate {
            kind: descriptor.kind,
            name: descriptor.name.clone(),
        });
        if state.failing_creates.contains(&descriptor.kind) {
            return Err(CloudError::api(503, "service unavailable"));
        }
        state.insert(descriptor);
        state.specs.insert(descriptor.key(), spec.clone());
        Ok(Operation::pending(id.clone(), PollTarget::Resource(id)))
    }

    async fn wait_for_completion(&self, operation: Operation) -> Result<String> {
        self.state().calls.push(Call::WaitForCompletion {
            resource_id: operation.resource_id.clone(),
        });
        Ok(operation.resource_id)
    }

    async fn get_keys(&self, descriptor: &ResourceDescriptor) -> Result<Vec<AccessKey>> {
        self.read_back(
            Call::GetKeys {
                kind: descriptor.kind,
                name: descriptor.name.clone(),
            },
            descriptor,
        )?;
        let name = &descriptor.name;
        let keys = match descriptor.kind {
            ResourceKind::StorageAccount => vec![
                AccessKey::new("key1", format!("{}-key1", name)),
                AccessKey::new("key2", format!("{}-key2", name)),
            ],
            ResourceKind::DocumentStore => vec![
                AccessKey::new("primaryMasterKey", format!("{}-master1", name)),
                AccessKey::new("secondaryMasterKey", format!("{}-master2", name)),
            ],
            ResourceKind::DeviceRegistry => vec![
                AccessKey::new("primaryKey", format!("{}-owner1", name)),
                AccessKey::new("secondaryKey", format!("{}-owner2", name)),
            ],
            _ => Vec::new(),
        };
        Ok(keys)
    }

    async fn get_endpoint(&self, descriptor: &ResourceDescriptor) -> Result<String> {
        self.read_back(
            Call::GetEndpoint {
                kind: descriptor.kind,
                name: descriptor.name.clone(),
            },
            descriptor,
        )?;
        let name = &descriptor.name;
        match descriptor.kind {
            ResourceKind::DeviceRegistry => Ok(format!("{}.azure-devices.net", name)),
            ResourceKind::DocumentStore => Ok(format!("https://{}.documents.azure.com:443/", name)),
            ResourceKind::StorageAccount => Ok(format!("https://{}.blob.core.windows.net/", name)),
            ResourceKind::ComputeHost => Ok(format!("{}.azurewebsites.net", name)),
            kind => Err(CloudError::InvalidConfig(format!("{} has no endpoint", kind))),
        }
    }

    fn resource_id(&self, descriptor: &ResourceDescriptor) -> String {
        format!("/memory/{}", descriptor.key())
    }
}

/// A recorded device-registry call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    CreateDevice {
        device_id: String,
        primary_key: String,
        secondary_key: String,
        edge: bool,
    },
    UpdateTwin {
        device_id: String,
        tags: serde_json::Value,
    },
}

#[derive(Default)]
struct RegistryState {
    devices: BTreeMap<String, Option<DeviceRegistration>>,
    failing: HashSet<String>,
    failing_twins: HashSet<String>,
    calls: Vec<RegistryCall>,
}

/// Device registry backed by an in-process map
#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pre-register a device whose keys this run does not know
    pub fn with_device(self, device_id: impl Into<String>) -> Self {
        self.state().devices.insert(device_id.into(), None);
        self
    }

    /// Make registration of `device_id` fail with a service error
    pub fn with_failing_device(self, device_id: impl Into<String>) -> Self {
        self.state().failing.insert(device_id.into());
        self
    }

    /// Accept registration of `device_id` but fail its twin update
    pub fn with_failing_twin(self, device_id: impl Into<String>) -> Self {
        self.state().failing_twins.insert(device_id.into());
        self
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.state().calls.clone()
    }

    /// Registration accepted for `device_id` by this registry, if any
    pub fn registration(&self, device_id: &str) -> Option<DeviceRegistration> {
        self.state().devices.get(device_id).cloned().flatten()
    }

    pub fn device_count(&self) -> usize {
        self.state().devices.len()
    }
}

#[async_trait]
impl DeviceRegistryClient for InMemoryDeviceRegistry {
    async fn create_device(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<RegistrationOutcome> {
        let mut state = self.state();
        state.calls.push(RegistryCall::CreateDevice {
            device_id: registration.device_id.clone(),
            primary_key: registration.primary_key.clone(),
            secondary_key: registration.secondary_key.clone(),
            edge: registration.edge,
        });
        if state.failing.contains(&registration.device_id) {
            return Err(CloudError::api(500, "internal server error"));
        }
        if state.devices.contains_key(&registration.device_id) {
            return Ok(RegistrationOutcome::Conflict);
        }
        state
            .devices
            .insert(registration.device_id.clone(), Some(registration.clone()));
        Ok(RegistrationOutcome::Created)
    }

    async fn update_twin(&self, device_id: &str, tags: &serde_json::Value) -> Result<()> {
        let mut state = self.state();
        state.calls.push(RegistryCall::UpdateTwin {
            device_id: device_id.to_string(),
            tags: tags.clone(),
        });
        if !state.devices.contains_key(device_id) {
            return Err(CloudError::ResourceNotFound(device_id.to_string()));
        }
        if state.failing_twins.contains(device_id) {
            return Err(CloudError::api(503, "service unavailable"));
        }
        Ok(())
    }
}

/// Connector handing out a shared in-memory registry
pub struct InMemoryConnector {
    registry: Arc<InMemoryDeviceRegistry>,
    connections: Mutex<Vec<DeviceRegistryConnection>>,
}

impl InMemoryConnector {
    pub fn new(registry: Arc<InMemoryDeviceRegistry>) -> Self {
        Self {
            registry,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Connection strings the registry was opened with
    pub fn connections(&self) -> Vec<DeviceRegistryConnection> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RegistryConnector for InMemoryConnector {
    fn connect(
        &self,
        connection: &DeviceRegistryConnection,
    ) -> Result<Box<dyn DeviceRegistryClient>> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(connection.clone());
        Ok(Box::new(self.registry.clone()))
    }
}
