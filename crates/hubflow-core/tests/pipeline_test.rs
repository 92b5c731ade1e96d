//! End-to-end deployments against the in-memory control plane

use hubflow_cloud::memory::{
    Call, InMemoryConnector, InMemoryControlPlane, InMemoryDeviceRegistry, RegistryCall,
};
use hubflow_cloud::{ControlPlane, ResourceDescriptor, ResourceKind};
use hubflow_core::{
    DeployError, DeploySettings, OnboardOptions, PersistPolicy, Pipeline, ResourceNames,
    keys_path, onboard_existing,
};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const CREDS: &str = r#"{"vemcon": {"api.vemcon.net": {"x-api-key": "abc"}}}"#;

type StoredKeys = BTreeMap<String, (String, String)>;

struct Fixture {
    dir: TempDir,
    registry: Arc<InMemoryDeviceRegistry>,
    connector: InMemoryConnector,
}

impl Fixture {
    fn new() -> Self {
        Self::with_registry(InMemoryDeviceRegistry::new())
    }

    fn with_registry(registry: InMemoryDeviceRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            dir: TempDir::new().unwrap(),
            connector: InMemoryConnector::new(registry.clone()),
            registry,
        }
    }

    fn devices_file(&self, content: &str) -> PathBuf {
        let path = self.dir.path().join("devices.txt");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn settings(&self, devices: Option<PathBuf>) -> DeploySettings {
        let mut settings = DeploySettings::new("North Europe", ResourceNames::generated("00042"));
        settings.device_ids_file = devices;
        settings
    }

    async fn deploy(
        &self,
        cloud: &InMemoryControlPlane,
        settings: DeploySettings,
    ) -> hubflow_core::Result<hubflow_core::DeploymentReport> {
        Pipeline::new(cloud, &self.connector, settings).run().await
    }
}

fn read_keys(devices: &Path) -> StoredKeys {
    let content = std::fs::read_to_string(keys_path(devices)).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn position(calls: &[Call], wanted: &Call) -> usize {
    calls
        .iter()
        .position(|c| c == wanted)
        .unwrap_or_else(|| panic!("{:?} was not called", wanted))
}

fn create(kind: ResourceKind, name: &str) -> Call {
    Call::CreateOrUpdate {
        kind,
        name: name.to_string(),
    }
}

#[tokio::test]
async fn test_fresh_deploy_creates_everything() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new();

    let report = fx.deploy(&cloud, fx.settings(None)).await.unwrap();

    assert_eq!(report.resources.len(), 9);
    assert_eq!(report.created(), 9);
    assert_eq!(report.already_provisioned(), 0);
    assert!(report.onboarding.is_none());
    assert!(report.function_files.is_empty());
    assert_eq!(report.summary(), "9 created, 0 already provisioned");

    let containers: Vec<_> = report
        .resources
        .iter()
        .filter(|r| r.kind() == ResourceKind::DocumentContainer)
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(containers, vec!["messages", "latest_messages"]);
}

#[tokio::test]
async fn test_second_run_creates_nothing() {
    let fx = Fixture::new();
    let devices = fx.devices_file("dev-1\ndev-2\n");
    let cloud = InMemoryControlPlane::new();

    fx.deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap();
    let keys_before = std::fs::read(keys_path(&devices)).unwrap();

    cloud.clear_calls();
    let report = fx
        .deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap();

    assert_eq!(cloud.create_count(), 0);
    assert_eq!(report.created(), 0);
    assert_eq!(report.already_provisioned(), 9);

    let onboarding = report.onboarding.unwrap();
    assert_eq!(onboarding.registered(), 0);
    assert_eq!(onboarding.already_registered(), 2);
    assert!(!onboarding.persisted);
    assert_eq!(std::fs::read(keys_path(&devices)).unwrap(), keys_before);
}

#[tokio::test]
async fn test_duplicate_ids_onboard_once() {
    let fx = Fixture::new();
    let devices = fx.devices_file("dev-1\ndev-2\ndev-1\n");
    let cloud = InMemoryControlPlane::new();

    let report = fx
        .deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap();

    let onboarding = report.onboarding.unwrap();
    assert_eq!(onboarding.registered(), 2);
    assert_eq!(onboarding.already_registered(), 1);
    assert_eq!(fx.registry.device_count(), 2);

    let stored = read_keys(&devices);
    assert_eq!(stored.len(), 2);
    let (primary, secondary) = &stored["dev-1"];
    let registered = fx.registry.registration("dev-1").unwrap();
    assert_eq!(primary, &registered.primary_key);
    assert_eq!(secondary, &registered.secondary_key);
}

#[tokio::test]
async fn test_submitted_keys_are_unique() {
    let fx = Fixture::new();
    let devices = fx.devices_file("a\nb\nc\nd\ne\n");
    let cloud = InMemoryControlPlane::new();

    fx.deploy(&cloud, fx.settings(Some(devices))).await.unwrap();

    let mut seen = HashSet::new();
    for call in fx.registry.calls() {
        if let RegistryCall::CreateDevice {
            primary_key,
            secondary_key,
            ..
        } = call
        {
            assert!(seen.insert(primary_key));
            assert!(seen.insert(secondary_key));
        }
    }
    assert_eq!(seen.len(), 10);
}

#[tokio::test]
async fn test_conflicting_device_keys_are_not_persisted() {
    let fx = Fixture::with_registry(InMemoryDeviceRegistry::new().with_device("dev-1"));
    let devices = fx.devices_file("dev-1\ndev-2\n");
    let cloud = InMemoryControlPlane::new();

    fx.deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap();

    let stored = read_keys(&devices);
    assert!(!stored.contains_key("dev-1"));
    assert!(stored.contains_key("dev-2"));
}

#[tokio::test]
async fn test_existing_key_file_is_merged() {
    let fx = Fixture::new();
    let devices = fx.devices_file("dev-2\n");
    std::fs::write(
        keys_path(&devices),
        r#"{"dev-0": ["old-primary", "old-secondary"]}"#,
    )
    .unwrap();
    let cloud = InMemoryControlPlane::new();

    fx.deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap();

    let stored = read_keys(&devices);
    assert_eq!(
        stored["dev-0"],
        ("old-primary".to_string(), "old-secondary".to_string())
    );
    assert!(stored.contains_key("dev-2"));
}

#[tokio::test]
async fn test_persist_each_registration() {
    let fx = Fixture::new();
    let devices = fx.devices_file("dev-1\ndev-2\n");
    let cloud = InMemoryControlPlane::new();
    let mut settings = fx.settings(Some(devices.clone()));
    settings.persist = PersistPolicy::EachRegistration;

    let report = fx.deploy(&cloud, settings).await.unwrap();

    assert!(report.onboarding.unwrap().persisted);
    assert_eq!(read_keys(&devices).len(), 2);
}

#[tokio::test]
async fn test_device_failure_stops_the_run() {
    let fx = Fixture::with_registry(InMemoryDeviceRegistry::new().with_failing_device("dev-2"));
    let devices = fx.devices_file("dev-1\ndev-2\ndev-3\n");
    let cloud = InMemoryControlPlane::new();

    let err = fx
        .deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap_err();

    match err {
        DeployError::Device { ref device_id, .. } => assert_eq!(device_id, "dev-2"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(fx.registry.registration("dev-3").is_none());
    assert!(
        !cloud
            .calls()
            .iter()
            .any(|c| matches!(c, Call::CreateOrUpdate { kind: ResourceKind::DocumentStore, .. }))
    );

    let stored = read_keys(&devices);
    assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["dev-1"]);
}

#[tokio::test]
async fn test_failed_twin_update_keeps_registered_keys() {
    for persist in [PersistPolicy::AfterRun, PersistPolicy::EachRegistration] {
        let fx = Fixture::with_registry(InMemoryDeviceRegistry::new().with_failing_twin("edge-2"));
        let devices = fx.devices_file("edge-1\nedge-2\nedge-3\n");
        let cloud = InMemoryControlPlane::new();
        let mut settings = fx.settings(Some(devices.clone()));
        settings.edge = true;
        settings.iiot = true;
        settings.persist = persist;

        let err = fx.deploy(&cloud, settings).await.unwrap_err();

        match err {
            DeployError::Device { ref device_id, .. } => assert_eq!(device_id, "edge-2"),
            other => panic!("{:?}: unexpected error: {}", persist, other),
        }
        assert!(fx.registry.registration("edge-3").is_none());

        // edge-2 exists in the registry, so its keys must be on disk
        let stored = read_keys(&devices);
        assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["edge-1", "edge-2"]);
        let registered = fx.registry.registration("edge-2").unwrap();
        assert_eq!(
            stored["edge-2"],
            (registered.primary_key, registered.secondary_key),
            "{:?}",
            persist
        );
    }
}

#[tokio::test]
async fn test_key_save_failure_keeps_device_error() {
    let fx = Fixture::with_registry(InMemoryDeviceRegistry::new().with_failing_device("dev-2"));
    let devices = fx.devices_file("dev-1\ndev-2\n");
    std::fs::write(keys_path(&devices), "not json").unwrap();
    let cloud = InMemoryControlPlane::new();

    let err = fx
        .deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap_err();

    match err {
        DeployError::Device { ref device_id, .. } => assert_eq!(device_id, "dev-2"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(
        std::fs::read_to_string(keys_path(&devices)).unwrap(),
        "not json"
    );
}

#[tokio::test]
async fn test_blank_device_file_writes_no_keys() {
    let fx = Fixture::new();
    let devices = fx.devices_file("\n   \n\n");
    let cloud = InMemoryControlPlane::new();

    let report = fx
        .deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap();

    let onboarding = report.onboarding.unwrap();
    assert!(onboarding.outcomes.is_empty());
    assert!(!onboarding.persisted);
    assert!(!keys_path(&devices).exists());
    assert!(fx.registry.calls().is_empty());
    assert!(fx.connector.connections().is_empty());
}

#[tokio::test]
async fn test_blank_device_file_leaves_key_file_untouched() {
    let fx = Fixture::new();
    let devices = fx.devices_file("  \n");
    let existing = "{\n  \"old\": [\"p\", \"s\"]\n}";
    std::fs::write(keys_path(&devices), existing).unwrap();
    let cloud = InMemoryControlPlane::new();

    let report = fx
        .deploy(&cloud, fx.settings(Some(devices.clone())))
        .await
        .unwrap();

    assert_eq!(report.onboarding.unwrap().registered(), 0);
    assert_eq!(std::fs::read(keys_path(&devices)).unwrap(), existing.as_bytes());
    assert!(fx.registry.calls().is_empty());
}

#[tokio::test]
async fn test_host_is_created_after_its_dependencies() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new();
    let settings = fx.settings(None);
    let names = settings.names.clone();

    fx.deploy(&cloud, settings).await.unwrap();

    let calls = cloud.calls();
    let host = position(&calls, &create(ResourceKind::ComputeHost, &names.compute_host));
    let plan = position(&calls, &create(ResourceKind::ComputePlan, &names.compute_plan));
    let storage = position(
        &calls,
        &create(ResourceKind::StorageAccount, &names.storage_account),
    );
    let storage_keys = position(
        &calls,
        &Call::GetKeys {
            kind: ResourceKind::StorageAccount,
            name: names.storage_account.clone(),
        },
    );
    let store_keys = position(
        &calls,
        &Call::GetKeys {
            kind: ResourceKind::DocumentStore,
            name: names.document_store.clone(),
        },
    );

    assert!(plan < storage);
    assert!(storage < storage_keys);
    assert!(storage_keys < host);
    assert!(store_keys < host);

    let plan_wait = calls[plan..]
        .iter()
        .position(|c| matches!(c, Call::WaitForCompletion { .. }))
        .map(|offset| plan + offset)
        .unwrap();
    assert!(plan_wait < host);
}

#[tokio::test]
async fn test_host_spec_references_plan_and_secrets() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new();
    let settings = fx.settings(None);
    let names = settings.names.clone();

    let report = fx.deploy(&cloud, settings).await.unwrap();

    let plan = report.find(ResourceKind::ComputePlan).unwrap();
    let host = report.find(ResourceKind::ComputeHost).unwrap();
    let spec = cloud.spec_of(host.descriptor()).unwrap();
    assert_eq!(spec["properties"]["serverFarmId"], plan.id());

    let settings = spec["properties"]["siteConfig"]["appSettings"]
        .as_array()
        .unwrap();
    assert_eq!(settings.len(), 7);
    let storage = settings
        .iter()
        .find(|s| s["name"] == "AzureWebJobsStorage")
        .unwrap();
    let expected_key = format!("{}-key2", names.storage_account);
    assert!(storage["value"].as_str().unwrap().contains(&expected_key));
}

#[tokio::test]
async fn test_taken_document_store_name_is_fatal() {
    let fx = Fixture::new();
    let settings = fx.settings(None);
    let names = settings.names.clone();
    let cloud = InMemoryControlPlane::new()
        .with_taken_name(ResourceKind::DocumentStore, names.document_store.clone());

    let err = fx.deploy(&cloud, settings).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::NameUnavailable {
            kind: ResourceKind::DocumentStore,
            ..
        }
    ));
    let created: Vec<_> = cloud
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::CreateOrUpdate { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        created,
        vec![ResourceKind::ResourceGroup, ResourceKind::DeviceRegistry]
    );
}

#[tokio::test]
async fn test_failed_read_back_blocks_host() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new().with_failing_reads(ResourceKind::StorageAccount);

    let err = fx.deploy(&cloud, fx.settings(None)).await.unwrap_err();

    assert!(matches!(err, DeployError::MissingSecret { .. }));
    assert!(
        !cloud
            .calls()
            .iter()
            .any(|c| matches!(c, Call::CreateOrUpdate { kind: ResourceKind::ComputeHost, .. }))
    );
}

#[tokio::test]
async fn test_invalid_flags_fail_before_any_call() {
    let fx = Fixture::new();
    let devices = fx.devices_file("dev-1\n");
    let cloud = InMemoryControlPlane::new();
    let mut settings = fx.settings(Some(devices));
    settings.iiot = true;

    let err = fx.deploy(&cloud, settings).await.unwrap_err();

    assert!(matches!(err, DeployError::InvalidInput(_)));
    assert!(cloud.calls().is_empty());
    assert!(fx.registry.calls().is_empty());
}

#[tokio::test]
async fn test_missing_device_file_fails_before_any_call() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new();
    let settings = fx.settings(Some(fx.dir.path().join("absent.txt")));

    let err = fx.deploy(&cloud, settings).await.unwrap_err();

    assert!(matches!(err, DeployError::InvalidInput(_)));
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_edge_iiot_devices_get_tags() {
    let fx = Fixture::new();
    let devices = fx.devices_file("edge-1\n");
    let cloud = InMemoryControlPlane::new();
    let mut settings = fx.settings(Some(devices));
    settings.edge = true;
    settings.iiot = true;

    fx.deploy(&cloud, settings).await.unwrap();

    assert!(fx.registry.registration("edge-1").unwrap().edge);
    assert!(fx.registry.calls().iter().any(|c| matches!(
        c,
        RegistryCall::UpdateTwin { device_id, .. } if device_id == "edge-1"
    )));
}

#[tokio::test]
async fn test_function_files_are_written() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new();
    let creds = fx.dir.path().join("creds.json");
    std::fs::write(&creds, CREDS).unwrap();
    let code = fx.dir.path().join("functions");
    let mut settings = fx.settings(None);
    settings.functions_code_path = Some(code.clone());
    settings.vendor_credentials_path = Some(creds);

    let report = fx.deploy(&cloud, settings).await.unwrap();

    assert_eq!(report.function_files.len(), 4);
    assert!(code.join("CosmosTrigger").join("function.json").exists());
    assert!(code.join("TimerTrigger_vemcon").join("creds.json").exists());
}

#[tokio::test]
async fn test_bad_vendor_credentials_fail_before_any_call() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new();
    let creds = fx.dir.path().join("creds.json");
    std::fs::write(&creds, r#"{"other": {}}"#).unwrap();
    let mut settings = fx.settings(None);
    settings.functions_code_path = Some(fx.dir.path().join("functions"));
    settings.vendor_credentials_path = Some(creds);

    let err = fx.deploy(&cloud, settings).await.unwrap_err();

    assert!(matches!(err, DeployError::InvalidInput(_)));
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_onboard_existing_requires_registry() {
    let fx = Fixture::new();
    let cloud = InMemoryControlPlane::new();
    let registry = ResourceDescriptor::new(
        ResourceKind::DeviceRegistry,
        "iot-hub-materialfluss00042",
        "North Europe",
        "IoT-project",
    );

    let err = onboard_existing(
        &cloud,
        &fx.connector,
        &registry,
        &["dev-1".to_string()],
        OnboardOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DeployError::UpstreamMissing(_)));

    let cloud = cloud.with_existing(&registry);
    let report = onboard_existing(
        &cloud,
        &fx.connector,
        &registry,
        &["dev-1".to_string()],
        OnboardOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(report.registered(), 1);
    assert_eq!(
        fx.connector.connections()[0].to_string(),
        "HostName=iot-hub-materialfluss00042.azure-devices.net;\
         SharedAccessKeyName=iothubowner;\
         SharedAccessKey=iot-hub-materialfluss00042-owner2"
    );
    assert!(cloud.exists(&registry).await.unwrap());
    assert_eq!(
        report.outcomes[0].state,
        hubflow_core::DeviceState::Registered
    );
}
