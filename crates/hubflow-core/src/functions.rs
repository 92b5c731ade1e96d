//! Function bindings and vendor credentials
//!
//! Renders the `function.json` of each function in the code directory and
//! the credentials file a data puller reads at runtime. Uploading the code
//! is not done here.

use crate::error::{DeployError, Result};
use crate::provision::{DATABASE_NAME, LATEST_MESSAGES_CONTAINER, MESSAGES_CONTAINER};
use crate::wiring::{document_store_setting, registry_setting};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

pub const COSMOS_TRIGGER_FUNCTION: &str = "CosmosTrigger";
pub const IOT_HUB_TRIGGER_FUNCTION: &str = "IoTHub_EventHub";
/// Per-puller file holding the vendor secrets
pub const CREDENTIALS_FILE: &str = "creds.json";

/// A timer function pulling telemetry from one vendor endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPuller {
    pub function: &'static str,
    pub vendor: &'static str,
    pub endpoint: &'static str,
    /// NCRONTAB schedule with a seconds field
    pub schedule: &'static str,
}

pub const DATA_PULLERS: &[DataPuller] = &[DataPuller {
    function: "TimerTrigger_vemcon",
    vendor: "vemcon",
    endpoint: "api.vemcon.net",
    schedule: "*/30 * * * * *",
}];

/// `vendor -> endpoint -> auth fields`
#[derive(Debug, Clone, PartialEq)]
pub struct VendorCredentials {
    vendors: Map<String, Value>,
}

impl VendorCredentials {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeployError::InvalidInput(format!(
                    "vendor credentials file {} does not exist",
                    path.display()
                ))
            } else {
                DeployError::io(path, e)
            }
        })?;
        Self::parse(&content).map_err(|reason| {
            DeployError::InvalidInput(format!("{}: {}", path.display(), reason))
        })
    }

    /// Parse and shape-check; the error is a human-readable reason
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let Value::Object(vendors) = value else {
            return Err("expected an object of vendors".to_string());
        };
        for (vendor, endpoints) in &vendors {
            let Some(endpoints) = endpoints.as_object() else {
                return Err(format!("vendor '{}' must map endpoints to objects", vendor));
            };
            for (endpoint, auth) in endpoints {
                if !auth.is_object() {
                    return Err(format!(
                        "credentials of '{}' at '{}' must be an object",
                        vendor, endpoint
                    ));
                }
            }
        }
        Ok(Self { vendors })
    }

    /// Auth fields of `vendor` at `endpoint`
    pub fn endpoint(&self, vendor: &str, endpoint: &str) -> Result<&Value> {
        self.vendors
            .get(vendor)
            .and_then(|endpoints| endpoints.get(endpoint))
            .ok_or_else(|| {
                DeployError::InvalidInput(format!(
                    "vendor credentials lack '{}' at '{}'",
                    vendor, endpoint
                ))
            })
    }
}

/// A file to place below the functions-code directory
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionFile {
    pub relative_path: PathBuf,
    pub content: Value,
}

/// Binding names of one deployment
#[derive(Debug, Clone)]
pub struct FunctionBindings {
    pub document_store: String,
    pub device_registry: String,
}

impl FunctionBindings {
    pub fn new(document_store: impl Into<String>, device_registry: impl Into<String>) -> Self {
        Self {
            document_store: document_store.into(),
            device_registry: device_registry.into(),
        }
    }

    fn document_output(&self, container: &str) -> Value {
        json!({
            "name": "outputDocument",
            "direction": "out",
            "type": "cosmosDB",
            "databaseName": DATABASE_NAME,
            "collectionName": container,
            "connectionStringSetting": document_store_setting(&self.document_store),
        })
    }

    /// New messages are copied into the latest-message container
    pub fn cosmos_trigger(&self) -> Value {
        json!({
            "bindings": [
                {
                    "type": "cosmosDBTrigger",
                    "name": "documents",
                    "direction": "in",
                    "leaseCollectionName": format!("{}_leases", MESSAGES_CONTAINER),
                    "connectionStringSetting": document_store_setting(&self.document_store),
                    "databaseName": DATABASE_NAME,
                    "collectionName": MESSAGES_CONTAINER,
                    "createLeaseCollectionIfNotExists": true,
                },
                self.document_output(LATEST_MESSAGES_CONTAINER),
            ]
        })
    }

    /// Device-registry events are stored as messages
    pub fn iot_hub_trigger(&self) -> Value {
        json!({
            "bindings": [
                {
                    "type": "eventHubTrigger",
                    "name": "IoTHubMessages",
                    "direction": "in",
                    "eventHubName": self.device_registry,
                    "connection": registry_setting(&self.device_registry),
                    "cardinality": "many",
                    "consumerGroup": "$Default",
                },
                self.document_output(MESSAGES_CONTAINER),
            ]
        })
    }

    pub fn data_puller(&self, puller: &DataPuller) -> Value {
        json!({
            "bindings": [
                {
                    "name": "myTimer",
                    "type": "timerTrigger",
                    "direction": "in",
                    "schedule": puller.schedule,
                },
                self.document_output(MESSAGES_CONTAINER),
            ]
        })
    }

    /// Every binding and credentials file; fails if a puller has no credentials
    pub fn render(&self, credentials: &VendorCredentials) -> Result<Vec<FunctionFile>> {
        let mut files = vec![
            function_json(COSMOS_TRIGGER_FUNCTION, self.cosmos_trigger()),
            function_json(IOT_HUB_TRIGGER_FUNCTION, self.iot_hub_trigger()),
        ];
        for puller in DATA_PULLERS {
            let creds = credentials.endpoint(puller.vendor, puller.endpoint)?;
            files.push(function_json(puller.function, self.data_puller(puller)));
            files.push(FunctionFile {
                relative_path: Path::new(puller.function).join(CREDENTIALS_FILE),
                content: creds.clone(),
            });
        }
        Ok(files)
    }
}

fn function_json(function: &str, content: Value) -> FunctionFile {
    FunctionFile {
        relative_path: Path::new(function).join("function.json"),
        content,
    }
}

/// Write rendered files below `code_path`, creating function directories.
///
/// The vendor credentials files stay on disk so the code directory can be
/// uploaded; [`remove_vendor_credentials`] deletes them afterwards.
pub async fn write_function_files(code_path: &Path, files: &[FunctionFile]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = code_path.join(&file.relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeployError::io(parent, e))?;
        }
        let content =
            serde_json::to_string_pretty(&file.content).map_err(|e| DeployError::json(&path, e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| DeployError::io(&path, e))?;
        tracing::debug!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Delete the vendor credentials file of every data puller below `code_path`.
/// Returns the files that were removed; missing files are skipped.
pub async fn remove_vendor_credentials(code_path: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for puller in DATA_PULLERS {
        let path = code_path.join(puller.function).join(CREDENTIALS_FILE);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Removed {}", path.display());
                removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DeployError::io(&path, e)),
        }
    }
    Ok(removed)
}
