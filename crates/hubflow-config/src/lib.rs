pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the settings file directly
pub const CONFIG_PATH_ENV: &str = "HUBFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 3] = ["hubflow.local.yaml", "hubflow.yaml", ".hubflow.yaml"];

/// Values a settings file may provide. Every field is optional; flags and
/// environment variables take precedence over anything set here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub subscription_id: Option<String>,
    pub location: Option<String>,
    pub resource_group: Option<String>,
    /// Shared suffix of generated resource names
    pub name_suffix: Option<String>,
    pub iot_hub_sku: Option<String>,
    pub functions_code_path: Option<PathBuf>,
    pub vendor_credentials_path: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Locate the settings file
///
/// Search order:
/// 1. `HUBFLOW_CONFIG_PATH` (direct path)
/// 2. Current directory: hubflow.local.yaml, hubflow.yaml, .hubflow.yaml
/// 3. ~/.config/hubflow/hubflow.yaml (global settings)
///
/// Returns `None` when no file exists; running without one is normal.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!(
            "{} points at {}, which does not exist",
            CONFIG_PATH_ENV,
            path.display()
        );
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("hubflow").join("hubflow.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Find and load the settings file, defaulting to empty settings
pub fn load_config() -> Result<FileConfig> {
    match find_config_file()? {
        Some(path) => {
            tracing::debug!("Loading settings from {}", path.display());
            FileConfig::from_path(&path)
        }
        None => Ok(FileConfig::default()),
    }
}
