//! Deployment error types

use hubflow_cloud::{CloudError, ResourceKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{kind} name '{name}' is not available; it is taken by another owner")]
    NameUnavailable { kind: ResourceKind, name: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Could not read credentials of {resource}: {detail}")]
    MissingSecret { resource: String, detail: String },

    #[error("{0} must be provisioned before this step")]
    UpstreamMissing(String),

    #[error("Device '{device_id}' could not be registered: {source}")]
    Device {
        device_id: String,
        #[source]
        source: CloudError,
    },

    #[error("Cloud error: {0}")]
    Cloud(#[source] CloudError),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        DeployError::Json {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing_secret(resource: impl Into<String>, detail: impl ToString) -> Self {
        DeployError::MissingSecret {
            resource: resource.into(),
            detail: detail.to_string(),
        }
    }
}

impl From<CloudError> for DeployError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::NameUnavailable { kind, name } => DeployError::NameUnavailable { kind, name },
            CloudError::InvalidConfig(msg) => DeployError::InvalidInput(msg),
            other => DeployError::Cloud(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
