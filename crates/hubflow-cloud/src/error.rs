//! Cloud control-plane error types

use crate::resource::ResourceKind;
use thiserror::Error;

/// Control-plane and device-registry errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{kind} name '{name}' is not available")]
    NameUnavailable { kind: ResourceKind, name: String },

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error is the "already exists" conflict the callers recover from
    pub fn is_conflict(&self) -> bool {
        matches!(self, CloudError::AlreadyExists(_))
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        CloudError::ApiError {
            status,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
