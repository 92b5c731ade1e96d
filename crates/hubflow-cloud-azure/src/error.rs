//! Azure provider error types

use hubflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("Azure CLI not found. Please install: https://aka.ms/installazurecli")]
    AzCliNotFound,

    #[error("Azure CLI authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid shared access key: {0}")]
    InvalidKey(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::CloudError(e) => e,
            AzureError::JsonError(e) => CloudError::Json(e),
            AzureError::IoError(e) => CloudError::Io(e),
            AzureError::HttpError(e) => {
                let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
                CloudError::api(status, e.to_string())
            }
            e @ (AzureError::AzCliNotFound | AzureError::AuthenticationFailed(_)) => {
                CloudError::AuthenticationFailed(e.to_string())
            }
            AzureError::CommandFailed(msg) => CloudError::CommandFailed(msg),
            AzureError::InvalidKey(msg) => CloudError::InvalidConfig(msg),
            AzureError::UnexpectedResponse(msg) => CloudError::OperationFailed(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_error_passes_through() {
        let err: CloudError = AzureError::CloudError(CloudError::AlreadyExists("x".into())).into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_missing_cli_is_auth_failure() {
        let err: CloudError = AzureError::AzCliNotFound.into();
        assert!(matches!(err, CloudError::AuthenticationFailed(_)));
    }
}
