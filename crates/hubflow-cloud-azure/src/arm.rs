//! Azure Resource Manager REST client
//!
//! Thin wrapper over `reqwest` that attaches the management bearer token and
//! maps HTTP failures onto [`CloudError`] variants.

use crate::api::error_message;
use crate::az::AzureCliCredential;
use crate::error::{AzureError, Result};
use hubflow_cloud::CloudError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const ARM_API_BASE: &str = "https://management.azure.com";

/// Resource-manager client
pub struct ArmClient {
    client: reqwest::Client,
    credential: Arc<AzureCliCredential>,
    base_url: String,
}

impl ArmClient {
    pub fn new(credential: Arc<AzureCliCredential>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential,
            base_url: ARM_API_BASE.to_string(),
        }
    }

    pub fn credential(&self) -> &AzureCliCredential {
        &self.credential
    }

    /// Absolute URL of a management path
    pub fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, path, api_version)
    }

    /// Send an authenticated request and return the raw response
    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Response> {
        let token = self.credential.token().await?;

        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send a request and fail on any non-success status
    pub async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Response> {
        let response = self.request(method, url, body).await?;
        check_status(response).await
    }

    pub async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.send(Method::GET, url, None).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let response = self.send(Method::POST, url, body).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Existence probe: `true` on 2xx, `false` on 404
    pub async fn head(&self, url: &str) -> Result<bool> {
        let response = self.request(Method::HEAD, url, None).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if status.is_success() {
            return Ok(true);
        }
        Err(status_error(status.as_u16(), "").into())
    }

    /// All items of a collection, following `nextLink` pages
    pub async fn list(&self, url: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            let page = self.get_json(&page_url).await?;
            if let Some(values) = page.get("value").and_then(|v| v.as_array()) {
                items.extend(values.iter().cloned());
            }
            next = page
                .get("nextLink")
                .and_then(|n| n.as_str())
                .filter(|n| !n.is_empty())
                .map(str::to_string);
        }

        Ok(items)
    }
}

/// Pass successful responses through, convert the rest into errors
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AzureError::CloudError(status_error(status.as_u16(), &body)))
}

/// Map an HTTP failure onto the shared error taxonomy
pub(crate) fn status_error(status: u16, body: &str) -> CloudError {
    let message = if body.trim().is_empty() {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("no response body")
            .to_string()
    } else {
        error_message(body)
    };

    match status {
        409 => CloudError::AlreadyExists(message),
        401 | 403 => CloudError::AuthenticationFailed(message),
        404 => CloudError::ResourceNotFound(message),
        _ => CloudError::api(status, message),
    }
}

/// `Retry-After` in seconds, if the service sent one
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(409, r#"{"error":{"code":"Conflict","message":"taken"}}"#),
            CloudError::AlreadyExists(m) if m == "Conflict: taken"
        ));
        assert!(matches!(status_error(401, ""), CloudError::AuthenticationFailed(_)));
        assert!(matches!(status_error(403, ""), CloudError::AuthenticationFailed(_)));
        assert!(matches!(status_error(404, ""), CloudError::ResourceNotFound(_)));
        assert!(matches!(
            status_error(500, "boom"),
            CloudError::ApiError { status: 500, message } if message == "boom"
        ));
    }

    #[test]
    fn test_status_error_empty_body_uses_reason() {
        match status_error(503, "") {
            CloudError::ApiError { message, .. } => assert_eq!(message, "Service Unavailable"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("15"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(15)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_url() {
        let client = ArmClient::new(Arc::new(AzureCliCredential::new(None)));
        assert_eq!(
            client.url("/subscriptions/s/resourceGroups/rg", "2021-04-01"),
            "https://management.azure.com/subscriptions/s/resourceGroups/rg?api-version=2021-04-01"
        );
    }
}
