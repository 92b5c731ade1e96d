//! Azure control plane implementation

use crate::api::{self, NameCheck, kind_api};
use crate::arm::{ArmClient, retry_after, status_error};
use crate::az::AzureCliCredential;
use async_trait::async_trait;
use hubflow_cloud::{
    AccessKey, AuthStatus, CloudError, ControlPlane, Operation, PollConfig, PollTarget,
    REGISTRY_OWNER_POLICY, ResourceDescriptor, ResourceKind, Result,
};
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Azure control plane over the resource-manager REST API
pub struct AzureControlPlane {
    arm: ArmClient,
    subscription_id: String,
    poll: PollConfig,
}

impl AzureControlPlane {
    pub fn new(subscription_id: impl Into<String>, credential: Arc<AzureCliCredential>) -> Self {
        Self {
            arm: ArmClient::new(credential),
            subscription_id: subscription_id.into(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    fn resource_url(&self, descriptor: &ResourceDescriptor) -> Result<String> {
        let path = api::resource_path(&self.subscription_id, descriptor)?;
        Ok(self.arm.url(&path, kind_api(descriptor.kind).api_version))
    }

    fn action_url(&self, descriptor: &ResourceDescriptor, action: &str) -> Result<String> {
        let path = api::resource_path(&self.subscription_id, descriptor)?;
        Ok(self.arm.url(
            &format!("{}/{}", path, action),
            kind_api(descriptor.kind).api_version,
        ))
    }

    async fn poll_once(&self, target: &PollTarget) -> Result<PollState> {
        match target {
            PollTarget::StatusUrl(url) => {
                let response = self.arm.send(Method::GET, url, None).await?;
                let after = retry_after(response.headers());
                let body: Value = response.json().await.map_err(crate::AzureError::from)?;
                let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("");
                Ok(classify_state(status, &body, after))
            }
            PollTarget::Location(url) => {
                let response = self.arm.request(Method::GET, url, None).await?;
                let status = response.status();
                if status.as_u16() == 202 {
                    return Ok(PollState::Running(retry_after(response.headers())));
                }
                if status.is_success() {
                    return Ok(PollState::Succeeded);
                }
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status.as_u16(), &body))
            }
            PollTarget::Resource(url) => {
                let body = self.arm.get_json(url).await?;
                let state = provisioning_state(&body).unwrap_or("Succeeded");
                Ok(classify_state(state, &body, None))
            }
        }
    }
}

#[async_trait]
impl ControlPlane for AzureControlPlane {
    fn name(&self) -> &str {
        "azure"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        match self.arm.credential().cli().check_auth().await {
            Ok(account) => {
                let user = account
                    .user
                    .map(|u| format!(" as {}", u.name))
                    .unwrap_or_default();
                Ok(AuthStatus::ok(format!(
                    "{} ({}){}",
                    account.name, account.id, user
                )))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn resource_group_exists(&self, name: &str) -> Result<bool> {
        let path = api::resource_group_path(&self.subscription_id, name);
        let url = self.arm.url(&path, api::RESOURCE_GROUP_API_VERSION);
        Ok(self.arm.head(&url).await?)
    }

    async fn list_by_group(
        &self,
        kind: ResourceKind,
        group: &str,
        parents: &[String],
    ) -> Result<Vec<String>> {
        if kind == ResourceKind::ResourceGroup {
            return Err(CloudError::InvalidConfig(
                "resource groups are checked directly, not listed".to_string(),
            ));
        }
        let path = api::collection_path(&self.subscription_id, kind, group, parents)?;
        let url = self.arm.url(&path, kind_api(kind).api_version);
        let items = self.arm.list(&url).await?;

        Ok(items
            .iter()
            .filter_map(|item| item.get("name").and_then(|n| n.as_str()))
            .map(str::to_string)
            .collect())
    }

    async fn check_name_availability(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        let api = kind_api(kind);
        match api.name_check {
            NameCheck::Post { type_name } => {
                let path = format!(
                    "{}/providers/{}/checkNameAvailability",
                    api::subscription_path(&self.subscription_id),
                    api.provider
                );
                let url = self.arm.url(&path, api.api_version);
                let mut body = json!({ "name": name });
                if let Some(type_name) = type_name {
                    body["type"] = json!(type_name);
                }
                let response = self.arm.post_json(&url, Some(&body)).await?;
                name_available(&response)
            }
            NameCheck::Head => {
                let path = format!("/providers/{}/databaseAccountNames/{}", api.provider, name);
                let url = self.arm.url(&path, api.api_version);
                let taken = self.arm.head(&url).await?;
                Ok(!taken)
            }
            NameCheck::None => Err(CloudError::InvalidConfig(format!(
                "{} names are not globally scoped",
                kind
            ))),
        }
    }

    async fn create_or_update(
        &self,
        descriptor: &ResourceDescriptor,
        spec: &Value,
    ) -> Result<Operation> {
        let url = self.resource_url(descriptor)?;
        let response = self.arm.send(Method::PUT, &url, Some(spec)).await?;

        let headers = response.headers();
        let async_operation = headers
            .get("Azure-AsyncOperation")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let location = headers
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let status = response.status().as_u16();
        let text = response.text().await.map_err(crate::AzureError::from)?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        tracing::debug!("PUT {} answered {}", descriptor.key(), status);

        operation_from_response(
            self.resource_id(descriptor),
            url,
            status,
            async_operation,
            location,
            &body,
        )
    }

    async fn wait_for_completion(&self, operation: Operation) -> Result<String> {
        let Some(target) = operation.poll else {
            return Ok(operation.resource_id);
        };

        let deadline = Instant::now() + self.poll.timeout;
        loop {
            match self.poll_once(&target).await? {
                PollState::Succeeded => return Ok(operation.resource_id),
                PollState::Failed(reason) => {
                    return Err(CloudError::OperationFailed(format!(
                        "{}: {}",
                        operation.resource_id, reason
                    )));
                }
                PollState::Running(after) => {
                    if Instant::now() >= deadline {
                        return Err(CloudError::Timeout(format!(
                            "{} did not finish within {}s",
                            operation.resource_id,
                            self.poll.timeout.as_secs()
                        )));
                    }
                    tracing::debug!("Waiting for {}", operation.resource_id);
                    tokio::time::sleep(after.unwrap_or(self.poll.interval)).await;
                }
            }
        }
    }

    async fn get_keys(&self, descriptor: &ResourceDescriptor) -> Result<Vec<AccessKey>> {
        let action = match descriptor.kind {
            ResourceKind::StorageAccount | ResourceKind::DocumentStore => "listKeys".to_string(),
            ResourceKind::DeviceRegistry => {
                format!("IotHubKeys/{}/listkeys", REGISTRY_OWNER_POLICY)
            }
            kind => {
                return Err(CloudError::InvalidConfig(format!("{} has no access keys", kind)));
            }
        };
        let url = self.action_url(descriptor, &action)?;
        let body = self.arm.post_json(&url, None).await?;
        parse_keys(descriptor.kind, &body)
    }

    async fn get_endpoint(&self, descriptor: &ResourceDescriptor) -> Result<String> {
        let url = self.resource_url(descriptor)?;
        let body = self.arm.get_json(&url).await?;
        parse_endpoint(descriptor.kind, &body)
    }

    fn resource_id(&self, descriptor: &ResourceDescriptor) -> String {
        api::resource_path(&self.subscription_id, descriptor).unwrap_or_else(|_| descriptor.key())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PollState {
    Running(Option<Duration>),
    Succeeded,
    Failed(String),
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body.get("properties")
        .and_then(|p| p.get("provisioningState"))
        .and_then(|s| s.as_str())
}

fn classify_state(state: &str, body: &Value, after: Option<Duration>) -> PollState {
    match state {
        "Succeeded" => PollState::Succeeded,
        "Failed" | "Canceled" => {
            let reason = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or(state);
            PollState::Failed(reason.to_string())
        }
        _ => PollState::Running(after),
    }
}

/// Decide how completion of a PUT is observed
fn operation_from_response(
    resource_id: String,
    resource_url: String,
    status: u16,
    async_operation: Option<String>,
    location: Option<String>,
    body: &Value,
) -> Result<Operation> {
    if let Some(url) = async_operation {
        return Ok(Operation::pending(resource_id, PollTarget::StatusUrl(url)));
    }
    if status == 202 {
        if let Some(url) = location {
            return Ok(Operation::pending(resource_id, PollTarget::Location(url)));
        }
    }

    let resource_id = body
        .get("id")
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .unwrap_or(resource_id);

    match provisioning_state(body) {
        None | Some("Succeeded") => Ok(Operation::completed(resource_id)),
        Some("Failed") | Some("Canceled") => Err(CloudError::OperationFailed(format!(
            "{} entered a terminal failure state",
            resource_id
        ))),
        Some(_) => Ok(Operation::pending(
            resource_id,
            PollTarget::Resource(resource_url),
        )),
    }
}

fn name_available(body: &Value) -> Result<bool> {
    body.get("nameAvailable")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| {
            CloudError::OperationFailed("name availability response lacks nameAvailable".to_string())
        })
}

fn parse_keys(kind: ResourceKind, body: &Value) -> Result<Vec<AccessKey>> {
    let field = |name: &str| {
        body.get(name)
            .and_then(|v| v.as_str())
            .map(|v| AccessKey::new(name, v))
    };

    let keys: Vec<AccessKey> = match kind {
        ResourceKind::StorageAccount => body
            .get("keys")
            .and_then(|k| k.as_array())
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| {
                        let name = k.get("keyName")?.as_str()?;
                        let value = k.get("value")?.as_str()?;
                        Some(AccessKey::new(name, value))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        ResourceKind::DocumentStore => ["primaryMasterKey", "secondaryMasterKey"]
            .into_iter()
            .filter_map(field)
            .collect(),
        ResourceKind::DeviceRegistry => ["primaryKey", "secondaryKey"]
            .into_iter()
            .filter_map(field)
            .collect(),
        _ => Vec::new(),
    };

    if keys.is_empty() {
        return Err(CloudError::OperationFailed(format!(
            "no access keys in {} key listing",
            kind
        )));
    }
    Ok(keys)
}

fn parse_endpoint(kind: ResourceKind, body: &Value) -> Result<String> {
    let properties = body.get("properties");
    let endpoint = match kind {
        ResourceKind::DeviceRegistry => properties.and_then(|p| p.get("hostName")),
        ResourceKind::DocumentStore => properties.and_then(|p| p.get("documentEndpoint")),
        ResourceKind::StorageAccount => properties
            .and_then(|p| p.get("primaryEndpoints"))
            .and_then(|e| e.get("blob")),
        ResourceKind::ComputeHost => properties.and_then(|p| p.get("defaultHostName")),
        _ => None,
    };

    endpoint
        .and_then(|e| e.as_str())
        .map(str::to_string)
        .ok_or_else(|| CloudError::OperationFailed(format!("{} reported no endpoint", kind)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(status: u16, async_op: Option<&str>, location: Option<&str>, body: Value) -> Result<Operation> {
        operation_from_response(
            "/computed/id".to_string(),
            "https://arm/resource".to_string(),
            status,
            async_op.map(str::to_string),
            location.map(str::to_string),
            &body,
        )
    }

    #[test]
    fn test_async_operation_header_wins() {
        let operation = op(201, Some("https://status"), Some("https://loc"), json!({})).unwrap();
        assert_eq!(
            operation.poll,
            Some(PollTarget::StatusUrl("https://status".to_string()))
        );
    }

    #[test]
    fn test_accepted_with_location() {
        let operation = op(202, None, Some("https://loc"), Value::Null).unwrap();
        assert_eq!(operation.poll, Some(PollTarget::Location("https://loc".to_string())));
        assert_eq!(operation.resource_id, "/computed/id");
    }

    #[test]
    fn test_synchronous_success_uses_returned_id() {
        let operation = op(
            200,
            None,
            None,
            json!({"id": "/subscriptions/s/resourceGroups/IoT-project", "properties": {"provisioningState": "Succeeded"}}),
        )
        .unwrap();
        assert!(operation.is_complete());
        assert_eq!(operation.resource_id, "/subscriptions/s/resourceGroups/IoT-project");
    }

    #[test]
    fn test_in_progress_polls_resource() {
        let operation = op(
            201,
            None,
            None,
            json!({"properties": {"provisioningState": "Creating"}}),
        )
        .unwrap();
        assert_eq!(
            operation.poll,
            Some(PollTarget::Resource("https://arm/resource".to_string()))
        );
    }

    #[test]
    fn test_failed_state_is_error() {
        let err = op(200, None, None, json!({"properties": {"provisioningState": "Failed"}}))
            .unwrap_err();
        assert!(matches!(err, CloudError::OperationFailed(_)));
    }

    #[test]
    fn test_classify_state() {
        assert_eq!(classify_state("Succeeded", &Value::Null, None), PollState::Succeeded);
        assert_eq!(
            classify_state("InProgress", &Value::Null, Some(Duration::from_secs(3))),
            PollState::Running(Some(Duration::from_secs(3)))
        );
        assert_eq!(
            classify_state("Failed", &json!({"error": {"message": "quota"}}), None),
            PollState::Failed("quota".to_string())
        );
        assert_eq!(
            classify_state("Canceled", &Value::Null, None),
            PollState::Failed("Canceled".to_string())
        );
    }

    #[test]
    fn test_parse_storage_keys_keeps_order() {
        let body = json!({"keys": [
            {"keyName": "key1", "value": "aaa", "permissions": "FULL"},
            {"keyName": "key2", "value": "bbb", "permissions": "FULL"}
        ]});
        let keys = parse_keys(ResourceKind::StorageAccount, &body).unwrap();
        assert_eq!(keys[0].name, "key1");
        assert_eq!(keys[1].value, "bbb");
    }

    #[test]
    fn test_parse_document_store_keys() {
        let body = json!({
            "primaryMasterKey": "m1",
            "secondaryMasterKey": "m2",
            "primaryReadonlyMasterKey": "r1"
        });
        let keys = parse_keys(ResourceKind::DocumentStore, &body).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], AccessKey::new("primaryMasterKey", "m1"));
    }

    #[test]
    fn test_parse_registry_keys() {
        let body = json!({"keyName": "iothubowner", "primaryKey": "p", "secondaryKey": "s", "rights": "RegistryWrite"});
        let keys = parse_keys(ResourceKind::DeviceRegistry, &body).unwrap();
        assert_eq!(keys[1], AccessKey::new("secondaryKey", "s"));
    }

    #[test]
    fn test_parse_keys_empty_is_error() {
        assert!(parse_keys(ResourceKind::StorageAccount, &json!({"keys": []})).is_err());
    }

    #[test]
    fn test_parse_endpoint() {
        let hub = json!({"properties": {"hostName": "hub.azure-devices.net"}});
        assert_eq!(
            parse_endpoint(ResourceKind::DeviceRegistry, &hub).unwrap(),
            "hub.azure-devices.net"
        );
        let cosmos = json!({"properties": {"documentEndpoint": "https://c.documents.azure.com:443/"}});
        assert_eq!(
            parse_endpoint(ResourceKind::DocumentStore, &cosmos).unwrap(),
            "https://c.documents.azure.com:443/"
        );
        assert!(parse_endpoint(ResourceKind::ComputePlan, &json!({"properties": {}})).is_err());
    }

    #[test]
    fn test_name_available() {
        assert!(name_available(&json!({"nameAvailable": true})).unwrap());
        assert!(!name_available(&json!({"nameAvailable": false, "reason": "AlreadyExists"})).unwrap());
        assert!(name_available(&json!({})).is_err());
    }
}
