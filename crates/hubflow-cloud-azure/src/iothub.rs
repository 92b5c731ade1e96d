//! IoT Hub device-registry client
//!
//! Device identities are created with `PUT /devices/{id}` and tagged with
//! `PATCH /twins/{id}`, signed with a shared-access token of the hub's owner
//! policy.

use crate::arm::status_error;
use crate::error::AzureError;
use crate::sas::generate_sas_token;
use async_trait::async_trait;
use hubflow_cloud::{
    DeviceRegistration, DeviceRegistryClient, DeviceRegistryConnection, RegistrationOutcome,
    RegistryConnector, Result,
};
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};

const IOT_HUB_API_VERSION: &str = "2021-04-12";

/// Lifetime of each signed request token
const TOKEN_TTL_SECS: i64 = 3600;

/// Registry client of one hub
pub struct IotHubRegistry {
    client: reqwest::Client,
    connection: DeviceRegistryConnection,
}

impl IotHubRegistry {
    /// Fails if the connection's key is not valid base64
    pub fn new(connection: DeviceRegistryConnection) -> Result<Self> {
        let registry = Self {
            client: reqwest::Client::new(),
            connection,
        };
        registry.token()?;
        Ok(registry)
    }

    fn token(&self) -> Result<String> {
        let expiry = chrono::Utc::now().timestamp() + TOKEN_TTL_SECS;
        Ok(generate_sas_token(
            &self.connection.host_name,
            &self.connection.key,
            Some(&self.connection.key_name),
            expiry,
        )?)
    }

    fn url(&self, collection: &str, device_id: &str) -> String {
        format!(
            "https://{}/{}/{}?api-version={}",
            self.connection.host_name,
            collection,
            urlencoding::encode(device_id),
            IOT_HUB_API_VERSION
        )
    }
}

/// Request body of a device identity with symmetric-key authentication
fn device_body(registration: &DeviceRegistration) -> Value {
    json!({
        "deviceId": registration.device_id,
        "status": "enabled",
        "authentication": {
            "type": "sas",
            "symmetricKey": {
                "primaryKey": registration.primary_key,
                "secondaryKey": registration.secondary_key,
            }
        },
        "capabilities": {
            "iotEdge": registration.edge,
        }
    })
}

#[async_trait]
impl DeviceRegistryClient for IotHubRegistry {
    async fn create_device(
        &self,
        registration: &DeviceRegistration,
    ) -> Result<RegistrationOutcome> {
        let url = self.url("devices", &registration.device_id);
        tracing::debug!("PUT device {}", registration.device_id);

        let response = self
            .client
            .put(&url)
            .header(AUTHORIZATION, self.token()?)
            .json(&device_body(registration))
            .send()
            .await
            .map_err(AzureError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(RegistrationOutcome::Created);
        }
        if status.as_u16() == 409 {
            return Ok(RegistrationOutcome::Conflict);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body))
    }

    async fn update_twin(&self, device_id: &str, tags: &Value) -> Result<()> {
        let url = self.url("twins", device_id);
        tracing::debug!("PATCH twin {}", device_id);

        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.token()?)
            .json(&json!({ "tags": tags }))
            .send()
            .await
            .map_err(AzureError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body))
    }
}

/// Opens [`IotHubRegistry`] clients
#[derive(Debug, Default, Clone, Copy)]
pub struct IotHubConnector;

impl RegistryConnector for IotHubConnector {
    fn connect(
        &self,
        connection: &DeviceRegistryConnection,
    ) -> Result<Box<dyn DeviceRegistryClient>> {
        Ok(Box::new(IotHubRegistry::new(connection.clone())?))
    }
}
