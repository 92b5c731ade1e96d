//! Azure CLI wrapper
//!
//! Authentication is delegated to an existing `az login` session. The CLI
//! hands out bearer tokens for the management endpoint, which the REST
//! clients attach to every request.

use crate::error::{AzureError, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Token audience of the resource manager
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Azure CLI wrapper
pub struct AzCli {
    subscription_id: Option<String>,
}

impl AzCli {
    pub fn new(subscription_id: Option<String>) -> Self {
        Self { subscription_id }
    }

    /// Check if az exists and a login session is active
    pub async fn check_auth(&self) -> Result<AzAccount> {
        let which = Command::new("which").arg("az").output().await?;

        if !which.status.success() {
            return Err(AzureError::AzCliNotFound);
        }

        let output = self
            .run_command(&["account", "show", "--output", "json"])
            .await
            .map_err(|e| match e {
                AzureError::CommandFailed(msg) => AzureError::AuthenticationFailed(msg),
                other => other,
            })?;

        let account: AzAccount = serde_json::from_str(&output)?;
        Ok(account)
    }

    /// Fetch a bearer token for `resource`
    pub async fn get_access_token(&self, resource: &str) -> Result<AccessToken> {
        let output = self
            .run_command(&[
                "account",
                "get-access-token",
                "--resource",
                resource,
                "--output",
                "json",
            ])
            .await?;

        let token: AccessToken = serde_json::from_str(&output)?;
        Ok(token)
    }

    /// Run an az command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("az");
        cmd.args(args);
        if let Some(ref subscription) = self.subscription_id {
            cmd.arg("--subscription").arg(subscription);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: az {}", args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// `az account show` output
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzAccount {
    pub id: String,
    pub name: String,
    pub tenant_id: Option<String>,
    pub user: Option<AzUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzUser {
    pub name: String,
}

/// `az account get-access-token` output
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    #[serde(rename = "accessToken")]
    pub access_token: String,

    /// Local wall-clock time, e.g. `2024-05-01 12:00:00.000000`
    #[serde(rename = "expiresOn")]
    pub expires_on: Option<String>,

    /// POSIX timestamp, emitted by newer CLI versions
    #[serde(rename = "expires_on")]
    pub expires_on_timestamp: Option<i64>,
}

impl AccessToken {
    /// Expiry instant, or `None` if the CLI reported nothing parseable
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.expires_on_timestamp {
            return DateTime::from_timestamp(ts, 0);
        }
        let raw = self.expires_on.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_on", &self.expires_on)
            .finish_non_exhaustive()
    }
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Bearer-token source backed by the Azure CLI session
///
/// One credential is created per run and shared by every client.
pub struct AzureCliCredential {
    cli: AzCli,
    cached: Mutex<Option<CachedToken>>,
}

impl AzureCliCredential {
    pub fn new(subscription_id: Option<String>) -> Self {
        Self {
            cli: AzCli::new(subscription_id),
            cached: Mutex::new(None),
        }
    }

    pub fn cli(&self) -> &AzCli {
        &self.cli
    }

    /// Management-plane bearer token, cached until shortly before expiry
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(ref entry) = *cached {
            if entry.expires_at - Duration::minutes(REFRESH_MARGIN_MINUTES) > now {
                return Ok(entry.token.clone());
            }
        }

        let fresh = self.cli.get_access_token(MANAGEMENT_RESOURCE).await?;
        let expires_at = fresh
            .expires_at()
            .unwrap_or(now + Duration::minutes(REFRESH_MARGIN_MINUTES));
        tracing::debug!("Acquired management token (expires {})", expires_at);

        *cached = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at,
        });
        Ok(fresh.access_token)
    }
}
