//! Token credentials.
//!
//! The job needs bearer tokens for three resources (storage, Key Vault, Log
//! Analytics). On the cluster they come from the pod's managed identity; on a
//! developer workstation from the Azure CLI login.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;

use crate::AzureError;

/// Token audience for Blob Storage.
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

/// Token audience for Key Vault.
pub const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";

/// Token audience for the Log Analytics query API.
pub const LOG_ANALYTICS_RESOURCE: &str = "https://api.loganalytics.io";

/// Instance metadata service of Azure hosts.
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";

/// Tokens this close to expiry are refreshed.
const EXPIRY_MARGIN_SECS: i64 = 300;

/// A bearer token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable at `now`, with a safety margin.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

/// Something that can hand out bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, resource: &str) -> Result<AccessToken, AzureError>;
}

/// Managed identity through the instance metadata service.
pub struct ManagedIdentityCredential {
    http: Client,
    endpoint: String,
    client_id: Option<String>,
}

/// Token response of the metadata service.
#[derive(Debug, Deserialize)]
struct ImdsToken {
    access_token: String,
    #[serde(deserialize_with = "string_or_number")]
    expires_on: i64,
}

impl ManagedIdentityCredential {
    /// Use the user-assigned identity `client_id`, or the system identity.
    pub fn new(client_id: Option<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            client_id: client_id.filter(|id| !id.is_empty()),
        }
    }

    /// Point at another metadata endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, resource: &str) -> Result<AccessToken, AzureError> {
        let url = format!("{}/metadata/identity/oauth2/token", self.endpoint);

        let mut query = vec![("api-version", "2018-02-01"), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let response = self
            .http
            .get(&url)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = AzureError::from_response(response).await;
            return Err(AzureError::Credential(format!(
                "managed identity token request failed: {}",
                err
            )));
        }

        let token: ImdsToken = response.json().await?;
        let expires_on = Utc
            .timestamp_opt(token.expires_on, 0)
            .single()
            .ok_or_else(|| {
                AzureError::Credential(format!("invalid token expiry {}", token.expires_on))
            })?;

        debug!(resource, %expires_on, "obtained managed identity token");
        Ok(AccessToken {
            token: token.access_token,
            expires_on,
        })
    }
}

/// The developer's `az login` session.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
}

/// Output of `az account get-access-token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(rename = "expires_on", default)]
    expires_on_unix: Option<i64>,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
        }
    }
}

impl AzureCliCredential {
    /// Use another CLI executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn parse_output(stdout: &[u8]) -> Result<AccessToken, AzureError> {
        let token: CliToken = serde_json::from_slice(stdout)?;

        let expires_on = match (token.expires_on_unix, token.expires_on.as_deref()) {
            (Some(unix), _) => Utc.timestamp_opt(unix, 0).single(),
            // Older CLIs print local wall-clock time.
            (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
                .map(|dt| dt.with_timezone(&Utc)),
            (None, None) => None,
        }
        .ok_or_else(|| AzureError::Credential("azure cli token has no valid expiry".to_string()))?;

        Ok(AccessToken {
            token: token.access_token,
            expires_on,
        })
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, resource: &str) -> Result<AccessToken, AzureError> {
        let output = Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--resource",
                resource,
                "--output",
                "json",
            ])
            .output()
            .await?;

        if !output.status.success() {
            return Err(AzureError::Credential(format!(
                "az account get-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token = Self::parse_output(&output.stdout)?;
        debug!(resource, expires_on = %token.expires_on, "obtained azure cli token");
        Ok(token)
    }
}

/// Reuses tokens per resource until they are about to expire.
pub struct CachedCredential<C> {
    inner: C,
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl<C: TokenCredential> CachedCredential<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<C: TokenCredential> TokenCredential for CachedCredential<C> {
    async fn get_token(&self, resource: &str) -> Result<AccessToken, AzureError> {
        {
            let tokens = self.tokens.read().await;
            if let Some(token) = tokens.get(resource) {
                if token.is_fresh(Utc::now()) {
                    return Ok(token.clone());
                }
            }
        }

        let token = self.inner.get_token(resource).await?;
        self.tokens
            .write()
            .await
            .insert(resource.to_string(), token.clone());
        Ok(token)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
