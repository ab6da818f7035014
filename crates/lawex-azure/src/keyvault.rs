//! Key Vault secret reader.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::AzureError;
use crate::credential::{KEY_VAULT_RESOURCE, TokenCredential};
use crate::retry::RetryPolicy;

const API_VERSION: &str = "7.4";

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Reads secrets from one vault.
pub struct KeyVaultClient {
    http: Client,
    vault_url: String,
    credential: Arc<dyn TokenCredential>,
    retry: RetryPolicy,
}

impl KeyVaultClient {
    /// Client for `https://{vault_name}.vault.azure.net`.
    pub fn new(vault_name: &str, credential: Arc<dyn TokenCredential>) -> Self {
        Self::with_url(format!("https://{}.vault.azure.net", vault_name), credential)
    }

    /// Client for an explicit vault URL.
    pub fn with_url(vault_url: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            vault_url: vault_url.into().trim_end_matches('/').to_string(),
            credential,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Latest version of secret `name`.
    #[instrument(skip(self), fields(vault = %self.vault_url))]
    pub async fn get_secret(&self, name: &str) -> Result<String, AzureError> {
        let token = self.credential.get_token(KEY_VAULT_RESOURCE).await?;
        let url = format!("{}/secrets/{}", self.vault_url, name);

        let bundle: SecretBundle = self
            .retry
            .run("get_secret", || async {
                let response = self
                    .http
                    .get(&url)
                    .query(&[("api-version", API_VERSION)])
                    .bearer_auth(&token.token)
                    .send()
                    .await?;

                if response.status() == StatusCode::NOT_FOUND {
                    return Err(AzureError::NotFound(format!("secret {}", name)));
                }
                if !response.status().is_success() {
                    return Err(AzureError::from_response(response).await);
                }
                Ok(response.json().await?)
            })
            .await?;

        let value = bundle
            .value
            .ok_or_else(|| AzureError::InvalidResponse(format!("secret {} has no value", name)))?;
        debug!(name, "retrieved secret");
        Ok(value)
    }
}
