//! Blob Storage REST client.
//!
//! Holds exported files and the per-container checkpoint blob. Only the few
//! operations the job needs are implemented: container existence check and
//! creation, block blob upload and blob download.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, info, instrument};

use lawex_scheduler::{
    BoxError, CHECKPOINT_BLOB, CheckpointMarker, CheckpointStore, Destination, ExportStorage,
};

use crate::AzureError;
use crate::credential::{STORAGE_RESOURCE, TokenCredential};
use crate::retry::RetryPolicy;

/// Storage service version sent with every request.
pub const STORAGE_API_VERSION: &str = "2021-08-06";

/// Where storage accounts are reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobEndpoint {
    /// `https://{account}.blob.core.windows.net`
    Public,
    /// `{base}/{account}`, as served by local emulators.
    Custom(String),
}

impl BlobEndpoint {
    pub fn account_url(&self, account: &str) -> String {
        match self {
            BlobEndpoint::Public => format!("https://{}.blob.core.windows.net", account),
            BlobEndpoint::Custom(base) => {
                format!("{}/{}", base.trim_end_matches('/'), account)
            }
        }
    }
}

/// Client for blob containers across storage accounts.
pub struct BlobStorageClient {
    http: Client,
    endpoint: BlobEndpoint,
    credential: Arc<dyn TokenCredential>,
    retry: RetryPolicy,
}

impl BlobStorageClient {
    pub fn new(endpoint: BlobEndpoint, credential: Arc<dyn TokenCredential>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            endpoint,
            credential,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn container_url(&self, destination: &Destination) -> String {
        format!(
            "{}/{}",
            self.endpoint.account_url(&destination.account),
            destination.container
        )
    }

    fn blob_url(&self, destination: &Destination, blob: &str) -> String {
        format!("{}/{}", self.container_url(destination), blob)
    }

    /// Attach auth and versioning headers.
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, AzureError> {
        let token = self.credential.get_token(STORAGE_RESOURCE).await?;
        Ok(request
            .bearer_auth(token.token)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            ))
    }

    /// Whether the container exists.
    pub async fn container_exists(&self, destination: &Destination) -> Result<bool, AzureError> {
        let url = self.container_url(destination);

        self.retry
            .run("container_exists", || async {
                let request = self
                    .authorize(self.http.get(&url).query(&[("restype", "container")]))
                    .await?;
                let response = request.send().await?;

                match response.status() {
                    status if status.is_success() => Ok(true),
                    StatusCode::NOT_FOUND => Ok(false),
                    _ => Err(AzureError::from_response(response).await),
                }
            })
            .await
    }

    /// Create the container. An existing container is not an error.
    pub async fn create_container(&self, destination: &Destination) -> Result<(), AzureError> {
        let url = self.container_url(destination);

        self.retry
            .run("create_container", || async {
                let request = self
                    .authorize(self.http.put(&url).query(&[("restype", "container")]))
                    .await?;
                let response = request.header("Content-Length", "0").send().await?;

                match response.status() {
                    status if status.is_success() => Ok(()),
                    StatusCode::CONFLICT => {
                        debug!(%destination, "container created concurrently");
                        Ok(())
                    }
                    _ => Err(AzureError::from_response(response).await),
                }
            })
            .await
    }

    /// Upload `data` as a block blob, replacing any existing blob.
    pub async fn put_blob(
        &self,
        destination: &Destination,
        blob: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AzureError> {
        let url = self.blob_url(destination, blob);

        self.retry
            .run("put_blob", || async {
                let request = self.authorize(self.http.put(&url)).await?;
                let response = request
                    .header("x-ms-blob-type", "BlockBlob")
                    .header("Content-Type", content_type)
                    .body(data.clone())
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(AzureError::from_response(response).await);
                }
                Ok(())
            })
            .await
    }

    /// Download a blob; `None` when it does not exist.
    pub async fn get_blob(
        &self,
        destination: &Destination,
        blob: &str,
    ) -> Result<Option<Vec<u8>>, AzureError> {
        let url = self.blob_url(destination, blob);

        self.retry
            .run("get_blob", || async {
                let request = self.authorize(self.http.get(&url)).await?;
                let response = request.send().await?;

                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    return Err(AzureError::from_response(response).await);
                }
                Ok(Some(response.bytes().await?.to_vec()))
            })
            .await
    }
}

#[async_trait]
impl ExportStorage for BlobStorageClient {
    #[instrument(skip_all, fields(destination = %destination))]
    async fn ensure_container(&self, destination: &Destination) -> Result<(), BoxError> {
        if self.container_exists(destination).await? {
            debug!("Container exists already");
            return Ok(());
        }

        info!("creating container");
        self.create_container(destination).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(destination = %destination, blob = %blob, bytes = data.len()))]
    async fn upload(
        &self,
        destination: &Destination,
        blob: &str,
        data: Vec<u8>,
    ) -> Result<(), BoxError> {
        self.put_blob(destination, blob, data, "application/json")
            .await?;
        debug!("uploaded blob");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for BlobStorageClient {
    async fn read(&self, destination: &Destination) -> Result<Option<String>, BoxError> {
        match self.get_blob(destination, CHECKPOINT_BLOB).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    AzureError::InvalidResponse(format!("checkpoint is not UTF-8: {}", e))
                })?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        destination: &Destination,
        marker: &CheckpointMarker,
    ) -> Result<(), BoxError> {
        self.put_blob(
            destination,
            CHECKPOINT_BLOB,
            marker.render().into_bytes(),
            "text/plain",
        )
        .await?;
        debug!(%destination, %marker, "checkpoint written");
        Ok(())
    }
}
