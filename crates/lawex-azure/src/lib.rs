//! Azure clients for the export job.
//!
//! Implements the scheduler's collaborator traits over the Azure REST APIs:
//!
//! - **Blob Storage**: export containers, result files and checkpoint blobs
//! - **Log Analytics**: query execution against the workspace
//! - **Key Vault**: the workspace id secret
//! - **Credentials**: managed identity or the developer's Azure CLI login

pub mod blob;
pub mod credential;
mod error;
pub mod keyvault;
pub mod loganalytics;
pub mod retry;

pub use blob::{BlobEndpoint, BlobStorageClient, STORAGE_API_VERSION};
pub use credential::{
    AccessToken, AzureCliCredential, CachedCredential, KEY_VAULT_RESOURCE, LOG_ANALYTICS_RESOURCE,
    ManagedIdentityCredential, STORAGE_RESOURCE, TokenCredential,
};
pub use error::AzureError;
pub use keyvault::KeyVaultClient;
pub use loganalytics::{DEFAULT_LOG_ANALYTICS_ENDPOINT, LogAnalyticsClient, render_query};
pub use retry::RetryPolicy;
