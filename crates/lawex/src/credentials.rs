//! Credential selection.

use std::sync::Arc;

use tracing::info;

use lawex_azure::{
    AzureCliCredential, CachedCredential, ManagedIdentityCredential, TokenCredential,
};

use crate::config::Config;

/// Whether `hostname` belongs to a developer workstation.
pub fn is_workstation(hostname: &str, prefix: &str, no_workstation: bool) -> bool {
    if no_workstation || prefix.is_empty() {
        return false;
    }
    hostname.to_lowercase().starts_with(&prefix.to_lowercase())
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Azure CLI login on workstations, managed identity everywhere else.
pub fn select_credential(config: &Config) -> Arc<dyn TokenCredential> {
    let host = local_hostname();

    if is_workstation(&host, &config.workstation_prefix, config.no_workstation.is_some()) {
        info!(host = %host, "workstation detected, using azure cli credential");
        Arc::new(CachedCredential::new(AzureCliCredential::default()))
    } else {
        info!(client_id = %config.client_id, "using managed identity credential");
        Arc::new(CachedCredential::new(ManagedIdentityCredential::new(Some(
            config.client_id.clone(),
        ))))
    }
}
