//! Wiring of one export run.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use lawex_azure::{BlobEndpoint, BlobStorageClient, KeyVaultClient, LogAnalyticsClient};
use lawex_scheduler::{
    ExportScheduler, RunSummary, SchedulerSettings, StagingArea, WindowPolicy, reference_offset,
};

use crate::catalog::load_catalog;
use crate::config::Config;
use crate::credentials::select_credential;
use crate::error::JobError;

/// Run every catalog query once.
///
/// Errors returned here are fatal and happen before any query runs.
/// Per-query failures are part of the summary.
pub async fn run(config: &Config) -> Result<RunSummary, JobError> {
    config.validate().map_err(JobError::Configuration)?;

    let now = Utc::now().with_timezone(&reference_offset());
    info!(%now, environment = %config.dtap_letter, "started job to export data");

    let credential = select_credential(config);

    let workspace_id = KeyVaultClient::new(&config.keyvault_name, credential.clone())
        .get_secret(&config.workspace_secret_name)
        .await
        .map_err(|source| JobError::SecretRetrieval {
            vault: config.keyvault_name.clone(),
            secret: config.workspace_secret_name.clone(),
            source,
        })?;
    debug!(workspace_id = %workspace_id, "resolved log analytics workspace");

    let queries = load_catalog(&config.catalog, config)?;

    let endpoint = match &config.blob_endpoint {
        Some(url) => BlobEndpoint::Custom(url.clone()),
        None => BlobEndpoint::Public,
    };
    let storage = Arc::new(BlobStorageClient::new(endpoint, credential.clone()));

    let mut executor = LogAnalyticsClient::new(workspace_id, credential);
    if let Some(url) = &config.log_analytics_endpoint {
        executor = executor.with_endpoint(url.clone());
    }

    // Kept alive until the batch is done
    let (staging_root, _staging_guard) = staging_root(config)?;

    let window_policy = WindowPolicy::from_flag(config.first_backfill, config.first_backfill_days);
    if let Some(backfill) = window_policy.backfill() {
        warn!(days = backfill.days, "first backfill enabled, checkpoints are ignored");
    }

    let scheduler = ExportScheduler::new(
        SchedulerSettings {
            default_account: config.storage_account.clone(),
            subscription_id: config.subscription_id.clone(),
            resource_group: config.resource_group.clone(),
            window_policy,
        },
        storage.clone(),
        storage,
        Arc::new(executor),
        StagingArea::new(staging_root),
    );

    Ok(scheduler.run(&queries, now).await)
}

fn staging_root(config: &Config) -> Result<(PathBuf, Option<tempfile::TempDir>), JobError> {
    match &config.staging_dir {
        Some(dir) => Ok((dir.clone(), None)),
        None => {
            let dir = tempfile::Builder::new()
                .prefix("lawex-")
                .tempdir()
                .map_err(|e| {
                    JobError::Configuration(format!("cannot create staging directory: {}", e))
                })?;
            Ok((dir.path().to_path_buf(), Some(dir)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(extra: &[&str]) -> Config {
        let mut argv = vec![
            "lawex",
            "--dtap-letter",
            "t",
            "--storage-account",
            "sadatat",
            "--keyvault-name",
            "kv",
            "--workspace-secret-name",
            "ws",
            "--client-id",
            "id",
            "--subscription-id",
            "sub",
            "--resource-group",
            "rg",
        ];
        argv.extend_from_slice(extra);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_configured_staging_dir_is_used() {
        let (root, guard) = staging_root(&config(&["--staging-dir", "/var/lawex"])).unwrap();
        assert_eq!(root, PathBuf::from("/var/lawex"));
        assert!(guard.is_none());
    }

    #[test]
    fn test_temporary_staging_dir() {
        let (root, guard) = staging_root(&config(&[])).unwrap();
        assert!(root.exists());
        drop(guard);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_request() {
        let mut config = config(&[]);
        config.resource_group = String::new();

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, JobError::Configuration(_)));
    }
}
