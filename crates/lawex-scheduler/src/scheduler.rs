//! Export scheduler implementation.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, error, info, warn};

use crate::ExportError;
use crate::checkpoint::{CheckpointMarker, MarkerState};
use crate::partition::PartitionPath;
use crate::staging::StagingArea;
use crate::traits::{CheckpointStore, ExportStorage, QueryExecutor, QueryFailure};
use crate::types::{Destination, QueryDefinition, QueryOutcome, QueryReport, RunSummary};
use crate::window::{WindowPolicy, reference_offset};

/// Batch-wide settings of the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Storage account used unless a query overrides it.
    pub default_account: String,
    /// Subscription id written into partition paths.
    pub subscription_id: String,
    /// Resource group written into partition paths.
    pub resource_group: String,
    /// Window and backfill policy shared by every query.
    pub window_policy: WindowPolicy,
}

/// Runs the query catalog, one query at a time.
pub struct ExportScheduler {
    settings: SchedulerSettings,
    storage: Arc<dyn ExportStorage>,
    checkpoints: Arc<dyn CheckpointStore>,
    executor: Arc<dyn QueryExecutor>,
    staging: StagingArea,
}

impl ExportScheduler {
    /// Create a new scheduler.
    pub fn new(
        settings: SchedulerSettings,
        storage: Arc<dyn ExportStorage>,
        checkpoints: Arc<dyn CheckpointStore>,
        executor: Arc<dyn QueryExecutor>,
        staging: StagingArea,
    ) -> Self {
        Self {
            settings,
            storage,
            checkpoints,
            executor,
            staging,
        }
    }

    /// Where a query's exports and checkpoint live.
    pub fn destination_for(&self, query: &QueryDefinition) -> Destination {
        let account = query
            .destination_override
            .clone()
            .unwrap_or_else(|| self.settings.default_account.clone());

        Destination {
            account,
            container: query.container_name(),
        }
    }

    /// Export every query in order.
    ///
    /// `now` is pinned for the whole batch: every window ends at it, every
    /// partition path and every new marker is derived from it. A failing
    /// query never stops the ones after it.
    #[tracing::instrument(skip(self, queries), fields(queries = queries.len()))]
    pub async fn run(&self, queries: &[QueryDefinition], now: DateTime<FixedOffset>) -> RunSummary {
        let now = now.with_timezone(&reference_offset());
        info!(%now, "started export batch");

        let mut summary = RunSummary::default();
        for query in queries {
            let destination = self.destination_for(query);
            let outcome = self.export_query(query, now).await;
            info!(query = %query.name, outcome = outcome.label(), "finished exporting query");

            summary.reports.push(QueryReport {
                query: query.name.clone(),
                destination,
                outcome,
            });
        }

        info!(
            exported = summary.exported(),
            skipped = summary.skipped(),
            no_data = summary.no_data(),
            failed = summary.failed(),
            "finished exporting all queries"
        );
        summary
    }

    /// Run the full pipeline for one query.
    ///
    /// Self-contained: it reads nothing but its arguments and the
    /// collaborators, so it can be dispatched to a worker as long as every
    /// worker gets the same `now`.
    #[tracing::instrument(skip(self, query), fields(query = %query.name))]
    pub async fn export_query(
        &self,
        query: &QueryDefinition,
        now: DateTime<FixedOffset>,
    ) -> QueryOutcome {
        // Markers and partitions are always written at the reference offset
        let now = now.with_timezone(&reference_offset());
        match self.try_export(query, now).await {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(error = %error, "export failed, checkpoint left unchanged");
                QueryOutcome::Failed { error }
            }
        }
    }

    async fn try_export(
        &self,
        query: &QueryDefinition,
        now: DateTime<FixedOffset>,
    ) -> Result<QueryOutcome, ExportError> {
        let destination = self.destination_for(query);
        if query.destination_override.is_some() {
            info!(account = %destination.account, "custom storage account destination is set");
        }

        self.storage
            .ensure_container(&destination)
            .await
            .map_err(|source| ExportError::ContainerProvisioning {
                container: destination.container.clone(),
                source,
            })?;

        let raw = self
            .checkpoints
            .read(&destination)
            .await
            .map_err(|source| ExportError::CheckpointRead {
                container: destination.container.clone(),
                source,
            })?;
        let previous = CheckpointMarker::parse(raw.as_deref())?;
        match previous {
            MarkerState::Absent => info!(container = %destination.container, "no checkpoint, first-time export"),
            MarkerState::Blank => warn!(container = %destination.container, "checkpoint is empty, exporting without a start time"),
            MarkerState::At(at) => debug!(last_run = %at, "read checkpoint"),
        }

        let window = self
            .settings
            .window_policy
            .compute(now, &previous, query.duration_minutes);

        if !window.is_due {
            let remaining_minutes = window.remaining_minutes();
            info!(
                duration_minutes = query.duration_minutes,
                remaining_minutes, "export not due yet, skipping"
            );
            return Ok(QueryOutcome::Skipped { remaining_minutes });
        }

        info!(
            start = ?window.start,
            end = %window.end,
            first_time = window.is_first_time_export,
            "getting data for time range"
        );

        let result = self
            .executor
            .execute(&query.query, window.start, window.end)
            .await
            .map_err(|failure| match failure {
                QueryFailure::Partial { message } => ExportError::PartialResult(message),
                QueryFailure::Failed(source) => ExportError::Execution(source),
            })?;

        if result.is_empty() {
            info!("query returned no data, skipping upload");
            return Ok(QueryOutcome::NoData);
        }

        let rows = result.row_count();
        let body = serde_json::to_vec(&result.to_records())?;
        let blob = PartitionPath::new(
            &query.version,
            &self.settings.subscription_id,
            &self.settings.resource_group,
            now,
        )
        .blob_name();

        let staged = self.staging.stage(&destination.container, &body).await?;
        let uploaded = self.upload_staged(&destination, &blob, &staged).await;
        self.staging.discard(&staged).await;
        uploaded?;
        info!(blob = %blob, rows, "uploaded export");

        let marker = match previous {
            // Never move a checkpoint backwards.
            MarkerState::At(at) if at > now => {
                warn!(last_run = %at, %now, "checkpoint is ahead of this run, keeping it");
                CheckpointMarker::new(at)
            }
            _ => {
                let marker = CheckpointMarker::new(now);
                self.checkpoints
                    .write(&destination, &marker)
                    .await
                    .map_err(|source| ExportError::CheckpointWrite {
                        container: destination.container.clone(),
                        source,
                    })?;
                info!(marker = %marker, "advanced checkpoint");
                marker
            }
        };

        Ok(QueryOutcome::Exported {
            blob_path: blob,
            rows,
            marker,
        })
    }

    async fn upload_staged(
        &self,
        destination: &Destination,
        blob: &str,
        staged: &Path,
    ) -> Result<(), ExportError> {
        let data = self.staging.read(staged).await?;
        self.storage
            .upload(destination, blob, data)
            .await
            .map_err(|source| ExportError::Persistence {
                blob: blob.to_string(),
                source,
            })
    }
}
