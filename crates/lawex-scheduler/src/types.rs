//! Export scheduler types.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checkpoint::CheckpointMarker;
use crate::window::DEFAULT_WINDOW_MINUTES;

/// Prefix of every export container name.
pub const CONTAINER_PREFIX: &str = "export-";

/// One exportable dataset from the query catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefinition {
    /// Unique query name, also the source of the container name.
    pub name: String,
    /// Version tag echoed into the partition path.
    pub version: String,
    /// Minimum minutes between two successful exports.
    pub duration_minutes: u32,
    /// Query text with environment tokens already substituted.
    pub query: String,
    /// Alternate storage account for this query.
    pub destination_override: Option<String>,
}

impl QueryDefinition {
    /// Create a query definition, normalizing name, version and duration.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        duration_minutes: u32,
        query: impl Into<String>,
        destination_override: Option<String>,
    ) -> Self {
        let duration_minutes = if duration_minutes == 0 {
            DEFAULT_WINDOW_MINUTES
        } else {
            duration_minutes
        };

        Self {
            name: name.into().trim().to_string(),
            version: version.into().trim().to_string(),
            duration_minutes,
            query: query.into(),
            destination_override: destination_override
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        }
    }

    /// Container holding this query's exports and checkpoint.
    pub fn container_name(&self) -> String {
        format!("{}{}", CONTAINER_PREFIX, self.name.to_lowercase())
    }
}

/// The window decision for one query in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportWindow {
    /// Lower bound of the query, `None` when the marker was blank.
    pub start: Option<DateTime<FixedOffset>>,
    /// Upper bound of the query (the run's `now`).
    pub end: DateTime<FixedOffset>,
    /// No marker existed before this run.
    pub is_first_time_export: bool,
    /// Whether the query should run now.
    pub is_due: bool,
    /// Configured cadence the window was checked against.
    pub duration_minutes: u32,
}

impl ExportWindow {
    /// Minutes between start and end, `None` without a start.
    pub fn elapsed_minutes(&self) -> Option<f64> {
        self.start
            .map(|start| (self.end - start).num_milliseconds() as f64 / 60_000.0)
    }

    /// Minutes left before the query becomes due again.
    pub fn remaining_minutes(&self) -> f64 {
        match self.elapsed_minutes() {
            Some(elapsed) if !self.is_due => (self.duration_minutes as f64 - elapsed).max(0.0),
            _ => 0.0,
        }
    }
}

/// A column of a result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
}

/// A table returned by the query executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    #[serde(default)]
    pub name: String,
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Value>>,
}

/// Result set of one query execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub tables: Vec<ResultTable>,
}

impl QueryResult {
    /// The table that gets exported. Later tables are ignored.
    pub fn primary_table(&self) -> Option<&ResultTable> {
        self.tables.first()
    }

    /// True when there is nothing to export.
    pub fn is_empty(&self) -> bool {
        self.primary_table()
            .map(|t| t.rows.is_empty() || t.columns.is_empty())
            .unwrap_or(true)
    }

    /// Number of exported rows.
    pub fn row_count(&self) -> usize {
        self.primary_table().map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Render the primary table as one JSON object per row.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        let Some(table) = self.primary_table() else {
            return Vec::new();
        };

        table
            .rows
            .iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| (col.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Where a query's data and checkpoint live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Storage account name.
    pub account: String,
    /// Container inside the account.
    pub container: String,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.container)
    }
}

/// How a single query's export ended.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Not enough time has passed since the last export.
    Skipped { remaining_minutes: f64 },
    /// The query ran but returned no rows.
    NoData,
    /// Results were uploaded and the checkpoint advanced.
    Exported {
        blob_path: String,
        rows: usize,
        marker: CheckpointMarker,
    },
    /// Something failed; the checkpoint is unchanged.
    Failed { error: crate::ExportError },
}

impl QueryOutcome {
    /// Short label for logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            QueryOutcome::Skipped { .. } => "skipped",
            QueryOutcome::NoData => "no_data",
            QueryOutcome::Exported { .. } => "exported",
            QueryOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed { .. })
    }
}

/// Outcome of one query within a batch.
#[derive(Debug)]
pub struct QueryReport {
    pub query: String,
    pub destination: Destination,
    pub outcome: QueryOutcome,
}

/// Aggregated outcome of a batch run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<QueryReport>,
}

impl RunSummary {
    fn count(&self, label: &str) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn exported(&self) -> usize {
        self.count("exported")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn no_data(&self) -> usize {
        self.count("no_data")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|r| r.outcome.is_failed())
    }

    /// Report for a query by name.
    pub fn report(&self, query: &str) -> Option<&QueryReport> {
        self.reports.iter().find(|r| r.query == query)
    }
}
