//! Remote collaborators of the scheduler.
//!
//! The scheduler only decides what to do; these traits do it. Implementations
//! live in `lawex-azure`, tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::checkpoint::CheckpointMarker;
use crate::error::BoxError;
use crate::types::{Destination, QueryResult};

/// Durable storage for exported results.
#[async_trait]
pub trait ExportStorage: Send + Sync {
    /// Make sure the destination container exists.
    ///
    /// Must be idempotent: calling it for an existing container succeeds and
    /// creates nothing.
    async fn ensure_container(&self, destination: &Destination) -> Result<(), BoxError>;

    /// Write `data` to `blob` in the destination container, replacing any
    /// existing blob.
    async fn upload(
        &self,
        destination: &Destination,
        blob: &str,
        data: Vec<u8>,
    ) -> Result<(), BoxError>;
}

/// One marker per destination container.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Raw marker text, `None` when no marker exists.
    async fn read(&self, destination: &Destination) -> Result<Option<String>, BoxError>;

    /// Overwrite the marker.
    async fn write(
        &self,
        destination: &Destination,
        marker: &CheckpointMarker,
    ) -> Result<(), BoxError>;
}

/// Why a query execution did not produce a full result.
#[derive(Debug, Error)]
pub enum QueryFailure {
    /// Only part of the data came back. The partial data is not exported.
    #[error("partial result: {message}")]
    Partial { message: String },
    /// The query failed outright.
    #[error("{0}")]
    Failed(BoxError),
}

impl QueryFailure {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        QueryFailure::Failed(err.into())
    }
}

/// Runs a query against the telemetry backend.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute `query` over `[start, end]`. A `None` start leaves the lower
    /// bound to the executor.
    async fn execute(
        &self,
        query: &str,
        start: Option<DateTime<FixedOffset>>,
        end: DateTime<FixedOffset>,
    ) -> Result<QueryResult, QueryFailure>;
}
