//! Error types for the export scheduler.

use thiserror::Error;

/// Boxed error returned by the remote collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can end a single query's export.
///
/// None of these abort the batch: the scheduler loop turns them into a
/// [`QueryOutcome::Failed`](crate::QueryOutcome::Failed) and moves on.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The destination container could not be checked or created.
    #[error("failed to provision container {container}: {source}")]
    ContainerProvisioning {
        container: String,
        #[source]
        source: BoxError,
    },

    /// The checkpoint store could not be read.
    #[error("failed to read checkpoint for {container}: {source}")]
    CheckpointRead {
        container: String,
        #[source]
        source: BoxError,
    },

    /// The stored marker is present but not understood.
    #[error("invalid checkpoint marker {marker:?}: {reason}")]
    CheckpointParse { marker: String, reason: String },

    /// The remote query failed.
    #[error("query execution failed: {0}")]
    Execution(#[source] BoxError),

    /// The remote query only returned part of its data.
    #[error("query returned partial results: {0}")]
    PartialResult(String),

    /// Results could not be serialized for export.
    #[error("failed to serialize query results: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The local staging file could not be written or read.
    #[error("staging error: {0}")]
    Staging(#[from] std::io::Error),

    /// Uploading the results failed.
    #[error("failed to upload {blob}: {source}")]
    Persistence {
        blob: String,
        #[source]
        source: BoxError,
    },

    /// The new marker could not be written after a successful upload.
    #[error("failed to write checkpoint for {container}: {source}")]
    CheckpointWrite {
        container: String,
        #[source]
        source: BoxError,
    },
}
