//! Incremental export scheduling for lawex.
//!
//! This crate decides, for every query of the catalog:
//! - whether it is due, based on its last checkpoint and cadence
//! - which time window to request (incremental, first-time or backfill)
//! - when its checkpoint may advance (only after a confirmed upload)
//!
//! Remote systems are reached through the traits in [`traits`], so the whole
//! pipeline runs against in-memory fakes in tests.

pub mod checkpoint;
mod error;
pub mod partition;
mod scheduler;
pub mod staging;
pub mod traits;
mod types;
pub mod window;

pub use checkpoint::{CHECKPOINT_BLOB, CheckpointMarker, MarkerState};
pub use error::{BoxError, ExportError};
pub use partition::{EXPORT_FILE_NAME, PartitionPath};
pub use scheduler::{ExportScheduler, SchedulerSettings};
pub use staging::StagingArea;
pub use traits::{CheckpointStore, ExportStorage, QueryExecutor, QueryFailure};
pub use types::*;
pub use window::{
    BackfillPolicy, DEFAULT_WINDOW_MINUTES, FIRST_BACKFILL_DURATION_DAYS, MAX_BACKFILL_DAYS,
    WindowPolicy, reference_offset,
};
