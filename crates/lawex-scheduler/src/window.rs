//! Window and backfill policy.
//!
//! Decides, for one query, which time range to request and whether the query
//! is due at all. Pure: no clock reads, no I/O.

use chrono::{DateTime, Duration, FixedOffset};

use crate::checkpoint::MarkerState;
use crate::types::ExportWindow;

/// Window length used when no marker gives a start, and the default cadence.
pub const DEFAULT_WINDOW_MINUTES: u32 = 60;

/// How far back a forced backfill reaches.
pub const FIRST_BACKFILL_DURATION_DAYS: u32 = 90;

/// Longest backfill a configuration may ask for (about a century).
pub const MAX_BACKFILL_DAYS: u32 = 36_500;

/// Hours east of UTC of the reference time zone. Fixed, no DST.
const REFERENCE_OFFSET_HOURS: i32 = 2;

/// The fixed offset every instant of the job is expressed in.
pub fn reference_offset() -> FixedOffset {
    FixedOffset::east_opt(REFERENCE_OFFSET_HOURS * 3600).expect("offset within bounds")
}

/// A forced re-export of a long history across all queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillPolicy {
    pub days: u32,
}

impl Default for BackfillPolicy {
    fn default() -> Self {
        Self {
            days: FIRST_BACKFILL_DURATION_DAYS,
        }
    }
}

/// Computes export windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowPolicy {
    backfill: Option<BackfillPolicy>,
}

impl WindowPolicy {
    /// Incremental exports only.
    pub fn incremental() -> Self {
        Self { backfill: None }
    }

    /// Every window starts `days` before now, whatever the marker says.
    pub fn with_backfill(days: u32) -> Self {
        Self {
            backfill: Some(BackfillPolicy { days }),
        }
    }

    /// Build from the global flag and duration.
    pub fn from_flag(first_backfill: bool, days: u32) -> Self {
        if first_backfill {
            Self::with_backfill(days)
        } else {
            Self::incremental()
        }
    }

    pub fn backfill(&self) -> Option<BackfillPolicy> {
        self.backfill
    }

    /// Compute the window for one query.
    pub fn compute(
        &self,
        now: DateTime<FixedOffset>,
        marker: &MarkerState,
        duration_minutes: u32,
    ) -> ExportWindow {
        let default_start = now - Duration::minutes(DEFAULT_WINDOW_MINUTES as i64);

        let (mut start, is_first_time_export) = match marker {
            // A first export only looks back over the default window.
            MarkerState::Absent => (Some(default_start), true),
            MarkerState::Blank => (None, false),
            MarkerState::At(at) => (Some(*at), false),
        };

        if let Some(backfill) = self.backfill {
            // Past the representable range the window is unbounded.
            start = Duration::try_days(backfill.days as i64)
                .and_then(|days| now.checked_sub_signed(days));
        }

        let mut window = ExportWindow {
            start,
            end: now,
            is_first_time_export,
            is_due: false,
            duration_minutes,
        };

        window.is_due = match window.elapsed_minutes() {
            // Nothing to measure against: always run.
            None => true,
            Some(elapsed) => elapsed >= duration_minutes as f64 || is_first_time_export,
        };

        window
    }
}
