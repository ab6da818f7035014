//! Checkpoint markers.
//!
//! Each export container holds a single `state.ini` blob whose content is one
//! line, `Last Run;<timestamp>`. The timestamp is the instant the last
//! successful batch started, and becomes the next window's start.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};

use crate::ExportError;
use crate::window::reference_offset;

/// Blob name of the checkpoint inside each export container.
pub const CHECKPOINT_BLOB: &str = "state.ini";

/// Label written before the separator.
pub const MARKER_PREFIX: &str = "Last Run";

/// Separator between label and timestamp.
pub const MARKER_SEPARATOR: char = ';';

/// Offset-aware formats accepted besides RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Formats without an offset, read in the reference offset.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// What the checkpoint store held before this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker: the query has never been exported.
    Absent,
    /// A marker exists but is empty: no lower bound.
    Blank,
    /// The instant the last successful batch started.
    At(DateTime<FixedOffset>),
}

/// A progress marker for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMarker {
    at: DateTime<FixedOffset>,
}

impl CheckpointMarker {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self { at }
    }

    /// The recorded instant.
    pub fn at(&self) -> DateTime<FixedOffset> {
        self.at
    }

    /// Serialized form stored in the checkpoint blob.
    pub fn render(&self) -> String {
        format!(
            "{}{}{}",
            MARKER_PREFIX,
            MARKER_SEPARATOR,
            self.at.to_rfc3339_opts(SecondsFormat::AutoSi, false)
        )
    }

    /// Interpret the raw content read from the checkpoint store.
    pub fn parse(raw: Option<&str>) -> Result<MarkerState, ExportError> {
        let Some(raw) = raw else {
            return Ok(MarkerState::Absent);
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(MarkerState::Blank);
        }

        let timestamp = trimmed
            .split(MARKER_SEPARATOR)
            .nth(1)
            .ok_or_else(|| ExportError::CheckpointParse {
                marker: raw.to_string(),
                reason: format!("missing '{}' separator", MARKER_SEPARATOR),
            })?;

        parse_timestamp(timestamp.trim())
            .map(MarkerState::At)
            .map_err(|reason| ExportError::CheckpointParse {
                marker: raw.to_string(),
                reason,
            })
    }
}

impl std::fmt::Display for CheckpointMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Parse a marker timestamp in any of the accepted forms.
pub fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, String> {
    if s.is_empty() {
        return Err("empty timestamp".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }

    for format in NAIVE_FORMATS {
        let parsed = NaiveDateTime::parse_from_str(s, format)
            .ok()
            .and_then(|naive| naive.and_local_timezone(reference_offset()).single());
        if let Some(dt) = parsed {
            return Ok(dt);
        }
    }

    Err(format!("unrecognized timestamp '{}'", s))
}
