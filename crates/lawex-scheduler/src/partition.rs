//! Output partition paths.
//!
//! Downstream readers expect exports under the same layout the Azure Monitor
//! diagnostic export uses, so the path below must not change.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::window::reference_offset;

/// File name of every exported result set.
pub const EXPORT_FILE_NAME: &str = "PT5M.json";

/// Workspace segment of the path.
const WORKSPACE_NAME: &str = "demo-la";

/// Directory a run's export lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPath {
    path: String,
}

impl PartitionPath {
    /// Build the partition for a query version at `now`.
    ///
    /// Date and hour come from `now` seen at the reference offset, whatever
    /// offset the caller passed, never from the query window.
    pub fn new(
        version: &str,
        subscription_id: &str,
        resource_group: &str,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let now = now.with_timezone(&reference_offset());
        let path = format!(
            "{version}/WorkspaceResourceId=/subscriptions/{subscription_id}/resourcegroups/{resource_group}/providers/microsoft.operationalinsights/workspaces/{WORKSPACE_NAME}/y={}/m={}/d={}/h={}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
        );
        Self { path }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Full blob name of the export file.
    pub fn blob_name(&self) -> String {
        format!("{}/{}", self.path, EXPORT_FILE_NAME)
    }
}

impl std::fmt::Display for PartitionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}
