//! Local staging of export files before upload.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::partition::EXPORT_FILE_NAME;

/// Directory export files are written to before being uploaded.
///
/// Each container gets its own subdirectory, so two queries never share the
/// fixed export file name.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path the export file of `container` is staged at.
    pub fn path_for(&self, container: &str) -> PathBuf {
        self.root.join(container).join(EXPORT_FILE_NAME)
    }

    /// Write `data` to the container's staging file, replacing any leftover.
    pub async fn stage(&self, container: &str, data: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(container);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        debug!(path = %path.display(), bytes = data.len(), "staged export file");
        Ok(path)
    }

    /// Read a staged file back for upload.
    pub async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    /// Remove a staged file. Failures are only logged.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove staged export file");
        }
    }
}
