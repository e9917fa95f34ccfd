//! Carrying file metadata over to the mirror

use std::path::Path;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, SyncError};

/// Options for attribute preservation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreservationOptions {
    /// Preserve file modification times.
    ///
    /// Reconciliation compares modification times to decide whether a mirror
    /// is stale, so turning this off makes every pass re-copy every file.
    pub preserve_mtime: bool,
    /// Preserve file permissions. A read-only source makes the mirrored
    /// copy read-only too, which blocks later re-copies on some platforms.
    pub preserve_permissions: bool,
}

impl Default for PreservationOptions {
    fn default() -> Self {
        Self {
            preserve_mtime: true,
            preserve_permissions: false,
        }
    }
}

/// Attribute preserver for maintaining file metadata
#[derive(Debug, Clone, Default)]
pub struct AttributePreserver {
    options: PreservationOptions,
}

impl AttributePreserver {
    /// Create a new attribute preserver with options
    pub fn new(options: PreservationOptions) -> Self {
        Self { options }
    }

    /// Copy attributes from source to destination
    pub async fn copy_attributes(&self, source: &Path, destination: &Path) -> Result<()> {
        if !self.options.preserve_mtime && !self.options.preserve_permissions {
            return Ok(());
        }

        let metadata = fs::metadata(source).await.map_err(|e| {
            SyncError::attribute_error(source, format!("Failed to read metadata: {}", e))
        })?;

        if self.options.preserve_permissions {
            fs::set_permissions(destination, metadata.permissions())
                .await
                .map_err(|e| {
                    SyncError::attribute_error(destination, format!("Failed to set permissions: {}", e))
                })?;
        }

        if self.options.preserve_mtime {
            let mtime = FileTime::from_last_modification_time(&metadata);
            let destination_owned = destination.to_path_buf();
            tokio::task::spawn_blocking(move || filetime::set_file_mtime(&destination_owned, mtime))
                .await
                .map_err(|e| SyncError::attribute_error(destination, format!("Task failed: {}", e)))?
                .map_err(|e| {
                    SyncError::attribute_error(destination, format!("Failed to set modification time: {}", e))
                })?;
        }

        Ok(())
    }
}
