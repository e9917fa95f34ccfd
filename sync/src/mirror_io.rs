//! Filesystem primitives used to build and repair the mirror

use std::io::ErrorKind;
use std::path::Path;
use filetime::FileTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, SyncError};
use crate::preservation::AttributePreserver;

/// Copy `source` to `destination`, creating parent directories as needed.
///
/// An existing destination is truncated and overwritten. A failure part way
/// through leaves whatever was already written; the next event or
/// reconciliation pass rewrites the file. Returns the number of bytes copied.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    preserver: &AttributePreserver,
) -> Result<u64> {
    // Opened first so a vanished source leaves nothing behind in the mirror
    let mut reader = fs::File::open(source).await?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            SyncError::copy_error(source, destination, format!("Failed to create parent directory: {}", e))
        })?;
    }

    let mut writer = fs::File::create(destination).await.map_err(|e| {
        SyncError::copy_error(source, destination, format!("Failed to create destination: {}", e))
    })?;

    let bytes = tokio::io::copy(&mut reader, &mut writer).await.map_err(|e| {
        SyncError::copy_error(source, destination, format!("Failed to copy file: {}", e))
    })?;
    writer.flush().await.map_err(|e| {
        SyncError::copy_error(source, destination, format!("Failed to flush destination: {}", e))
    })?;
    drop(writer);

    // The bytes are already in place; stale attributes only cost an extra
    // copy on the next reconciliation pass.
    if let Err(e) = preserver.copy_attributes(source, destination).await {
        tracing::warn!("Failed to preserve attributes for '{}': {}", destination.display(), e);
    }

    Ok(bytes)
}

/// Create `path` and all missing parents. Succeeds if it already exists.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await.map_err(|e| {
        SyncError::path_error(path, format!("Failed to create directory: {}", e))
    })
}

/// Remove a file or a whole directory tree. Succeeds if nothing is there.
///
/// Returns whether anything was removed.
pub async fn remove_all(path: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(SyncError::deletion_error(path, format!("Failed to read metadata: {}", e)))
        }
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::deletion_error(path, format!("Failed to delete: {}", e))),
    }
}

/// Whether a mirrored file still matches its source by size and modification time.
pub fn is_fresh(source: &std::fs::Metadata, mirror: &std::fs::Metadata) -> bool {
    if source.len() != mirror.len() {
        return false;
    }

    let source_mtime = FileTime::from_last_modification_time(source);
    let mirror_mtime = FileTime::from_last_modification_time(mirror);

    // Filesystems without sub-second timestamps drop the nanoseconds
    if source_mtime.nanoseconds() == 0 || mirror_mtime.nanoseconds() == 0 {
        source_mtime.unix_seconds() == mirror_mtime.unix_seconds()
    } else {
        source_mtime == mirror_mtime
    }
}
