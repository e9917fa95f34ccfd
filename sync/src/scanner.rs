//! Directory scanning using walkdir

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::filter::FileFilter;

/// One entry found by a scan
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Relative path from the scan root
    pub relative_path: PathBuf,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Order in which entries are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Directories before their contents
    ParentsFirst,
    /// Contents before the directory holding them
    ContentsFirst,
}

/// Directory scanner using the walkdir crate
#[derive(Debug, Clone, Default)]
pub struct DirectoryScanner {
    filter: FileFilter,
}

impl DirectoryScanner {
    /// Create a new directory scanner that skips filtered paths
    pub fn new(filter: FileFilter) -> Self {
        Self { filter }
    }

    /// Walk `root` depth-first and return every entry below it, excluding the
    /// root itself.
    ///
    /// Entries that disappear or cannot be read mid-walk are logged and
    /// skipped. Only a root that cannot be read at all fails the scan. Symbolic
    /// links are reported as they are and never followed.
    pub async fn scan(&self, root: &Path, order: WalkOrder) -> Result<Vec<FileEntry>> {
        self.scan_subtree(root, root, order).await
    }

    /// Like [`scan`](Self::scan), but for a directory `root` somewhere below
    /// `base`. Filtering and the reported relative paths are based on `base`.
    pub async fn scan_subtree(
        &self,
        base: &Path,
        root: &Path,
        order: WalkOrder,
    ) -> Result<Vec<FileEntry>> {
        let base = base.to_path_buf();
        let root = root.to_path_buf();
        let filter = self.filter.clone();

        tokio::task::spawn_blocking(move || walk(&base, &root, &filter, order))
            .await
            .map_err(|e| SyncError::scan_error(PathBuf::new(), format!("Scan task failed: {}", e)))?
    }
}

fn walk(base: &Path, root: &Path, filter: &FileFilter, order: WalkOrder) -> Result<Vec<FileEntry>> {
    std::fs::read_dir(root).map_err(|e| {
        SyncError::scan_error(root, format!("Failed to read directory: {}", e))
    })?;

    let included = |entry: &walkdir::DirEntry| {
        entry
            .path()
            .strip_prefix(base)
            .map(|relative| filter.should_include(relative))
            .unwrap_or(false)
    };

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .contents_first(order == WalkOrder::ContentsFirst)
        .into_iter();

    // Pruning with filter_entry only works when parents come first; in
    // contents-first order each entry is checked on its own instead.
    let walker: Box<dyn Iterator<Item = walkdir::Result<walkdir::DirEntry>> + '_> = match order {
        WalkOrder::ParentsFirst => Box::new(walker.filter_entry(included)),
        WalkOrder::ContentsFirst => Box::new(walker.filter(move |entry| {
            entry.as_ref().map(|e| included(e)).unwrap_or(true)
        })),
    };

    let mut entries = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.io_error().map(|io| io.kind()) != Some(std::io::ErrorKind::NotFound) {
                    warn!("Skipping unreadable entry under '{}': {}", root.display(), e);
                }
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping '{}': {}", entry.path().display(), e);
                continue;
            }
        };

        let relative_path = match entry.path().strip_prefix(base) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => continue,
        };

        entries.push(FileEntry {
            path: entry.path().to_path_buf(),
            relative_path,
            is_dir: metadata.is_dir(),
        });
    }

    Ok(entries)
}
