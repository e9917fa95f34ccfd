//! The mirroring engine
//!
//! [`Synchronizer`] owns the path mapping, the watch registry handle and the
//! orphan policy. It applies single events as they arrive and runs full
//! passes (bootstrap and reconciliation) that repair whatever the event
//! stream missed. Event handling and reconciliation may run concurrently;
//! the registry mutex is the only lock and is never held across file I/O.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::event::MirrorEvent;
use crate::filter::{FileFilter, FilterOptions};
use crate::metrics::PassMetrics;
use crate::mirror_io::{self, copy_file, ensure_dir, remove_all};
use crate::orphan::OrphanPolicy;
use crate::paths::PathMapper;
use crate::preservation::{AttributePreserver, PreservationOptions};
use crate::registry::SharedRegistry;
use crate::scanner::{DirectoryScanner, FileEntry, WalkOrder};

/// Tunables of the mirroring engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynchronizerOptions {
    /// Paths never mirrored and never treated as orphans
    #[serde(default)]
    pub filter: FilterOptions,
    /// Attributes carried over to mirrored files
    #[serde(default)]
    pub preservation: PreservationOptions,
}

/// When a pass copies a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    Always,
    WhenStale,
}

/// Keeps the target root a mirror of the source root
#[derive(Debug)]
pub struct Synchronizer {
    mapper: PathMapper,
    registry: SharedRegistry,
    orphans: Arc<dyn OrphanPolicy>,
    filter: FileFilter,
    scanner: DirectoryScanner,
    preserver: AttributePreserver,
}

impl Synchronizer {
    pub fn new(
        mapper: PathMapper,
        registry: SharedRegistry,
        orphans: Arc<dyn OrphanPolicy>,
        options: SynchronizerOptions,
    ) -> Result<Self> {
        let filter = FileFilter::new(options.filter)?;

        Ok(Self {
            mapper,
            registry,
            orphans,
            scanner: DirectoryScanner::new(filter.clone()),
            filter,
            preserver: AttributePreserver::new(options.preservation),
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn source_root(&self) -> &Path {
        self.mapper.source_root()
    }

    pub fn target_root(&self) -> &Path {
        self.mapper.target_root()
    }

    /// Initial full mirror: every directory is created and watched, every
    /// file is copied.
    ///
    /// Fails only when the source root cannot be walked. Must finish before
    /// events are consumed.
    #[instrument(skip(self), fields(source = %self.source_root().display()))]
    pub async fn bootstrap(&self) -> Result<PassMetrics> {
        let started = Instant::now();
        let mut metrics = PassMetrics::new();

        self.mirror_subtree(self.source_root(), CopyMode::Always, &mut metrics)
            .await?;

        metrics.duration = started.elapsed();
        metrics.log("bootstrap");
        Ok(metrics)
    }

    /// Apply one event. Failures are logged, never returned.
    pub async fn handle(&self, event: MirrorEvent) {
        let result = match &event {
            MirrorEvent::Created(path) => self.on_created(path).await,
            MirrorEvent::Modified(path) => self.on_modified(path).await,
            MirrorEvent::Removed(path) => self.on_removed(path).await,
        };

        if let Err(e) = result {
            match e {
                SyncError::Path { .. } => {
                    error!("Event for path outside the source root: {:?}: {}", event, e)
                }
                e if e.is_not_found() => debug!("Path vanished while handling {:?}: {}", event, e),
                e => error!("Failed to handle {:?}: {}", event, e),
            }
        }
    }

    /// A file or directory appeared under the source root.
    ///
    /// A new directory is watched and its current contents are mirrored,
    /// since anything created inside it before the watch was in place
    /// produced no event.
    pub async fn on_created(&self, path: &Path) -> Result<()> {
        if self.is_excluded(path)? {
            debug!("Ignoring excluded path: {}", path.display());
            return Ok(());
        }

        let Some(metadata) = stat(path).await? else {
            debug!("Created path already gone: {}", path.display());
            return Ok(());
        };

        if metadata.is_dir() {
            let mut metrics = PassMetrics::new();
            self.mirror_subtree(path, CopyMode::Always, &mut metrics).await?;
            info!(
                copied = metrics.copied,
                directories_created = metrics.directories_created,
                "Mirrored new directory: {}",
                path.display()
            );
        } else if let Some(bytes) = self.copy_to_mirror(path).await? {
            info!(bytes, "Copied new file: {}", path.display());
        }

        Ok(())
    }

    /// A file's contents changed. Directories are ignored.
    pub async fn on_modified(&self, path: &Path) -> Result<()> {
        if self.is_excluded(path)? {
            return Ok(());
        }

        match stat(path).await? {
            None => debug!("Modified path already gone: {}", path.display()),
            Some(metadata) if metadata.is_dir() => {}
            Some(_) => {
                if let Some(bytes) = self.copy_to_mirror(path).await? {
                    info!(bytes, "Copied modified file: {}", path.display());
                }
            }
        }

        Ok(())
    }

    /// A file or directory went away. Its mirror and every watch below it
    /// are removed without checking what kind of entry it was.
    pub async fn on_removed(&self, path: &Path) -> Result<()> {
        if self.is_excluded(path)? {
            return Ok(());
        }

        let target = self.mapper.to_target(path)?;
        let dropped = self.registry.lock().await.remove_subtree(path);

        if path == self.source_root() {
            error!(
                "Source root was removed; leaving mirror at '{}' in place",
                target.display()
            );
            return Ok(());
        }

        if remove_all(&target).await? {
            info!(watches_dropped = dropped, "Removed mirror of: {}", path.display());
        }
        Ok(())
    }

    /// Full walk-and-repair pass.
    ///
    /// Missing or stale mirror files are re-copied, missing directories and
    /// watches are restored, watches of vanished directories are released,
    /// and orphans in the target are handed to the orphan policy. Running
    /// it on a mirror that is already in sync changes nothing.
    #[instrument(skip(self), fields(source = %self.source_root().display()))]
    pub async fn reconcile(&self) -> Result<PassMetrics> {
        let started = Instant::now();
        let mut metrics = PassMetrics::new();

        let live = self
            .mirror_subtree(self.source_root(), CopyMode::WhenStale, &mut metrics)
            .await?;
        metrics.watches_dropped += self.prune_watches(&live).await;
        self.remove_orphans(&mut metrics).await?;

        metrics.duration = started.elapsed();
        if metrics.is_clean() {
            debug!("Reconciliation found nothing to repair");
        } else {
            metrics.log("reconcile");
        }
        Ok(metrics)
    }

    /// Mirror the directory `root` and everything below it.
    ///
    /// Returns every source directory seen, `root` included.
    async fn mirror_subtree(
        &self,
        root: &Path,
        mode: CopyMode,
        metrics: &mut PassMetrics,
    ) -> Result<HashSet<PathBuf>> {
        let mut live = HashSet::new();

        // Register before the walk so that entries created during it raise events
        if let Err(e) = self.mirror_directory(root, metrics).await {
            self.record_failure(root, e, metrics);
        }

        let entries = match self
            .scanner
            .scan_subtree(self.source_root(), root, WalkOrder::ParentsFirst)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                if root != self.source_root() && stat(root).await?.is_none() {
                    debug!("Directory vanished before it could be walked: {}: {}", root.display(), e);
                    return Ok(live);
                }
                return Err(e);
            }
        };
        live.insert(root.to_path_buf());

        for entry in entries {
            metrics.scanned += 1;
            let result = if entry.is_dir {
                live.insert(entry.path.clone());
                self.mirror_directory(&entry.path, metrics).await
            } else {
                self.mirror_file(&entry.path, mode, metrics).await
            };

            if let Err(e) = result {
                self.record_failure(&entry.path, e, metrics);
            }
        }

        Ok(live)
    }

    /// Make sure the mirror of `dir` is a directory and `dir` is watched.
    ///
    /// The mirror directory is created even when the watch cannot be
    /// registered; the registration error is returned afterwards.
    async fn mirror_directory(&self, dir: &Path, metrics: &mut PassMetrics) -> Result<()> {
        let target = self.mapper.to_target(dir)?;
        let mirrored = match fs::symlink_metadata(&target).await {
            Ok(existing) if existing.is_dir() => true,
            Ok(_) => {
                remove_all(&target).await?;
                metrics.removed += 1;
                false
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if !mirrored {
            ensure_dir(&target).await?;
            metrics.directories_created += 1;
        }

        if self.registry.lock().await.add_directory(dir)? {
            metrics.watches_added += 1;
        }
        Ok(())
    }

    async fn mirror_file(&self, file: &Path, mode: CopyMode, metrics: &mut PassMetrics) -> Result<()> {
        if mode == CopyMode::WhenStale && self.is_mirrored(file).await? {
            return Ok(());
        }

        if let Some(bytes) = self.copy_to_mirror(file).await? {
            debug!(bytes, "Copied: {}", file.display());
            metrics.record_copy(bytes);
        }
        Ok(())
    }

    /// Whether the mirror of `file` exists and matches it
    async fn is_mirrored(&self, file: &Path) -> Result<bool> {
        let target = self.mapper.to_target(file)?;
        let source_meta = fs::metadata(file).await?;

        match fs::symlink_metadata(&target).await {
            Ok(target_meta) => Ok(target_meta.is_file() && mirror_io::is_fresh(&source_meta, &target_meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy `file` onto its mirror, replacing a directory standing in the
    /// way. Returns `None` when the source vanished first.
    async fn copy_to_mirror(&self, file: &Path) -> Result<Option<u64>> {
        let target = self.mapper.to_target(file)?;

        if let Ok(existing) = fs::symlink_metadata(&target).await {
            if existing.is_dir() {
                remove_all(&target).await?;
                self.registry.lock().await.remove_subtree(file);
            }
        }

        match copy_file(file, &target, &self.preserver).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_not_found() => match stat(file).await? {
                None => Ok(None),
                Some(_) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Release watches on directories that are gone.
    ///
    /// Only registrations seen in a snapshot, missing from `live` and no
    /// longer on disk are released. Anything registered after the snapshot
    /// is left alone.
    pub(crate) async fn prune_watches(&self, live: &HashSet<PathBuf>) -> usize {
        let registered: Vec<PathBuf> = self
            .registry
            .lock()
            .await
            .paths()
            .filter(|dir| !live.contains(*dir))
            .map(Path::to_path_buf)
            .collect();

        let mut stale = Vec::new();
        for dir in registered {
            let exists = matches!(stat(&dir).await, Ok(Some(metadata)) if metadata.is_dir());
            if !exists || self.is_excluded(&dir).unwrap_or(true) {
                stale.push(dir);
            }
        }

        let mut registry = self.registry.lock().await;
        stale.iter().filter(|dir| registry.remove_directory(dir)).count()
    }

    /// Walk the target children-first and let the orphan policy decide on
    /// every entry whose source is gone.
    async fn remove_orphans(&self, metrics: &mut PassMetrics) -> Result<()> {
        let entries = self
            .scanner
            .scan(self.target_root(), WalkOrder::ContentsFirst)
            .await?;

        let mut orphans = Vec::new();
        for entry in entries {
            let source = match self.mapper.to_source(&entry.path) {
                Ok(source) => source,
                Err(e) => {
                    self.record_failure(&entry.path, e, metrics);
                    continue;
                }
            };
            if fs::symlink_metadata(&source).await.is_err() {
                orphans.push(entry);
            }
        }
        if orphans.is_empty() {
            return Ok(());
        }

        let decisions = self.orphan_decisions(&orphans).await?;
        let mut holding_kept: HashSet<PathBuf> = HashSet::new();

        for (entry, removable) in orphans.into_iter().zip(decisions) {
            let keep = !removable || (entry.is_dir && holding_kept.contains(&entry.path));

            if keep {
                debug!("Keeping orphan: {}", entry.path.display());
                if !entry.is_dir {
                    metrics.orphans_kept += 1;
                }
                for ancestor in entry.path.ancestors().skip(1) {
                    if ancestor == self.target_root() || !holding_kept.insert(ancestor.to_path_buf()) {
                        break;
                    }
                }
                continue;
            }

            match remove_all(&entry.path).await {
                Ok(true) => {
                    info!("Removed orphan: {}", entry.path.display());
                    metrics.removed += 1;
                }
                Ok(false) => {}
                Err(e) => self.record_failure(&entry.path, e, metrics),
            }
        }

        Ok(())
    }

    /// Ask the orphan policy about every orphan in one blocking task, since
    /// policies may look at the filesystem.
    async fn orphan_decisions(&self, orphans: &[FileEntry]) -> Result<Vec<bool>> {
        let policy = Arc::clone(&self.orphans);
        let queries: Vec<(PathBuf, bool)> = orphans
            .iter()
            .map(|entry| (entry.relative_path.clone(), entry.is_dir))
            .collect();

        tokio::task::spawn_blocking(move || {
            queries
                .iter()
                .map(|(relative, is_dir)| policy.should_remove(relative, *is_dir))
                .collect::<Vec<bool>>()
        })
        .await
        .map_err(|e| {
            SyncError::scan_error(self.target_root(), format!("Orphan policy task failed: {}", e))
        })
    }

    fn is_excluded(&self, path: &Path) -> Result<bool> {
        let relative = self.mapper.relative(path)?;
        Ok(!self.filter.should_include(relative))
    }

    fn record_failure(&self, path: &Path, error: SyncError, metrics: &mut PassMetrics) {
        if error.is_not_found() {
            debug!("Skipping vanished path '{}': {}", path.display(), error);
        } else {
            warn!("Failed to mirror '{}': {}", path.display(), error);
            metrics.failed += 1;
        }
    }
}

/// `symlink_metadata` that reports a missing path as `None`
async fn stat(path: &Path) -> Result<Option<std::fs::Metadata>> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
