//! Bookkeeping of the directories registered with the notification source
//!
//! Watches are registered one directory at a time (non-recursively), so the
//! registry has to follow the source tree as directories come and go.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Registry shared between the event loop and the reconciliation task
pub type SharedRegistry = Arc<Mutex<WatchRegistry>>;

/// The OS-facing half of a watch registration
pub trait WatchBackend: Send {
    /// Start delivering events for the direct children of `path`
    fn watch(&mut self, path: &Path) -> notify::Result<()>;

    /// Stop delivering events for `path`
    fn unwatch(&mut self, path: &Path) -> notify::Result<()>;
}

/// Set of watched directories kept in step with the backend
pub struct WatchRegistry {
    backend: Box<dyn WatchBackend>,
    directories: BTreeSet<PathBuf>,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("directories", &self.directories)
            .finish_non_exhaustive()
    }
}

impl WatchRegistry {
    pub fn new(backend: impl WatchBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            directories: BTreeSet::new(),
        }
    }

    /// Wrap the registry for sharing between tasks
    pub fn shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Register `path` with the backend.
    ///
    /// Returns `Ok(false)` when it was already registered. Fails when the
    /// backend refuses, typically because the directory vanished before the
    /// registration went through.
    pub fn add_directory(&mut self, path: &Path) -> Result<bool> {
        if self.directories.contains(path) {
            return Ok(false);
        }

        self.backend
            .watch(path)
            .map_err(|e| SyncError::watch_error(path, e))?;
        self.directories.insert(path.to_path_buf());
        debug!("Watching directory: {}", path.display());
        Ok(true)
    }

    /// Deregister and forget `path`. Unknown paths are ignored.
    ///
    /// Returns whether `path` was registered.
    pub fn remove_directory(&mut self, path: &Path) -> bool {
        if !self.directories.remove(path) {
            return false;
        }

        // The OS drops the watch on its own when the directory is deleted
        if let Err(e) = self.backend.unwatch(path) {
            debug!("Backend already released '{}': {}", path.display(), e);
        }
        debug!("Stopped watching directory: {}", path.display());
        true
    }

    /// Deregister `path` and every registered directory below it.
    ///
    /// Returns how many registrations were dropped.
    pub fn remove_subtree(&mut self, path: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .directories
            .range(path.to_path_buf()..)
            .take_while(|dir| dir.starts_with(path))
            .cloned()
            .collect();

        doomed.iter().filter(|dir| self.remove_directory(dir)).count()
    }

    /// Release every registration
    pub fn clear(&mut self) {
        let all: Vec<PathBuf> = self.directories.iter().cloned().collect();
        for dir in all {
            self.remove_directory(&dir);
        }
    }

    pub fn has(&self, path: &Path) -> bool {
        self.directories.contains(path)
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.directories.iter().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingBackend;
    use tempfile::TempDir;

    fn registry() -> (WatchRegistry, RecordingBackend) {
        let backend = RecordingBackend::default();
        (WatchRegistry::new(backend.clone()), backend)
    }

    #[test]
    fn test_add_and_has() {
        let temp_dir = TempDir::new().unwrap();
        let (mut registry, backend) = registry();

        assert!(registry.add_directory(temp_dir.path()).unwrap());
        assert!(registry.has(temp_dir.path()));
        assert!(backend.is_watching(temp_dir.path()));
    }

    #[test]
    fn test_add_twice_registers_once() {
        let temp_dir = TempDir::new().unwrap();
        let (mut registry, backend) = registry();

        assert!(registry.add_directory(temp_dir.path()).unwrap());
        assert!(!registry.add_directory(temp_dir.path()).unwrap());
        assert_eq!(backend.watch_calls(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_vanished_directory_fails_without_recording() {
        let temp_dir = TempDir::new().unwrap();
        let (mut registry, _backend) = registry();
        let missing = temp_dir.path().join("gone");

        let err = registry.add_directory(&missing).unwrap_err();

        assert!(matches!(err, SyncError::Watch { .. }));
        assert!(err.is_not_found());
        assert!(!registry.has(&missing));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (mut registry, backend) = registry();
        registry.add_directory(temp_dir.path()).unwrap();

        assert!(registry.remove_directory(temp_dir.path()));
        assert!(!registry.remove_directory(temp_dir.path()));
        assert!(!registry.has(temp_dir.path()));
        assert!(!backend.is_watching(temp_dir.path()));
    }

    #[test]
    fn test_remove_subtree_leaves_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in ["a", "a/b", "a/b/c", "ab"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
        let (mut registry, _backend) = registry();
        for dir in ["a", "a/b", "a/b/c", "ab"] {
            registry.add_directory(&root.join(dir)).unwrap();
        }

        assert_eq!(registry.remove_subtree(&root.join("a")), 3);
        assert!(registry.has(&root.join("ab")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_releases_everything() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("x")).unwrap();
        std::fs::create_dir_all(root.join("y")).unwrap();
        let (mut registry, backend) = registry();
        registry.add_directory(&root.join("x")).unwrap();
        registry.add_directory(&root.join("y")).unwrap();
        assert_eq!(backend.watched().len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(backend.watched().len(), 0);
    }
}
