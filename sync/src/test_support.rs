//! Shared helpers for unit tests

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::orphan::{OrphanPolicy, RemoveOrphans};
use crate::paths::{MirrorRoots, PathMapper};
use crate::registry::{SharedRegistry, WatchBackend, WatchRegistry};
use crate::synchronizer::{Synchronizer, SynchronizerOptions};

/// In-memory stand-in for the OS watcher.
///
/// Like inotify it refuses to watch a directory that does not exist.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    watched: Arc<Mutex<HashSet<PathBuf>>>,
    refused: Arc<Mutex<HashSet<PathBuf>>>,
    calls: Arc<AtomicUsize>,
}

impl RecordingBackend {
    /// Fail every watch on `path` as if the OS watch limit were reached
    pub fn refuse(&self, path: &Path) {
        self.refused.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.lock().unwrap().contains(path)
    }

    pub fn watched(&self) -> HashSet<PathBuf> {
        self.watched.lock().unwrap().clone()
    }

    pub fn watch_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WatchBackend for RecordingBackend {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !path.is_dir() {
            return Err(notify::Error::path_not_found().add_path(path.to_path_buf()));
        }
        if self.refused.lock().unwrap().contains(path) {
            return Err(notify::Error::generic("inotify watch limit reached")
                .add_path(path.to_path_buf()));
        }
        self.watched.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        if self.watched.lock().unwrap().remove(path) {
            Ok(())
        } else {
            Err(notify::Error::watch_not_found().add_path(path.to_path_buf()))
        }
    }
}

/// A source and target directory inside one temp dir, with a synchronizer
/// wired to a recording backend.
pub struct MirrorFixture {
    pub temp_dir: TempDir,
    pub source: PathBuf,
    pub target: PathBuf,
    pub registry: SharedRegistry,
    pub backend: RecordingBackend,
    pub sync: Synchronizer,
}

impl MirrorFixture {
    pub async fn new() -> Self {
        Self::with_policy(Arc::new(RemoveOrphans), SynchronizerOptions::default()).await
    }

    pub async fn with_policy(
        orphans: Arc<dyn OrphanPolicy>,
        options: SynchronizerOptions,
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let source_dir = temp_dir.path().join("bin").join("main");
        let target_dir = temp_dir.path().join("build").join("classes");
        std::fs::create_dir_all(&source_dir).unwrap();

        let roots = MirrorRoots::resolve(&source_dir, &target_dir).await.unwrap();
        let backend = RecordingBackend::default();
        let registry = WatchRegistry::new(backend.clone()).shared();
        let sync = Synchronizer::new(
            PathMapper::new(roots.clone()),
            registry.clone(),
            orphans,
            options,
        )
        .unwrap();

        Self {
            temp_dir,
            source: roots.source,
            target: roots.target,
            registry,
            backend,
            sync,
        }
    }

    pub fn src(&self, relative: &str) -> PathBuf {
        self.source.join(relative)
    }

    pub fn dst(&self, relative: &str) -> PathBuf {
        self.target.join(relative)
    }

    pub async fn write_source(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.src(relative);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    pub async fn read_target(&self, relative: &str) -> Vec<u8> {
        tokio::fs::read(self.dst(relative)).await.unwrap()
    }

    pub async fn is_watched(&self, path: &Path) -> bool {
        self.registry.lock().await.has(path)
    }
}
