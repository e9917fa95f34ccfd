//! Mapping between the source tree and its mirror

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, SyncError};

/// Source and target roots of a mirror, both absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRoots {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl MirrorRoots {
    /// Resolve the configured roots to canonical absolute paths.
    ///
    /// The source root must already be a directory. The target root is
    /// created when missing. Notification backends report event paths relative
    /// to the path that was registered, so both roots are canonicalised once
    /// here and every later path is derived from them.
    pub async fn resolve(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        let target = target.as_ref();

        let metadata = fs::metadata(source).await.map_err(|e| {
            SyncError::path_error(source, format!("Source directory is not accessible: {}", e))
        })?;
        if !metadata.is_dir() {
            return Err(SyncError::path_error(source, "Source path is not a directory"));
        }

        fs::create_dir_all(target).await.map_err(|e| {
            SyncError::path_error(target, format!("Failed to create target directory: {}", e))
        })?;

        let source = fs::canonicalize(source).await?;
        let target = fs::canonicalize(target).await?;

        if target.starts_with(&source) || source.starts_with(&target) {
            return Err(SyncError::path_error(
                &target,
                format!("Target and source directories overlap ({})", source.display()),
            ));
        }

        Ok(Self { source, target })
    }
}

/// Pure translation of paths between the two roots.
#[derive(Debug, Clone)]
pub struct PathMapper {
    roots: MirrorRoots,
}

impl PathMapper {
    pub fn new(roots: MirrorRoots) -> Self {
        Self { roots }
    }

    pub fn source_root(&self) -> &Path {
        &self.roots.source
    }

    pub fn target_root(&self) -> &Path {
        &self.roots.target
    }

    /// Path of `source_path` relative to the source root
    pub fn relative<'a>(&self, source_path: &'a Path) -> Result<&'a Path> {
        source_path.strip_prefix(&self.roots.source).map_err(|_| {
            SyncError::path_error(
                source_path,
                format!("Path is outside source root '{}'", self.roots.source.display()),
            )
        })
    }

    /// Map a path under the source root to its mirror under the target root
    pub fn to_target(&self, source_path: &Path) -> Result<PathBuf> {
        Ok(join_relative(&self.roots.target, self.relative(source_path)?))
    }

    /// Map a path under the target root back to the source path it mirrors
    pub fn to_source(&self, target_path: &Path) -> Result<PathBuf> {
        let relative = target_path.strip_prefix(&self.roots.target).map_err(|_| {
            SyncError::path_error(
                target_path,
                format!("Path is outside target root '{}'", self.roots.target.display()),
            )
        })?;
        Ok(join_relative(&self.roots.source, relative))
    }
}

/// `root.join("")` appends a trailing separator; keep the root itself instead.
fn join_relative(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mapper() -> PathMapper {
        PathMapper::new(MirrorRoots {
            source: PathBuf::from("/work/bin/main"),
            target: PathBuf::from("/work/build/classes/java/main"),
        })
    }

    #[test]
    fn test_to_target_keeps_relative_structure() {
        let mapper = mapper();
        let target = mapper
            .to_target(Path::new("/work/bin/main/com/example/App.class"))
            .unwrap();
        assert_eq!(
            target,
            PathBuf::from("/work/build/classes/java/main/com/example/App.class")
        );
    }

    #[test]
    fn test_root_maps_to_root() {
        let mapper = mapper();
        assert_eq!(
            mapper.to_target(Path::new("/work/bin/main")).unwrap(),
            PathBuf::from("/work/build/classes/java/main")
        );
    }

    #[test]
    fn test_path_outside_source_root_is_rejected() {
        let mapper = mapper();
        let err = mapper.to_target(Path::new("/work/bin/other/App.class")).unwrap_err();
        assert!(matches!(err, SyncError::Path { .. }));
    }

    #[test]
    fn test_sibling_with_common_prefix_is_rejected() {
        // String prefix but not a path prefix
        let mapper = mapper();
        assert!(mapper.to_target(Path::new("/work/bin/main2/App.class")).is_err());
    }

    #[test]
    fn test_to_source_inverts_to_target() {
        let mapper = mapper();
        let source = Path::new("/work/bin/main/a/b/c.txt");
        let target = mapper.to_target(source).unwrap();
        assert_eq!(mapper.to_source(&target).unwrap(), source);
    }

    #[tokio::test]
    async fn test_resolve_creates_missing_target() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("bin");
        let target = temp_dir.path().join("out").join("classes");
        fs::create_dir_all(&source).await.unwrap();

        let roots = MirrorRoots::resolve(&source, &target).await.unwrap();

        assert!(target.is_dir());
        assert!(roots.source.is_absolute());
        assert!(roots.target.is_absolute());
    }

    #[tokio::test]
    async fn test_resolve_rejects_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let result = MirrorRoots::resolve(
            temp_dir.path().join("missing"),
            temp_dir.path().join("out"),
        )
        .await;
        assert!(matches!(result, Err(SyncError::Path { .. })));
    }

    #[tokio::test]
    async fn test_resolve_rejects_nested_target() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("bin");
        fs::create_dir_all(&source).await.unwrap();

        let result = MirrorRoots::resolve(&source, source.join("mirror")).await;
        assert!(result.is_err());
    }
}
