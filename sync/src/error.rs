//! Error types for the mirroring engine

use std::path::PathBuf;

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for mirror operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A path fell outside the root it was expected under
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// Watch registration errors
    #[error("Watch error at '{path}': {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The notification source could not be created
    #[error("Failed to start notification source: {0}")]
    NotificationSource(#[source] notify::Error),

    /// Filter pattern errors
    #[error("Filter pattern error: {0}")]
    FilterPattern(String),

    /// File attribute preservation errors
    #[error("Attribute preservation error for '{path}': {message}")]
    AttributePreservation { path: PathBuf, message: String },

    /// Directory scanning errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// File copying errors
    #[error("File copy error: {message}")]
    FileCopy {
        message: String,
    },

    /// File deletion errors
    #[error("File deletion error at '{path}': {message}")]
    FileDeletion { path: PathBuf, message: String },
}

impl SyncError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new watch registration error
    pub fn watch_error(path: impl Into<PathBuf>, source: notify::Error) -> Self {
        Self::Watch {
            path: path.into(),
            source,
        }
    }

    /// Create a new attribute preservation error
    pub fn attribute_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::AttributePreservation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new file copy error
    pub fn copy_error(
        source: impl AsRef<std::path::Path>,
        dest: impl AsRef<std::path::Path>,
        message: impl Into<String>,
    ) -> Self {
        let full_message = format!(
            "File copy error from '{}' to '{}': {}",
            source.as_ref().display(),
            dest.as_ref().display(),
            message.into()
        );
        Self::FileCopy {
            message: full_message,
        }
    }

    /// Create a new file deletion error
    pub fn deletion_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileDeletion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the path no longer exists.
    ///
    /// Events routinely race with the filesystem, so callers treat these as
    /// no-ops rather than failures.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Self::Watch { source, .. } => matches!(
                source.kind,
                notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound
            ) || matches!(&source.kind, notify::ErrorKind::Io(e) if e.kind() == std::io::ErrorKind::NotFound),
            _ => false,
        }
    }
}
