//! Path filtering using globset
//!
//! Patterns are matched against paths relative to the mirror roots. A path is
//! excluded when it, or any directory above it, matches an exclude pattern.

use std::path::Path;
use serde::{Deserialize, Serialize};
use globset::{GlobSet, GlobSetBuilder};

use crate::error::{Result, SyncError};

/// File filter options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// Patterns to exclude from the mirror
    pub exclude_patterns: Vec<String>,
    /// Case sensitive matching
    pub case_sensitive: bool,
    /// Include hidden files (starting with .)
    pub include_hidden: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            case_sensitive: false,
            include_hidden: true,
        }
    }
}

/// File filter using globset patterns
#[derive(Debug, Clone)]
pub struct FileFilter {
    exclude_set: Option<GlobSet>,
    options: FilterOptions,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            exclude_set: None,
            options: FilterOptions::default(),
        }
    }
}

impl FileFilter {
    /// Create a new file filter with the given options
    pub fn new(options: FilterOptions) -> Result<Self> {
        let exclude_set = if options.exclude_patterns.is_empty() {
            None
        } else {
            Some(Self::build_globset(&options.exclude_patterns, options.case_sensitive)?)
        };

        Ok(Self {
            exclude_set,
            options,
        })
    }

    /// Check if a relative path takes part in the mirror
    pub fn should_include(&self, relative: &Path) -> bool {
        if relative.as_os_str().is_empty() {
            return true;
        }

        if !self.options.include_hidden && self.is_hidden(relative) {
            return false;
        }

        if let Some(exclude_set) = &self.exclude_set {
            if relative.ancestors().any(|p| !p.as_os_str().is_empty() && exclude_set.is_match(p)) {
                return false;
            }
        }

        true
    }

    /// Build a globset from patterns
    fn build_globset(patterns: &[String], case_sensitive: bool) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let mut glob = globset::GlobBuilder::new(pattern);

            if !case_sensitive {
                glob.case_insensitive(true);
            }

            let compiled_glob = glob.build().map_err(|e| {
                SyncError::FilterPattern(format!("Failed to compile glob '{}': {}", pattern, e))
            })?;

            builder.add(compiled_glob);
        }

        builder.build().map_err(|e| {
            SyncError::FilterPattern(format!("Failed to build globset: {}", e))
        })
    }

    /// Check if a path represents a hidden file or directory
    fn is_hidden(&self, path: &Path) -> bool {
        path.components().any(|component| {
            component.as_os_str()
                .to_str()
                .map(|s| s.starts_with('.') && s != "." && s != "..")
                .unwrap_or(false)
        })
    }
}
