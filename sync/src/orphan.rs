//! Deciding what happens to mirror entries whose source is gone
//!
//! By default every orphan is removed. Build outputs sometimes outlive the
//! file that produced them in a different tree (a `.class` file lingering in
//! the compiler output after its `.java` source was deleted), and the
//! companion rules below express "remove the generated file only once its
//! companion source is gone too".

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

/// Decides whether an orphaned mirror entry may be removed.
///
/// Decisions are made on the blocking thread pool, so an implementation may
/// look at the filesystem.
pub trait OrphanPolicy: Send + Sync + Debug {
    /// `relative` is the orphan's path relative to the mirror root
    fn should_remove(&self, relative: &Path, is_dir: bool) -> bool;
}

/// Remove every orphan
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOrphans;

impl OrphanPolicy for RemoveOrphans {
    fn should_remove(&self, _relative: &Path, _is_dir: bool) -> bool {
        true
    }
}

/// Keeps a generated file while its companion source file exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionRule {
    /// Extension of the generated file, without the dot (`class`)
    pub generated_extension: String,
    /// Extension of the companion file, without the dot (`java`)
    pub companion_extension: String,
    /// Root of the tree holding companion files
    pub companion_root: PathBuf,
    /// Separator marking nested outputs that share one companion
    /// (`Outer$Inner.class` comes from `Outer.java` with `$`)
    #[serde(default)]
    pub nested_separator: Option<char>,
}

impl CompanionRule {
    pub fn new(
        generated_extension: impl Into<String>,
        companion_extension: impl Into<String>,
        companion_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generated_extension: generated_extension.into(),
            companion_extension: companion_extension.into(),
            companion_root: companion_root.into(),
            nested_separator: None,
        }
    }

    pub fn with_nested_separator(mut self, separator: char) -> Self {
        self.nested_separator = Some(separator);
        self
    }

    /// Whether this rule is responsible for `relative`
    pub fn applies_to(&self, relative: &Path) -> bool {
        relative
            .extension()
            .map(|ext| ext == self.generated_extension.as_str())
            .unwrap_or(false)
    }

    /// Where the companion of `relative` would live
    pub fn companion_path(&self, relative: &Path) -> Option<PathBuf> {
        let stem = relative.file_stem()?.to_str()?;
        let stem = match self.nested_separator {
            Some(separator) => stem.split(separator).next().unwrap_or(stem),
            None => stem,
        };
        if stem.is_empty() {
            return None;
        }

        let file_name = format!("{}.{}", stem, self.companion_extension);
        let companion = match relative.parent() {
            Some(parent) => self.companion_root.join(parent).join(file_name),
            None => self.companion_root.join(file_name),
        };
        Some(companion)
    }

    fn companion_exists(&self, relative: &Path) -> bool {
        self.companion_path(relative)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}

/// An ordered set of companion rules; the first applicable rule decides.
/// Orphans no rule applies to are removed.
#[derive(Debug, Clone, Default)]
pub struct CompanionRules {
    rules: Vec<CompanionRule>,
}

impl CompanionRules {
    pub fn new(rules: Vec<CompanionRule>) -> Self {
        Self { rules }
    }
}

impl OrphanPolicy for CompanionRules {
    fn should_remove(&self, relative: &Path, is_dir: bool) -> bool {
        if is_dir {
            return true;
        }

        match self.rules.iter().find(|rule| rule.applies_to(relative)) {
            Some(rule) => !rule.companion_exists(relative),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    fn java_rule(root: &Path) -> CompanionRule {
        CompanionRule::new("class", "java", root).with_nested_separator('$')
    }

    #[test_case("com/example/App.class", "com/example/App.java" ; "top level class")]
    #[test_case("com/example/App$Inner.class", "com/example/App.java" ; "nested class")]
    #[test_case("App$1.class", "App.java" ; "anonymous class at root")]
    fn test_companion_path(generated: &str, companion: &str) {
        let rule = java_rule(Path::new("/src/main/java"));
        assert_eq!(
            rule.companion_path(Path::new(generated)).unwrap(),
            Path::new("/src/main/java").join(companion)
        );
    }

    #[test]
    fn test_without_separator_dollar_is_part_of_the_name() {
        let rule = CompanionRule::new("class", "java", "/src");
        assert_eq!(
            rule.companion_path(Path::new("App$Inner.class")).unwrap(),
            PathBuf::from("/src/App$Inner.java")
        );
    }

    #[test]
    fn test_live_companion_keeps_generated_file() {
        let temp_dir = TempDir::new().unwrap();
        let java_root = temp_dir.path().join("java");
        std::fs::create_dir_all(java_root.join("pkg")).unwrap();
        std::fs::write(java_root.join("pkg").join("Kept.java"), b"class Kept {}").unwrap();

        let rules = CompanionRules::new(vec![java_rule(&java_root)]);

        assert!(!rules.should_remove(Path::new("pkg/Kept.class"), false));
        assert!(!rules.should_remove(Path::new("pkg/Kept$Inner.class"), false));
        assert!(rules.should_remove(Path::new("pkg/Gone.class"), false));
    }

    #[test]
    fn test_unmatched_orphans_are_removed() {
        let rules = CompanionRules::new(vec![java_rule(Path::new("/nonexistent"))]);

        assert!(rules.should_remove(Path::new("application.properties"), false));
        assert!(rules.should_remove(Path::new("pkg"), true));
    }

    #[test]
    fn test_default_policy_removes_everything() {
        assert!(RemoveOrphans.should_remove(Path::new("App.class"), false));
        assert!(RemoveOrphans.should_remove(Path::new("pkg"), true));
    }

    #[test]
    fn test_other_extensions_are_not_claimed() {
        let rule = java_rule(Path::new("/src"));

        assert!(rule.applies_to(Path::new("App.class")));
        assert!(!rule.applies_to(Path::new("App.classpath")));
        assert!(!rule.applies_to(Path::new("class")));
    }
}
