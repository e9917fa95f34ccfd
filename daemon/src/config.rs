use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use binsync::{
    CompanionRule, CompanionRules, FileFilter, FilterOptions, OrphanPolicy, PreservationOptions,
    RemoveOrphans, SynchronizerOptions, DEFAULT_EVENT_BUFFER, DEFAULT_RECONCILE_INTERVAL,
};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "BINSYNC_CONFIG";

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "binsync.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,
    #[serde(default = "default_sync_dir")]
    pub sync_dir: PathBuf,
    #[serde(default = "default_reconcile_interval", with = "humantime_serde")]
    pub reconcile_interval: Duration,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_include_hidden")]
    pub include_hidden: bool,
    #[serde(default)]
    pub preserve_permissions: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub orphan_rules: Vec<CompanionRule>,
    /// File this configuration was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            sync_dir: default_sync_dir(),
            reconcile_interval: default_reconcile_interval(),
            event_buffer: default_event_buffer(),
            exclude: Vec::new(),
            include_hidden: default_include_hidden(),
            preserve_permissions: false,
            logging: LoggingConfig::default(),
            orphan_rules: Vec::new(),
            source: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl DaemonConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let mut config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load the configuration named by `BINSYNC_CONFIG`, else `binsync.toml`
    /// in the working directory, else the built-in defaults.
    pub async fn discover() -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::discover_from(explicit, Path::new(DEFAULT_CONFIG_FILE)).await
    }

    /// An explicit path must exist; the fallback file is optional.
    pub async fn discover_from(explicit: Option<PathBuf>, fallback: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(&path).await,
            None if fallback.is_file() => Self::load(fallback).await,
            None => Ok(Self::default()),
        }
    }

    /// Command-line values take precedence over the file
    pub fn apply_cli(&mut self, watch_dir: Option<PathBuf>, sync_dir: Option<PathBuf>, debug: bool) {
        if let Some(watch_dir) = watch_dir {
            self.watch_dir = watch_dir;
        }
        if let Some(sync_dir) = sync_dir {
            self.sync_dir = sync_dir;
        }
        if debug {
            self.logging.level = "debug".to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconcile_interval.is_zero() {
            anyhow::bail!("reconcile_interval must be greater than zero");
        }
        if self.event_buffer == 0 {
            anyhow::bail!("event_buffer must be greater than zero");
        }

        for rule in &self.orphan_rules {
            if rule.generated_extension.is_empty() || rule.companion_extension.is_empty() {
                anyhow::bail!(
                    "Orphan rule for '{}' needs both a generated and a companion extension",
                    rule.companion_root.display()
                );
            }
        }

        FileFilter::new(self.filter_options()).context("Invalid exclude pattern")?;

        Ok(())
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            exclude_patterns: self.exclude.clone(),
            include_hidden: self.include_hidden,
            ..Default::default()
        }
    }

    pub fn synchronizer_options(&self) -> SynchronizerOptions {
        SynchronizerOptions {
            filter: self.filter_options(),
            preservation: PreservationOptions {
                preserve_permissions: self.preserve_permissions,
                ..Default::default()
            },
        }
    }

    /// Companion rules when any are configured, otherwise remove every orphan
    pub fn orphan_policy(&self) -> Arc<dyn OrphanPolicy> {
        if self.orphan_rules.is_empty() {
            Arc::new(RemoveOrphans)
        } else {
            Arc::new(CompanionRules::new(self.orphan_rules.clone()))
        }
    }
}

// Default value functions
fn default_watch_dir() -> PathBuf { PathBuf::from("bin/main") }
fn default_sync_dir() -> PathBuf { PathBuf::from("build/classes/java/main") }
fn default_reconcile_interval() -> Duration { DEFAULT_RECONCILE_INTERVAL }
fn default_event_buffer() -> usize { DEFAULT_EVENT_BUFFER }
fn default_include_hidden() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
