//! Counters for one bootstrap or reconciliation pass

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What a single pass over the trees changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassMetrics {
    /// Source entries visited
    pub scanned: usize,
    /// Files copied into the mirror
    pub copied: usize,
    /// Bytes written by those copies
    pub bytes_copied: u64,
    /// Directories created in the mirror
    pub directories_created: usize,
    /// Mirror entries removed (orphans and entries replaced by another kind)
    pub removed: usize,
    /// Orphans the orphan policy kept
    pub orphans_kept: usize,
    /// Watch registrations added
    pub watches_added: usize,
    /// Watch registrations dropped
    pub watches_dropped: usize,
    /// Paths whose repair failed
    pub failed: usize,
    /// Wall-clock duration of the pass
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl PassMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_copy(&mut self, bytes: u64) {
        self.copied += 1;
        self.bytes_copied += bytes;
    }

    /// Number of changes made to the mirror or the watch set
    pub fn mutations(&self) -> usize {
        self.copied
            + self.directories_created
            + self.removed
            + self.watches_added
            + self.watches_dropped
    }

    pub fn is_clean(&self) -> bool {
        self.mutations() == 0 && self.failed == 0
    }

    /// Get a summary string
    pub fn summary(&self) -> String {
        format!(
            "{} entries scanned in {:.2}s: {} files copied ({} bytes), {} directories created, {} removed, {} orphans kept, watches +{}/-{}, {} failed",
            self.scanned,
            self.duration.as_secs_f64(),
            self.copied,
            self.bytes_copied,
            self.directories_created,
            self.removed,
            self.orphans_kept,
            self.watches_added,
            self.watches_dropped,
            self.failed
        )
    }

    /// Log the pass at info level with structured fields
    pub fn log(&self, pass: &str) {
        info!(
            pass,
            scanned = self.scanned,
            copied = self.copied,
            bytes_copied = self.bytes_copied,
            directories_created = self.directories_created,
            removed = self.removed,
            orphans_kept = self.orphans_kept,
            watches_added = self.watches_added,
            watches_dropped = self.watches_dropped,
            failed = self.failed,
            duration_ms = self.duration.as_millis() as u64,
            "Pass completed"
        );
    }
}

mod duration_millis {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
