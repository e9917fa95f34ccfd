//! Directory mirroring engine
//!
//! Keeps a target directory a live mirror of a source directory:
//! - Initial full mirror of the source tree
//! - Per-directory watch registrations that follow the tree as it changes
//! - Translation of filesystem notifications into copy and remove operations
//! - Periodic reconciliation that repairs missed events and clears orphans
//! - Glob-based exclusion and a pluggable orphan policy

pub mod error;
pub mod event;
pub mod event_loop;
pub mod filter;
pub mod metrics;
pub mod mirror_io;
pub mod orphan;
pub mod paths;
pub mod preservation;
pub mod reconcile;
pub mod registry;
pub mod scanner;
pub mod synchronizer;
pub mod watcher;

// Re-export main types and functions
pub use error::{Result, SyncError};
pub use event::MirrorEvent;
pub use event_loop::run_event_loop;
pub use filter::{FileFilter, FilterOptions};
pub use metrics::PassMetrics;
pub use orphan::{CompanionRule, CompanionRules, OrphanPolicy, RemoveOrphans};
pub use paths::{MirrorRoots, PathMapper};
pub use preservation::{AttributePreserver, PreservationOptions};
pub use reconcile::{run_reconciliation, DEFAULT_RECONCILE_INTERVAL};
pub use registry::{SharedRegistry, WatchBackend, WatchRegistry};
pub use scanner::{DirectoryScanner, FileEntry, WalkOrder};
pub use synchronizer::{Synchronizer, SynchronizerOptions};
pub use watcher::{notification_source, Notifications, NotifyBackend, DEFAULT_EVENT_BUFFER};

// Test modules
#[cfg(test)]
mod test_support;
