//! The OS notification source
//!
//! A `notify` watcher whose callback translates raw notifications into
//! [`MirrorEvent`]s and hands them to the event loop over bounded channels.
//! The callback runs on the backend's own thread and never blocks: when a
//! channel is full the notification is dropped and the next reconciliation
//! pass repairs whatever it would have changed.

use std::path::Path;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::event::MirrorEvent;
use crate::registry::WatchBackend;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Capacity of the watcher error channel
const ERROR_BUFFER: usize = 64;

/// Receiving ends of the notification source
#[derive(Debug)]
pub struct Notifications {
    pub events: mpsc::Receiver<MirrorEvent>,
    pub errors: mpsc::Receiver<notify::Error>,
}

/// [`WatchBackend`] backed by the platform's recommended watcher
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend").finish_non_exhaustive()
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        self.watcher.unwatch(path)
    }
}

/// Create the notification source with an event channel of `capacity`.
pub fn notification_source(capacity: usize) -> Result<(NotifyBackend, Notifications)> {
    let (event_tx, events) = mpsc::channel(capacity.max(1));
    let (error_tx, errors) = mpsc::channel(ERROR_BUFFER);

    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        forward(res, &event_tx, &error_tx);
    })
    .map_err(SyncError::NotificationSource)?;

    Ok((NotifyBackend { watcher }, Notifications { events, errors }))
}

/// Hand one raw notification to the event loop without waiting.
///
/// Returns how many items were dropped because a channel was full or closed.
fn forward(
    res: notify::Result<notify::Event>,
    event_tx: &mpsc::Sender<MirrorEvent>,
    error_tx: &mpsc::Sender<notify::Error>,
) -> usize {
    let mut dropped = 0;
    match res {
        Ok(event) => {
            for mirror_event in MirrorEvent::from_notify(event) {
                if let Err(e) = event_tx.try_send(mirror_event) {
                    warn!("Dropping watcher event: {}", e);
                    dropped += 1;
                }
            }
        }
        Err(error) => {
            if let Err(e) = error_tx.try_send(error) {
                warn!("Dropping watcher error: {}", e);
                dropped += 1;
            }
        }
    }
    dropped
}
