//! The task that applies notifications to the mirror

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::synchronizer::Synchronizer;
use crate::watcher::Notifications;

/// Consume events and watcher errors until both channels close.
///
/// Events are applied one at a time in arrival order. Watcher errors are
/// logged; the mirror they may have cost is repaired by reconciliation.
pub async fn run_event_loop(sync: Arc<Synchronizer>, notifications: Notifications) {
    let Notifications { mut events, mut errors } = notifications;
    let mut errors_open = true;

    info!("Event loop started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    debug!("Event: {:?}", event);
                    sync.handle(event).await;
                }
                None => break,
            },
            error = errors.recv(), if errors_open => match error {
                Some(error) => warn!("Watcher error: {}", error),
                None => errors_open = false,
            },
        }
    }

    info!("Event loop stopped");
}
