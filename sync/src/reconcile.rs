//! Periodic reconciliation

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::synchronizer::Synchronizer;

/// Default time between reconciliation passes
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Run a reconciliation pass every `period`, forever.
///
/// The first pass starts one period after the call. A pass that overruns
/// delays the next one instead of triggering a burst. Failed passes are
/// logged and the timer keeps going.
pub async fn run_reconciliation(sync: Arc<Synchronizer>, period: Duration) {
    info!("Reconciling every {:?}", period);

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Err(e) = sync.reconcile().await {
            error!("Reconciliation pass failed: {}", e);
        }
    }
}
