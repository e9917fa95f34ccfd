use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use binsync::{
    notification_source, run_event_loop, run_reconciliation, MirrorRoots, Notifications,
    PathMapper, Synchronizer, WatchRegistry,
};

use crate::config::DaemonConfig;

/// Lifecycle of the daemon; phases only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Resolving roots and building the initial mirror
    Bootstrap,
    /// Event loop and reconciliation timer running
    SteadyState,
    /// Tasks stopped, watches released
    Shutdown,
}

pub struct MirrorDaemon {
    config: DaemonConfig,
    phase: Phase,
    sync: Option<Arc<Synchronizer>>,
    tasks: HashMap<String, JoinHandle<()>>,
}

impl MirrorDaemon {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            phase: Phase::Bootstrap,
            sync: None,
            tasks: HashMap::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<()> {
        let notifications = self.bootstrap().await?;
        self.start(notifications)?;

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Ctrl+C received, shutting down");

        self.shutdown().await;
        info!("binsync stopped");
        Ok(())
    }

    /// Resolve the roots, start the notification source and build the
    /// initial mirror. Events raised meanwhile wait in the channel.
    pub async fn bootstrap(&mut self) -> Result<Notifications> {
        info!(
            watch_dir = %self.config.watch_dir.display(),
            sync_dir = %self.config.sync_dir.display(),
            "Starting binsync"
        );

        let roots = MirrorRoots::resolve(&self.config.watch_dir, &self.config.sync_dir)
            .await
            .context("Failed to resolve mirror roots")?;
        let (backend, notifications) = notification_source(self.config.event_buffer)
            .context("Failed to start the notification source")?;

        let sync = Synchronizer::new(
            PathMapper::new(roots),
            WatchRegistry::new(backend).shared(),
            self.config.orphan_policy(),
            self.config.synchronizer_options(),
        )?;

        let metrics = sync.bootstrap().await.context("Initial mirror failed")?;
        info!("Initial mirror complete: {}", metrics.summary());

        self.sync = Some(Arc::new(sync));
        Ok(notifications)
    }

    /// Spawn the event loop and the reconciliation timer
    pub fn start(&mut self, notifications: Notifications) -> Result<()> {
        let sync = self
            .sync
            .clone()
            .context("Daemon must be bootstrapped before it is started")?;

        let handle = tokio::spawn(run_event_loop(sync.clone(), notifications));
        self.tasks.insert("event_loop".to_string(), handle);

        let handle = tokio::spawn(run_reconciliation(sync, self.config.reconcile_interval));
        self.tasks.insert("reconciliation".to_string(), handle);

        self.phase = Phase::SteadyState;
        info!(
            "Mirroring live, reconciling every {:?}",
            self.config.reconcile_interval
        );
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        info!("Shutting down binsync");
        self.phase = Phase::Shutdown;

        for (name, handle) in self.tasks.drain() {
            debug!("Stopping task: {}", name);
            handle.abort();
        }

        if let Some(sync) = self.sync.take() {
            sync.registry().lock().await.clear();
        }
    }
}

impl Drop for MirrorDaemon {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}
