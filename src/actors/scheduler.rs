//! SchedulerActor - owns the lifecycle of the polling fleet
//!
//! On start the scheduler performs an initial re-sync against the fleet
//! registry; afterwards a periodic tick re-reads registry and configuration:
//!
//! - new enabled targets get a poller
//! - removed or disabled targets are shut down and their state discarded
//! - changed targets are pushed to their poller (UpdateTarget)
//! - policy changes (thresholds, streak, quiet period) are published on the
//!   watch channel
//! - the worker pool is resized
//!
//! Unaffected pollers keep running through a re-sync.
//!
//! Shutdown stops the re-sync loop, signals every poller, and awaits their
//! tasks up to the drain timeout; whatever has not finished by then is
//! aborted and logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::config::{EngineConfig, PollPolicy, PrinterTarget};
use crate::registry::{ConfigSource, FleetRegistry};
use crate::sink::NotificationSink;
use crate::state::FleetStateTable;

use super::messages::{FleetStats, SchedulerCommand};
use super::poller::PollerHandle;

struct PollerEntry {
    handle: PollerHandle,
    task: JoinHandle<()>,
    target: PrinterTarget,
}

/// Actor that keeps the poller set in sync with the registry.
pub struct SchedulerActor {
    registry: Arc<dyn FleetRegistry>,
    config_source: Arc<dyn ConfigSource>,

    table: Arc<FleetStateTable>,
    sink: Arc<NotificationSink>,

    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// Fleet-wide worker pool, shared with every poller.
    pool: Arc<Semaphore>,

    /// Desired pool size from the last good config read.
    pool_size: usize,

    /// Shrink amount not yet applied because the permits were in flight.
    pending_shrink: usize,

    policy_tx: watch::Sender<PollPolicy>,

    pollers: HashMap<String, PollerEntry>,

    /// Tasks of retired pollers, drained on shutdown.
    retired: Vec<JoinHandle<()>>,

    engine: EngineConfig,

    resync_count: u64,
}

impl SchedulerActor {
    fn new(
        registry: Arc<dyn FleetRegistry>,
        config_source: Arc<dyn ConfigSource>,
        table: Arc<FleetStateTable>,
        sink: Arc<NotificationSink>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        policy_tx: watch::Sender<PollPolicy>,
    ) -> Self {
        Self {
            registry,
            config_source,
            table,
            sink,
            command_rx,
            // sized on the first re-sync
            pool: Arc::new(Semaphore::new(0)),
            pool_size: 0,
            pending_shrink: 0,
            policy_tx,
            pollers: HashMap::new(),
            retired: Vec::new(),
            engine: EngineConfig::default(),
            resync_count: 0,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting scheduler");

        if let Err(e) = self.resync().await {
            error!("initial re-sync failed: {:#}", e);
        }

        let mut resync_secs = self.engine.resync_interval;
        let mut ticker = interval(Duration::from_secs(resync_secs.max(1)));
        // the first tick of a fresh interval completes immediately and the
        // initial re-sync just ran
        ticker.tick().await;

        let mut shutdown_ack: Option<oneshot::Sender<()>> = None;

        loop {
            tokio::select! {
                // Periodic re-sync
                _ = ticker.tick() => {
                    if let Err(e) = self.resync().await {
                        error!("re-sync failed: {:#}", e);
                    }

                    if self.engine.resync_interval != resync_secs {
                        resync_secs = self.engine.resync_interval;
                        debug!("updating re-sync interval to {resync_secs}s");
                        ticker = interval(Duration::from_secs(resync_secs.max(1)));
                        ticker.tick().await;
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::Resync { respond_to } => {
                            debug!("received Resync command");
                            let result = self.resync().await;
                            let _ = respond_to.send(result);
                        }

                        SchedulerCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(FleetStats {
                                pollers: self.pollers.len(),
                                worker_pool_size: self.pool_size,
                                resync_count: self.resync_count,
                            });
                        }

                        SchedulerCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }
                    }
                }

                // Command channel closed
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        self.drain().await;

        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Reload registry and configuration, reconciling the poller set.
    #[instrument(skip(self))]
    async fn resync(&mut self) -> Result<()> {
        match self.config_source.load_engine_config().await {
            Ok(engine) => self.apply_engine_config(engine),
            Err(e) => warn!("failed to reload engine config, keeping current: {:#}", e),
        }

        let targets = self
            .registry
            .load_targets()
            .await
            .context("failed to load fleet targets")?;

        let enabled: HashMap<String, PrinterTarget> = targets
            .into_iter()
            .filter(|target| target.enabled)
            .map(|target| (target.id.clone(), target))
            .collect();

        // retire pollers whose target is gone or disabled
        let removed: Vec<String> = self
            .pollers
            .keys()
            .filter(|id| !enabled.contains_key(*id))
            .cloned()
            .collect();

        for id in removed {
            debug!("retiring poller for {id}");
            if let Some(entry) = self.pollers.remove(&id) {
                let _ = entry.handle.shutdown().await;
                self.retired.push(entry.task);
            }
            self.table.remove(&id).await;
        }

        // spawn or update the rest
        for (id, target) in enabled {
            match self.pollers.get_mut(&id) {
                None => {
                    debug!("spawning poller for {id}");
                    let (handle, task) = PollerHandle::spawn(
                        target.clone(),
                        self.policy_tx.subscribe(),
                        self.table.clone(),
                        self.sink.clone(),
                        self.pool.clone(),
                    );
                    self.pollers.insert(id, PollerEntry { handle, task, target });
                }
                Some(entry) if entry.target != target => {
                    debug!("updating target for {id}");
                    let _ = entry.handle.update_target(target.clone()).await;
                    entry.target = target;
                }
                Some(_) => {}
            }
        }

        self.retired.retain(|task| !task.is_finished());

        self.resync_count += 1;
        trace!(
            "re-sync #{} complete: {} pollers, pool size {}",
            self.resync_count,
            self.pollers.len(),
            self.pool_size
        );

        Ok(())
    }

    fn apply_engine_config(&mut self, engine: EngineConfig) {
        let policy = engine.policy();
        if *self.policy_tx.borrow() != policy {
            debug!("publishing updated poll policy");
        }
        self.policy_tx.send_replace(policy);

        self.resize_pool(engine.worker_pool_size);
        self.engine = engine;
    }

    /// Adjust the worker pool towards the desired size.
    ///
    /// Growth is immediate. Shrinking can only take permits that are not in
    /// flight, so the remainder is retried on later re-syncs as cycles go
    /// idle.
    fn resize_pool(&mut self, desired: usize) {
        if desired > self.pool_size {
            let mut grow = desired - self.pool_size;

            // outstanding shrink cancels against growth first
            let cancelled = self.pending_shrink.min(grow);
            self.pending_shrink -= cancelled;
            grow -= cancelled;

            if grow > 0 {
                self.pool.add_permits(grow);
            }
            debug!("worker pool grown to {desired}");
        } else if desired < self.pool_size {
            self.pending_shrink += self.pool_size - desired;
            debug!("worker pool shrinking to {desired}");
        }
        self.pool_size = desired;

        if self.pending_shrink > 0 {
            let forgotten = self.pool.forget_permits(self.pending_shrink);
            self.pending_shrink -= forgotten;
            if self.pending_shrink > 0 {
                trace!(
                    "{} permits still in flight, shrink continues next re-sync",
                    self.pending_shrink
                );
            }
        }
    }

    /// Stop every poller and wait for in-flight work, bounded by the drain
    /// timeout.
    async fn drain(mut self) {
        debug!("shutting down {} pollers", self.pollers.len());

        let mut tasks = Vec::with_capacity(self.pollers.len() + self.retired.len());
        for (_, entry) in self.pollers.drain() {
            let _ = entry.handle.shutdown().await;
            tasks.push(entry.task);
        }
        tasks.append(&mut self.retired);

        let abort_handles: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();
        let drain_timeout = Duration::from_secs(self.engine.shutdown_drain_secs.max(1));

        let all = futures::future::join_all(tasks);
        if tokio::time::timeout(drain_timeout, all).await.is_err() {
            warn!(
                "drain did not finish within {:?}, aborting stragglers",
                drain_timeout
            );
            for handle in abort_handles {
                handle.abort();
            }
        }

        debug!("scheduler stopped");
    }
}

/// Handle for controlling the SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the scheduler.
    ///
    /// The actor performs its initial re-sync immediately; by the time the
    /// first targets are loaded, pollers start on their own intervals.
    pub fn spawn(
        registry: Arc<dyn FleetRegistry>,
        config_source: Arc<dyn ConfigSource>,
        table: Arc<FleetStateTable>,
        sink: Arc<NotificationSink>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (policy_tx, _) = watch::channel(PollPolicy::default());

        let actor = SchedulerActor::new(registry, config_source, table, sink, cmd_rx, policy_tx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Trigger an immediate re-sync
    pub async fn resync(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Resync { respond_to: tx })
            .await
            .context("failed to send Resync command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    /// Get scheduler statistics
    pub async fn stats(&self) -> Option<FleetStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Shut down the engine, returning once the drain has finished.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
