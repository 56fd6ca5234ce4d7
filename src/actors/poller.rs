//! PrinterPollerActor - runs the poll cycle for a single printer
//!
//! One actor per enabled target. The actor owns its probe (built once,
//! rebuilt on target updates) and drives the full cycle on its own interval:
//!
//! ```text
//! Timer tick → acquire pool permit → Probe → Normalize → Evaluate
//!     ↑            → apply to state table → Sink dispatch → release permit
//!     └─── Commands (PollNow, UpdateTarget, Shutdown)
//! ```
//!
//! Cycles for one printer never overlap: the select loop runs one cycle at a
//! time, which is what guarantees at-most-one mutator per state entry. A
//! hung probe elsewhere in the fleet only delays this printer for the wait
//! on a free permit.
//!
//! No error escapes a cycle. Probe failures feed the failure streak,
//! dispatch failures are logged inside the sink, and the next tick retries
//! on the natural cadence.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::config::{PollPolicy, PrinterTarget};
use crate::dedup::AlertDeduplicator;
use crate::evaluate::evaluate;
use crate::normalize::normalize;
use crate::probe::{Probe, probe_for_target};
use crate::sink::NotificationSink;
use crate::state::FleetStateTable;
use crate::CanonicalMetrics;

use super::messages::PollerCommand;

/// Actor that polls a single printer.
pub struct PrinterPollerActor {
    target: PrinterTarget,

    /// Probe matching the target's protocol, or `None` when the target is
    /// misconfigured (the target is skipped, not the fleet).
    probe: Option<Box<dyn Probe>>,

    command_rx: mpsc::Receiver<PollerCommand>,

    /// Hot-reloaded thresholds and hysteresis knobs.
    policy_rx: watch::Receiver<PollPolicy>,

    table: Arc<FleetStateTable>,

    sink: Arc<NotificationSink>,

    /// Fleet-wide worker pool.
    pool: Arc<Semaphore>,

    display_name: String,

    interval_duration: Duration,
}

impl PrinterPollerActor {
    pub fn new(
        target: PrinterTarget,
        command_rx: mpsc::Receiver<PollerCommand>,
        policy_rx: watch::Receiver<PollPolicy>,
        table: Arc<FleetStateTable>,
        sink: Arc<NotificationSink>,
        pool: Arc<Semaphore>,
    ) -> Self {
        let display_name = target.display_name();
        let interval_duration = Duration::from_secs(target.interval.max(1));

        let probe = match probe_for_target(&target) {
            Ok(probe) => Some(probe),
            Err(e) => {
                warn!("{}: {e}; target will be skipped", target.id);
                None
            }
        };

        Self {
            target,
            probe,
            command_rx,
            policy_rx,
            table,
            sink,
            pool,
            display_name,
            interval_duration,
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self), fields(printer = %self.target.id))]
    pub async fn run(mut self) {
        debug!("starting poller");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                // Timer tick - run a poll cycle
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("poll cycle failed: {:#}", e);
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.run_cycle().await;
                            let _ = respond_to.send(result);
                        }

                        PollerCommand::UpdateTarget { target } => {
                            if target.interval != self.target.interval {
                                debug!("updating interval to {}s", target.interval);
                                self.interval_duration =
                                    Duration::from_secs(target.interval.max(1));
                                ticker = interval(self.interval_duration);
                            }

                            self.probe = match probe_for_target(&target) {
                                Ok(probe) => Some(probe),
                                Err(e) => {
                                    warn!("{}: {e}; target will be skipped", target.id);
                                    None
                                }
                            };
                            self.display_name = target.display_name();
                            self.target = target;
                        }

                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // Command channel closed - exit
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("poller stopped");
    }

    /// One full poll cycle under a worker-pool permit.
    ///
    /// The permit is held until the sink dispatch has completed, bounding
    /// in-flight probes and writes to the pool size.
    async fn run_cycle(&self) -> Result<()> {
        let permit = self
            .pool
            .acquire()
            .await
            .context("worker pool closed")?;

        let result = self.poll_once().await;

        drop(permit);
        result
    }

    #[instrument(skip(self), fields(printer = %self.target.id))]
    async fn poll_once(&self) -> Result<()> {
        let probe = self
            .probe
            .as_ref()
            .with_context(|| format!("{} is misconfigured", self.target.id))?;

        let policy = self.policy_rx.borrow().clone();

        trace!("probing {}", self.target.address);
        let probe_result = probe.probe().await;
        let now = Utc::now();

        let entry = self.table.entry(&self.target.id).await;
        let mut state = entry.write().await;

        let (metrics, probe_error) = match probe_result {
            Ok(raw) => {
                let previous_pages = state.last_metrics.as_ref().and_then(|m| m.page_count);
                (normalize(&raw, previous_pages, now), None)
            }
            Err(e) => (CanonicalMetrics::unreachable(now), Some(e)),
        };

        // a reachable agent reporting its device down counts into the streak
        // the same as a probe that got no answer at all
        let failure_streak = if metrics.online {
            0
        } else {
            state.consecutive_failures + 1
        };

        let evaluation = evaluate(&state, &metrics, failure_streak, &policy, &self.display_name);

        // quiet-period deduplication; suppressed candidates still mark their
        // condition active so a persisting condition does not retry every poll
        let dedup = AlertDeduplicator::new(policy.quiet_period);
        let mut emitted = Vec::with_capacity(evaluation.alerts.len());
        for alert in evaluation.alerts {
            let last = state.last_emitted.get(&alert.kind).copied();
            let should_emit = dedup.should_emit(alert.kind, &state.active_alerts, last, now);

            state.active_alerts.insert(alert.kind);

            if should_emit {
                state.last_emitted.insert(alert.kind, now);
                emitted.push(alert);
            } else {
                trace!("suppressed {} alert within quiet period", alert.kind);
            }
        }

        for kind in &evaluation.cleared {
            state.active_alerts.remove(kind);
            debug!("{kind} condition cleared");
        }

        if evaluation.status_changed {
            debug!("status {} -> {}", state.status, evaluation.status);
            state.status_changed_at = Some(now);
        }
        state.status = evaluation.status;
        state.consecutive_failures = failure_streak;
        state.last_checked_at = Some(now);
        if metrics.online {
            state.last_metrics = Some(metrics);
        }

        let snapshot = state.clone();
        drop(state);

        self.sink.dispatch(&snapshot, &emitted).await;

        match probe_error {
            Some(e) => {
                warn!("probe failed ({}): {} (streak {failure_streak})", e.kind, e.detail);
                Err(anyhow::Error::new(e))
            }
            None => Ok(()),
        }
    }
}

/// Handle for controlling a PrinterPollerActor
///
/// This handle provides a typed API for sending commands to the actor.
/// It can be cloned and shared across threads.
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,

    pub printer_id: String,

    pub display_name: String,
}

impl PollerHandle {
    /// Spawn a new poller actor.
    ///
    /// Returns the handle plus the task's join handle, which the scheduler
    /// keeps for the shutdown drain.
    pub fn spawn(
        target: PrinterTarget,
        policy_rx: watch::Receiver<PollPolicy>,
        table: Arc<FleetStateTable>,
        sink: Arc<NotificationSink>,
        pool: Arc<Semaphore>,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let printer_id = target.id.clone();
        let display_name = target.display_name();

        let actor = PrinterPollerActor::new(target, cmd_rx, policy_rx, table, sink, pool);

        let task = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                printer_id,
                display_name,
            },
            task,
        )
    }

    /// Trigger an immediate poll cycle
    ///
    /// This bypasses the interval timer and polls immediately.
    /// Useful for testing and manual refresh operations.
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    /// Push an updated target definition
    pub async fn update_target(&self, target: PrinterTarget) -> Result<()> {
        self.sender
            .send(PollerCommand::UpdateTarget { target })
            .await
            .context("failed to send UpdateTarget command")?;
        Ok(())
    }

    /// Gracefully shut down the poller
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
