//! Message types for actor communication.

use tokio::sync::oneshot;

use crate::config::PrinterTarget;

/// Commands that can be sent to a PrinterPollerActor
#[derive(Debug)]
pub enum PollerCommand {
    /// Trigger an immediate poll cycle (bypassing the interval timer)
    ///
    /// Used for testing and manual refresh operations.
    PollNow {
        /// Channel to send the result back
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Replace the target definition (address, protocol, interval)
    ///
    /// Applied between cycles; the in-flight cycle finishes on the old
    /// definition.
    UpdateTarget { target: PrinterTarget },

    /// Gracefully shut down the poller
    ///
    /// The actor will finish any in-flight cycle and then exit.
    Shutdown,
}

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Trigger an immediate registry/config re-sync
    Resync {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Get scheduler statistics
    GetStats {
        respond_to: oneshot::Sender<FleetStats>,
    },

    /// Gracefully shut down the whole engine
    ///
    /// Pollers are signalled, in-flight dispatches drain up to the
    /// configured timeout, stragglers are aborted. The ack fires once the
    /// drain has finished.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct FleetStats {
    /// Number of currently running pollers
    pub pollers: usize,

    /// Configured worker pool size
    pub worker_pool_size: usize,

    /// Number of completed re-syncs
    pub resync_count: u64,
}
