//! Notification sink and its external collaborators.
//!
//! The sink fans one finished poll cycle out to persistence and the live
//! update channel. Both are at-least-once, best-effort: a failure is logged
//! with the printer's identity and never fails the cycle - the next poll's
//! natural cadence is the retry loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{error, instrument, trace};

use crate::state::PrinterRuntimeState;
use crate::{AlertEvent, CanonicalMetrics, PrinterStatus};

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors from the state/alert repositories.
#[derive(Debug)]
pub enum PersistenceError {
    /// Repository backend could not be reached.
    ConnectionFailed(String),

    /// The write itself failed.
    WriteFailed(String),

    /// The repository is temporarily not accepting writes.
    Unavailable(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to repository: {}", msg)
            }
            PersistenceError::WriteFailed(msg) => write!(f, "repository write failed: {}", msg),
            PersistenceError::Unavailable(msg) => write!(f, "repository unavailable: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Persists per-printer state snapshots. Safe to call repeatedly with the
/// same logical content.
#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn save_state(&self, snapshot: &PrinterRuntimeState) -> PersistenceResult<()>;
}

/// Persists finalized alerts. Safe to call repeatedly with the same logical
/// content.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn save_alert(&self, alert: &AlertEvent) -> PersistenceResult<()>;
}

/// Push channel towards connected clients. No delivery guarantee; an
/// implementation must never block the polling core on slow consumers.
#[async_trait]
pub trait LiveUpdateChannel: Send + Sync {
    async fn publish_status(
        &self,
        printer_id: &str,
        status: PrinterStatus,
        metrics: Option<&CanonicalMetrics>,
    );

    async fn publish_alert(&self, printer_id: &str, message: &str);
}

/// Update pushed to connected clients.
#[derive(Debug, Clone)]
pub enum LiveUpdate {
    Status {
        printer_id: String,
        status: PrinterStatus,
        metrics: Option<CanonicalMetrics>,
    },
    Alert {
        printer_id: String,
        message: String,
    },
}

/// In-memory state repository.
///
/// Keeps the latest snapshot per printer. Used by tests and as the default
/// wiring of the engine binary when no external store is attached.
#[derive(Debug, Default)]
pub struct MemoryStateRepository {
    states: RwLock<HashMap<String, PrinterRuntimeState>>,
}

impl MemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, printer_id: &str) -> Option<PrinterRuntimeState> {
        self.states.read().await.get(printer_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait]
impl StateRepository for MemoryStateRepository {
    async fn save_state(&self, snapshot: &PrinterRuntimeState) -> PersistenceResult<()> {
        self.states
            .write()
            .await
            .insert(snapshot.printer_id.clone(), snapshot.clone());
        Ok(())
    }
}

/// In-memory alert repository, append-only.
#[derive(Debug, Default)]
pub struct MemoryAlertRepository {
    alerts: RwLock<Vec<AlertEvent>>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<AlertEvent> {
        self.alerts.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.alerts.read().await.len()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn save_alert(&self, alert: &AlertEvent) -> PersistenceResult<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }
}

/// Live-update channel backed by a tokio broadcast channel.
///
/// Slow subscribers lag and drop updates instead of exerting backpressure,
/// which is the contract the polling core needs.
#[derive(Debug, Clone)]
pub struct BroadcastLiveChannel {
    sender: broadcast::Sender<LiveUpdate>,
}

impl BroadcastLiveChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl LiveUpdateChannel for BroadcastLiveChannel {
    async fn publish_status(
        &self,
        printer_id: &str,
        status: PrinterStatus,
        metrics: Option<&CanonicalMetrics>,
    ) {
        // no subscribers is fine
        let _ = self.sender.send(LiveUpdate::Status {
            printer_id: printer_id.to_string(),
            status,
            metrics: metrics.cloned(),
        });
    }

    async fn publish_alert(&self, printer_id: &str, message: &str) {
        let _ = self.sender.send(LiveUpdate::Alert {
            printer_id: printer_id.to_string(),
            message: message.to_string(),
        });
    }
}

/// Fan-out of one finished poll cycle.
pub struct NotificationSink {
    states: Arc<dyn StateRepository>,
    alerts: Arc<dyn AlertRepository>,
    live: Arc<dyn LiveUpdateChannel>,
}

impl NotificationSink {
    pub fn new(
        states: Arc<dyn StateRepository>,
        alerts: Arc<dyn AlertRepository>,
        live: Arc<dyn LiveUpdateChannel>,
    ) -> Self {
        Self {
            states,
            alerts,
            live,
        }
    }

    /// Persist the snapshot and dispatch the surviving alerts.
    ///
    /// Callers await this before releasing their concurrency slot, bounding
    /// the number of in-flight writes to the worker-pool size.
    #[instrument(skip_all, fields(printer = %snapshot.printer_id))]
    pub async fn dispatch(&self, snapshot: &PrinterRuntimeState, alerts: &[AlertEvent]) {
        if let Err(e) = self.states.save_state(snapshot).await {
            error!("failed to persist state snapshot: {e}");
        }

        self.live
            .publish_status(
                &snapshot.printer_id,
                snapshot.status,
                snapshot.last_metrics.as_ref(),
            )
            .await;

        for alert in alerts {
            trace!("dispatching {} alert", alert.kind);

            if let Err(e) = self.alerts.save_alert(alert).await {
                error!("failed to persist {} alert: {e}", alert.kind);
            }

            self.live
                .publish_alert(&alert.printer_id, &alert.message)
                .await;
        }
    }
}
