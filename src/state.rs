//! Per-printer runtime state and the fleet-wide state table.
//!
//! The table is the only shared mutable structure in the engine. Access is
//! partitioned per printer: each entry sits behind its own lock, so a slow
//! write for one printer never blocks readers or writers of another. A poll
//! cycle is the only mutator of its printer's entry; everything else reads
//! cloned snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{AlertKind, CanonicalMetrics, PrinterStatus};

/// Mutable per-printer record. Created on the first poll of a target and
/// discarded when the target is removed or disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterRuntimeState {
    pub printer_id: String,

    pub status: PrinterStatus,

    /// Last successful observation. Failed polls do not overwrite this, so
    /// dashboards keep real counters next to the staleness indicator.
    pub last_metrics: Option<CanonicalMetrics>,

    /// Moves only when the status value actually changes.
    pub status_changed_at: Option<DateTime<Utc>>,

    /// Moves on every poll, successful or not.
    pub last_checked_at: Option<DateTime<Utc>>,

    pub consecutive_failures: u32,

    /// Alert conditions currently holding for this printer. A kind in this
    /// set is not re-emitted until it clears and triggers again.
    pub active_alerts: HashSet<AlertKind>,

    /// Last emission time per alert kind, for quiet-period suppression.
    pub last_emitted: HashMap<AlertKind, DateTime<Utc>>,
}

impl PrinterRuntimeState {
    pub fn new(printer_id: &str) -> Self {
        Self {
            printer_id: printer_id.to_string(),
            status: PrinterStatus::Unknown,
            last_metrics: None,
            status_changed_at: None,
            last_checked_at: None,
            consecutive_failures: 0,
            active_alerts: HashSet::new(),
            last_emitted: HashMap::new(),
        }
    }

    /// How long ago this printer was last checked. External reporting shows
    /// this as the staleness indicator for failing printers.
    pub fn staleness(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_checked_at.map(|checked| now - checked)
    }
}

/// Fleet-wide state table with per-entry locking.
#[derive(Debug, Default)]
pub struct FleetStateTable {
    entries: RwLock<HashMap<String, Arc<RwLock<PrinterRuntimeState>>>>,
}

impl FleetStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a printer, created on first use.
    ///
    /// The outer map lock is held only for the lookup/insert; cycles then
    /// work against the entry's own lock.
    pub async fn entry(&self, printer_id: &str) -> Arc<RwLock<PrinterRuntimeState>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(printer_id) {
                return entry.clone();
            }
        }

        let mut entries = self.entries.write().await;
        entries
            .entry(printer_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(PrinterRuntimeState::new(printer_id))))
            .clone()
    }

    /// Consistent snapshot of one printer's state.
    pub async fn snapshot(&self, printer_id: &str) -> Option<PrinterRuntimeState> {
        let entry = {
            let entries = self.entries.read().await;
            entries.get(printer_id).cloned()
        }?;

        let state = entry.read().await;
        Some(state.clone())
    }

    /// Snapshot of the whole fleet, one printer at a time.
    pub async fn snapshot_all(&self) -> Vec<PrinterRuntimeState> {
        let entries: Vec<_> = {
            let map = self.entries.read().await;
            map.values().cloned().collect()
        };

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(entry.read().await.clone());
        }
        snapshots
    }

    /// Discard a printer's state when its target is removed or disabled.
    pub async fn remove(&self, printer_id: &str) -> bool {
        self.entries.write().await.remove(printer_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
