pub mod actors;
pub mod config;
pub mod dedup;
pub mod evaluate;
pub mod normalize;
pub mod probe;
pub mod registry;
pub mod sink;
pub mod snmp;
pub mod state;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last derived status of a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    /// Never successfully polled.
    #[default]
    Unknown,
    /// Reachable, all levels above the configured thresholds.
    Online,
    /// Probe failures exceeded the failure streak threshold.
    Offline,
    /// At least one level at or below its low threshold.
    Warning,
    /// Toner at or below the critical threshold.
    Critical,
}

impl std::fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrinterStatus::Unknown => write!(f, "unknown"),
            PrinterStatus::Online => write!(f, "online"),
            PrinterStatus::Offline => write!(f, "offline"),
            PrinterStatus::Warning => write!(f, "warning"),
            PrinterStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Canonical per-poll observation, produced by the normalizer.
///
/// Fields the probe could not read are `None`, never zero, so that a missing
/// counter can not cross a threshold. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetrics {
    /// Whether the probe reached the printer.
    pub online: bool,

    /// Lifetime page counter. Monotonic across successful polls under normal
    /// operation; resets when the device or its counter is replaced.
    pub page_count: Option<u64>,

    /// Toner level, 0–100.
    pub toner_percent: Option<f32>,

    /// Paper level, 0–100.
    pub paper_percent: Option<f32>,

    /// When the observation was made.
    pub observed_at: DateTime<Utc>,
}

impl CanonicalMetrics {
    /// Observation for a poll where the printer could not be reached.
    pub fn unreachable(observed_at: DateTime<Utc>) -> Self {
        Self {
            online: false,
            page_count: None,
            toner_percent: None,
            paper_percent: None,
            observed_at,
        }
    }
}

/// Alert condition kinds. At most one alert is active per (printer, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Offline,
    LowToner,
    CriticalToner,
    LowPaper,
}

impl AlertKind {
    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertKind::Offline | AlertKind::CriticalToner => AlertSeverity::Critical,
            AlertKind::LowToner | AlertKind::LowPaper => AlertSeverity::Warning,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Offline => write!(f, "offline"),
            AlertKind::LowToner => write!(f, "low_toner"),
            AlertKind::CriticalToner => write!(f, "critical_toner"),
            AlertKind::LowPaper => write!(f, "low_paper"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A finalized alert, terminal once dispatched through the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Opaque printer identifier from the fleet registry.
    pub printer_id: String,

    pub kind: AlertKind,

    pub severity: AlertSeverity,

    /// Human-readable message for dashboards and push notifications.
    pub message: String,

    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        printer_id: &str,
        kind: AlertKind,
        message: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            printer_id: printer_id.to_string(),
            kind,
            severity: kind.severity(),
            message,
            timestamp,
        }
    }

    /// Deduplication key: one active alert per (printer, kind).
    pub fn dedup_key(&self) -> (&str, AlertKind) {
        (&self.printer_id, self.kind)
    }
}
