//! Status derivation and alert-candidate generation.
//!
//! ## Offline Hysteresis
//!
//! Declaring a printer offline is streak-gated to absorb transient network
//! blips; recovery is not:
//!
//! ```text
//! unhealthy poll (probe failed, or the device reported itself down):
//!   streak <  threshold, not yet offline → previous status retained
//!   streak >= threshold                  → Offline (alert on the transition)
//!   already offline                      → stays Offline, no new alert
//!
//! healthy poll → status from the levels, single poll is enough
//! ```
//!
//! The asymmetry is intentional: one good probe proves the printer is back,
//! while one bad probe proves very little.
//!
//! This is a pure decision function. All mutation of the runtime state and
//! all I/O happen in the poll cycle that calls it.

use serde::Deserialize;

use crate::config::PollPolicy;
use crate::state::PrinterRuntimeState;
use crate::{AlertEvent, AlertKind, CanonicalMetrics, PrinterStatus};

/// Threshold configuration. Toner and paper are both percentages; the
/// alert taxonomy has no critical paper kind, so only toner can drive
/// `Critical`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_toner_low")]
    pub toner_low_percent: f32,

    #[serde(default = "default_toner_critical")]
    pub toner_critical_percent: f32,

    #[serde(default = "default_paper_low")]
    pub paper_low_percent: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            toner_low_percent: default_toner_low(),
            toner_critical_percent: default_toner_critical(),
            paper_low_percent: default_paper_low(),
        }
    }
}

fn default_toner_low() -> f32 {
    20.0
}

fn default_toner_critical() -> f32 {
    5.0
}

fn default_paper_low() -> f32 {
    15.0
}

/// Outcome of evaluating one poll against the previous state.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub status: PrinterStatus,

    pub status_changed: bool,

    /// Alert candidates for conditions that newly hold. Still subject to
    /// quiet-period deduplication before dispatch.
    pub alerts: Vec<AlertEvent>,

    /// Conditions that no longer hold. Clearing produces a state change but
    /// never an alert by itself.
    pub cleared: Vec<AlertKind>,
}

/// Decide the new status and alert candidates for one poll.
///
/// `failure_streak` counts consecutive polls without a healthy observation,
/// including the current one (zero when the printer was just seen online).
pub fn evaluate(
    previous: &PrinterRuntimeState,
    metrics: &CanonicalMetrics,
    failure_streak: u32,
    policy: &PollPolicy,
    display_name: &str,
) -> Evaluation {
    if !metrics.online {
        return evaluate_unreachable(previous, metrics, failure_streak, policy, display_name);
    }

    let thresholds = &policy.thresholds;
    let mut holding: Vec<AlertKind> = Vec::new();

    let mut status = PrinterStatus::Online;

    if let Some(toner) = metrics.toner_percent {
        if toner <= thresholds.toner_critical_percent {
            holding.push(AlertKind::CriticalToner);
            status = PrinterStatus::Critical;
        }
        // the low band includes the critical band, so a cartridge dropping
        // straight through both raises each alert exactly once
        if toner <= thresholds.toner_low_percent {
            holding.push(AlertKind::LowToner);
            if status == PrinterStatus::Online {
                status = PrinterStatus::Warning;
            }
        }
    }

    if let Some(paper) = metrics.paper_percent {
        if paper <= thresholds.paper_low_percent {
            holding.push(AlertKind::LowPaper);
            if status == PrinterStatus::Online {
                status = PrinterStatus::Warning;
            }
        }
    }

    let alerts = holding
        .iter()
        .copied()
        .filter(|kind| !previous.active_alerts.contains(kind))
        .map(|kind| {
            AlertEvent::new(
                &previous.printer_id,
                kind,
                condition_message(kind, display_name, metrics, thresholds),
                metrics.observed_at,
            )
        })
        .collect();

    let cleared = previous
        .active_alerts
        .iter()
        .copied()
        .filter(|kind| !holding.contains(kind))
        .collect();

    Evaluation {
        status,
        status_changed: status != previous.status,
        alerts,
        cleared,
    }
}

fn evaluate_unreachable(
    previous: &PrinterRuntimeState,
    metrics: &CanonicalMetrics,
    failure_streak: u32,
    policy: &PollPolicy,
    display_name: &str,
) -> Evaluation {
    let already_offline = previous.status == PrinterStatus::Offline;
    let streak_exhausted = failure_streak >= policy.failure_streak_threshold;

    if !already_offline && !streak_exhausted {
        // transient blip: keep the previous status and the active set
        // untouched, the next poll decides
        return Evaluation {
            status: previous.status,
            status_changed: false,
            alerts: Vec::new(),
            cleared: Vec::new(),
        };
    }

    let alerts = if previous.active_alerts.contains(&AlertKind::Offline) {
        Vec::new()
    } else {
        vec![AlertEvent::new(
            &previous.printer_id,
            AlertKind::Offline,
            format!("{display_name} is offline ({failure_streak} consecutive failed polls)"),
            metrics.observed_at,
        )]
    };

    // level conditions can not be verified while the printer is gone; they
    // stay active and resolve on the next successful poll
    Evaluation {
        status: PrinterStatus::Offline,
        status_changed: !already_offline,
        alerts,
        cleared: Vec::new(),
    }
}

fn condition_message(
    kind: AlertKind,
    display_name: &str,
    metrics: &CanonicalMetrics,
    thresholds: &Thresholds,
) -> String {
    match kind {
        AlertKind::Offline => format!("{display_name} is offline"),
        AlertKind::LowToner => format!(
            "{display_name}: toner at {:.0}% (low threshold {:.0}%)",
            metrics.toner_percent.unwrap_or_default(),
            thresholds.toner_low_percent
        ),
        AlertKind::CriticalToner => format!(
            "{display_name}: toner at {:.0}% (critical threshold {:.0}%)",
            metrics.toner_percent.unwrap_or_default(),
            thresholds.toner_critical_percent
        ),
        AlertKind::LowPaper => format!(
            "{display_name}: paper at {:.0}% (low threshold {:.0}%)",
            metrics.paper_percent.unwrap_or_default(),
            thresholds.paper_low_percent
        ),
    }
}
