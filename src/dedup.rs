//! Alert deduplication.
//!
//! Two suppression layers, checked per candidate:
//!
//! 1. **Active set** - a condition that is already active for the printer is
//!    never re-raised (the evaluator enforces the same rule when generating
//!    candidates; the check here keeps the contract independent of who
//!    produced the candidate).
//! 2. **Quiet period** - the same (printer, kind) pair is not emitted twice
//!    within the configured window, even across a transient recover/re-trigger
//!    flap. This uses the last emission timestamp, not state alone.
//!
//! A candidate suppressed by the quiet period still marks its condition
//! active, so a persisting condition does not retry emission on every poll.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::AlertKind;

#[derive(Debug, Clone)]
pub struct AlertDeduplicator {
    quiet_period: Duration,
}

impl AlertDeduplicator {
    pub fn new(quiet_period: Duration) -> Self {
        Self { quiet_period }
    }

    /// Should this candidate actually be emitted?
    ///
    /// `last_emitted` is the previous emission time of the same
    /// (printer, kind) pair, if any.
    pub fn should_emit(
        &self,
        kind: AlertKind,
        active: &HashSet<AlertKind>,
        last_emitted: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if active.contains(&kind) {
            return false;
        }

        match last_emitted {
            Some(at) => now - at >= self.quiet_period,
            None => true,
        }
    }
}
