//! Raw probe samples to canonical metrics.
//!
//! Pure mapping layer: protocol-specific identifiers in, canonical fields
//! out. Anything the probe could not read stays `None` - a missing counter
//! must never look like a zero reading and cross a threshold.

use chrono::{DateTime, Utc};

use crate::probe::{RawSample, spooler};
use crate::snmp;
use crate::CanonicalMetrics;

/// Page-counter dips up to this many pages are treated as read jitter and
/// held at the previous value; anything larger is a counter reset.
pub const PAGE_COUNT_JITTER_TOLERANCE: u64 = 50;

/// hrDeviceStatus value for a device that is down.
const DEVICE_STATUS_DOWN: i64 = 5;

/// Convert one raw sample into canonical metrics.
///
/// `previous_page_count` is the last recorded value for the same printer and
/// only feeds the jitter/reset decision; it is never substituted for a
/// missing reading.
pub fn normalize(
    raw: &RawSample,
    previous_page_count: Option<u64>,
    observed_at: DateTime<Utc>,
) -> CanonicalMetrics {
    if !raw.reachable {
        return CanonicalMetrics::unreachable(observed_at);
    }

    CanonicalMetrics {
        online: device_online(raw),
        page_count: reconcile_page_count(page_count(raw), previous_page_count),
        toner_percent: toner_percent(raw),
        paper_percent: paper_percent(raw),
        observed_at,
    }
}

fn device_online(raw: &RawSample) -> bool {
    // the spooler answers for printers it can no longer see
    if raw.get(spooler::KEY_STATE) == Some(spooler::STATE_OFFLINE) {
        return false;
    }

    // an SNMP agent can answer while the engine itself reports down
    if let Some(status) = parse_i64(raw.get(snmp::OID_DEVICE_STATUS)) {
        if status == DEVICE_STATUS_DOWN {
            return false;
        }
    }

    true
}

fn page_count(raw: &RawSample) -> Option<u64> {
    parse_u64(raw.get(snmp::OID_LIFE_PAGE_COUNT))
        .or_else(|| parse_u64(raw.get(spooler::KEY_PAGE_COUNT)))
}

/// Apply the jitter/reset rule to a fresh page counter reading.
fn reconcile_page_count(new: Option<u64>, previous: Option<u64>) -> Option<u64> {
    match (new, previous) {
        (Some(new), Some(previous)) if new < previous => {
            if previous - new <= PAGE_COUNT_JITTER_TOLERANCE {
                // small dip: keep the counter monotonic
                Some(previous)
            } else {
                // counter reset (device or counter replaced): take it as-is
                Some(new)
            }
        }
        (new, _) => new,
    }
}

fn toner_percent(raw: &RawSample) -> Option<f32> {
    parse_percent(raw.get(spooler::KEY_TONER_PERCENT)).or_else(|| {
        ratio_percent(
            parse_i64(raw.get(snmp::OID_SUPPLY_LEVEL)),
            parse_i64(raw.get(snmp::OID_SUPPLY_MAX)),
        )
    })
}

fn paper_percent(raw: &RawSample) -> Option<f32> {
    parse_percent(raw.get(spooler::KEY_PAPER_PERCENT)).or_else(|| {
        ratio_percent(
            parse_i64(raw.get(snmp::OID_INPUT_LEVEL)),
            parse_i64(raw.get(snmp::OID_INPUT_MAX)),
        )
    })
}

/// Level/capacity pair to a percentage. SNMP uses negative sentinel levels
/// for "unknown" and "unrestricted"; both map to absent.
fn ratio_percent(level: Option<i64>, max: Option<i64>) -> Option<f32> {
    let level = level?;
    let max = max?;

    if level < 0 || max <= 0 {
        return None;
    }

    Some(((level as f64 / max as f64) * 100.0).clamp(0.0, 100.0) as f32)
}

fn parse_percent(text: Option<&str>) -> Option<f32> {
    let value: f32 = text?.trim().parse().ok()?;
    if value < 0.0 {
        // negative means the spooler does not know the level
        return None;
    }
    Some(value.min(100.0))
}

fn parse_u64(text: Option<&str>) -> Option<u64> {
    text?.trim().parse().ok()
}

fn parse_i64(text: Option<&str>) -> Option<i64> {
    text?.trim().parse().ok()
}
