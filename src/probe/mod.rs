//! Transport probes - one liveness/metrics query to one printer.
//!
//! Two variants, selected by target configuration:
//!
//! 1. **SnmpProbe** - SNMP v2c GET against the printer's management agent
//! 2. **SpoolerProbe** - host-local spooler management endpoint, for
//!    printers attached to the same host as the agent
//!
//! A probe issues exactly one bounded query and reports every failure as a
//! [`ProbeError`] - no retries, no state. Retry policy belongs to the
//! scheduler.

pub mod snmp;
pub mod spooler;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::config::{PrinterTarget, ProtocolConfig};

pub use snmp::SnmpProbe;
pub use spooler::SpoolerProbe;

/// Raw result of one probe call: protocol-specific key/value pairs plus an
/// explicit reachability flag. The normalizer turns this into canonical
/// metrics.
#[derive(Debug, Clone, Default)]
pub struct RawSample {
    pub values: HashMap<String, String>,
    pub reachable: bool,
}

impl RawSample {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub type ProbeResult = Result<RawSample, ProbeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    /// No answer within the per-target timeout.
    Timeout,

    /// Connection refused, no route, resolution failure.
    Unreachable,

    /// Community string or credentials rejected.
    AuthRejected,

    /// The endpoint answered, but the response could not be understood.
    Malformed,

    /// The target is missing required parameters; the target is skipped.
    Config,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErrorKind::Timeout => write!(f, "timeout"),
            ProbeErrorKind::Unreachable => write!(f, "unreachable"),
            ProbeErrorKind::AuthRejected => write!(f, "auth_rejected"),
            ProbeErrorKind::Malformed => write!(f, "malformed"),
            ProbeErrorKind::Config => write!(f, "config"),
        }
    }
}

/// Error produced by a single probe call. Always recoverable from the
/// caller's perspective; the poll cycle counts it into the failure streak.
#[derive(Debug, Clone)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub detail: String,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Timeout, detail)
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Unreachable, detail)
    }

    pub fn auth_rejected(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::AuthRejected, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Malformed, detail)
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Config, detail)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probe failed ({}): {}", self.kind, self.detail)
    }
}

impl std::error::Error for ProbeError {}

/// One liveness/metrics query to one printer. Implementations must bound
/// their own network wait; a call never takes longer than the target's
/// configured timeout plus scheduling noise.
#[async_trait]
pub trait Probe: Send + Sync + fmt::Debug {
    async fn probe(&self) -> ProbeResult;
}

/// Build the probe matching a target's protocol configuration.
///
/// Returns `ProbeError::Config` for targets that cannot be probed at all
/// (missing address or protocol parameters); such targets are skipped and
/// flagged without affecting the rest of the fleet.
pub fn probe_for_target(target: &PrinterTarget) -> Result<Box<dyn Probe>, ProbeError> {
    if target.address.trim().is_empty() {
        return Err(ProbeError::config(format!(
            "printer {} has no address",
            target.id
        )));
    }

    match &target.protocol {
        ProtocolConfig::Snmp { community, port } => {
            if community.is_empty() {
                return Err(ProbeError::config(format!(
                    "printer {} has an empty SNMP community",
                    target.id
                )));
            }
            Ok(Box::new(SnmpProbe::new(
                &target.address,
                community,
                *port,
                target.timeout,
            )))
        }
        ProtocolConfig::Spooler { queue, port } => {
            if queue.trim().is_empty() {
                return Err(ProbeError::config(format!(
                    "printer {} has an empty spooler queue",
                    target.id
                )));
            }
            Ok(Box::new(SpoolerProbe::new(
                &target.address,
                queue,
                *port,
                target.timeout,
            )))
        }
    }
}
