use tracing::trace;

use crate::evaluate::Thresholds;

/// Protocol used to reach a printer.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProtocolConfig {
    /// SNMP v2c query against the printer's management agent.
    Snmp {
        community: String,
        #[serde(default = "default_snmp_port")]
        port: u16,
    },

    /// Host-local spooler management endpoint, for printers attached to the
    /// same host as the agent.
    Spooler {
        /// Queue name under which the spooler knows the printer.
        queue: String,
        #[serde(default = "default_spooler_port")]
        port: u16,
    },
}

fn default_snmp_port() -> u16 {
    161
}

fn default_spooler_port() -> u16 {
    9631
}

/// One monitored printer, as handed out by the fleet registry.
///
/// The engine holds a read-only snapshot of these, refreshed on every
/// re-sync.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PrinterTarget {
    /// Opaque identifier, unique within the fleet.
    pub id: String,

    pub display: Option<String>,

    /// Network address (IP or hostname).
    pub address: String,

    pub protocol: ProtocolConfig,

    /// Polling interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub interval: u64,

    /// Per-probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PrinterTarget {
    pub fn display_name(&self) -> String {
        self.display.clone().unwrap_or_else(|| self.id.clone())
    }
}

fn default_poll_interval() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_enabled() -> bool {
    true
}

/// Engine-wide tuning, hot-reloadable on re-sync.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrent probes across the whole fleet.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Seconds between registry/policy re-syncs.
    #[serde(default = "default_resync_interval")]
    pub resync_interval: u64,

    /// Consecutive probe failures before a printer is declared offline.
    #[serde(default = "default_failure_streak")]
    pub failure_streak_threshold: u32,

    /// Minimum seconds between two emissions of the same (printer, kind).
    #[serde(default = "default_quiet_period")]
    pub alert_quiet_period_secs: u64,

    /// Seconds to wait for in-flight cycles on shutdown before abandoning.
    #[serde(default = "default_shutdown_drain")]
    pub shutdown_drain_secs: u64,

    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            resync_interval: default_resync_interval(),
            failure_streak_threshold: default_failure_streak(),
            alert_quiet_period_secs: default_quiet_period(),
            shutdown_drain_secs: default_shutdown_drain(),
            thresholds: Thresholds::default(),
        }
    }
}

impl EngineConfig {
    /// The per-cycle decision inputs pollers consume via the policy channel.
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            thresholds: self.thresholds.clone(),
            failure_streak_threshold: self.failure_streak_threshold,
            quiet_period: chrono::Duration::seconds(self.alert_quiet_period_secs as i64),
        }
    }
}

fn default_worker_pool_size() -> usize {
    16
}

fn default_resync_interval() -> u64 {
    60
}

fn default_failure_streak() -> u32 {
    2
}

fn default_quiet_period() -> u64 {
    15 * 60
}

fn default_shutdown_drain() -> u64 {
    10
}

/// Decision inputs for one poll cycle: thresholds plus hysteresis knobs.
///
/// Published on a `watch` channel by the scheduler so a re-sync updates all
/// pollers without restarting them.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub thresholds: Thresholds,
    pub failure_streak_threshold: u32,
    pub quiet_period: chrono::Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        EngineConfig::default().policy()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub printers: Option<Vec<PrinterTarget>>,

    /// Engine tuning (optional - defaults apply)
    pub engine: Option<EngineConfig>,
}

impl Config {
    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
