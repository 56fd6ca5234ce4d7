//! Fleet registry and configuration inputs.
//!
//! Both are read-only snapshots from the engine's point of view: the
//! scheduler re-loads them on every re-sync, which is what makes targets
//! and tuning hot-reloadable without a restart.

use async_trait::async_trait;

use crate::config::{EngineConfig, PrinterTarget, read_config_file};

/// Source of the monitored fleet.
#[async_trait]
pub trait FleetRegistry: Send + Sync {
    /// Current target snapshot, enabled and disabled alike. The scheduler
    /// decides what to do with the difference to the previous snapshot.
    async fn load_targets(&self) -> anyhow::Result<Vec<PrinterTarget>>;
}

/// Source of engine tuning and thresholds.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load_engine_config(&self) -> anyhow::Result<EngineConfig>;
}

/// Registry/config source backed by the JSON config file.
///
/// Re-reads the file on every call, so edits take effect on the next
/// re-sync.
pub struct FileRegistry {
    path: String,
}

impl FileRegistry {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl FleetRegistry for FileRegistry {
    async fn load_targets(&self) -> anyhow::Result<Vec<PrinterTarget>> {
        let config = read_config_file(&self.path)?;
        Ok(config.printers.unwrap_or_default())
    }
}

#[async_trait]
impl ConfigSource for FileRegistry {
    async fn load_engine_config(&self) -> anyhow::Result<EngineConfig> {
        let config = read_config_file(&self.path)?;
        Ok(config.engine())
    }
}
