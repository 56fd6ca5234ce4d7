//! Host-local spooler probe.
//!
//! For printers attached to the agent's own host there is no SNMP agent to
//! ask; the print spooler exposes a small management endpoint instead. The
//! probe reads `GET /printers/{queue}` and flattens the JSON document into
//! the raw key/value sample.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{instrument, trace};

use super::{Probe, ProbeError, ProbeResult, RawSample};

/// Raw sample keys produced by this probe.
pub const KEY_STATE: &str = "spooler.state";
pub const KEY_PAGE_COUNT: &str = "spooler.page_count";
pub const KEY_TONER_PERCENT: &str = "spooler.toner_percent";
pub const KEY_PAPER_PERCENT: &str = "spooler.paper_percent";

/// Spooler state value meaning the device is gone.
pub const STATE_OFFLINE: &str = "offline";

#[derive(Debug)]
pub struct SpoolerProbe {
    client: reqwest::Client,
    url: String,
}

impl SpoolerProbe {
    pub fn new(address: &str, queue: &str, port: u16, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .expect("Failed to build HTTP client"),
            url: format!("http://{address}:{port}/printers/{queue}"),
        }
    }

    fn flatten(&self, document: &serde_json::Value) -> Result<RawSample, ProbeError> {
        let object = document
            .as_object()
            .ok_or_else(|| ProbeError::malformed(format!("{}: expected a JSON object", self.url)))?;

        let mut sample = RawSample {
            reachable: true,
            ..RawSample::default()
        };

        for (key, value) in object {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                // nested structures carry queue internals we do not consume
                _ => continue,
            };
            sample.values.insert(format!("spooler.{key}"), rendered);
        }

        Ok(sample)
    }
}

#[async_trait]
impl Probe for SpoolerProbe {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn probe(&self) -> ProbeResult {
        trace!("querying spooler");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::timeout(format!("{}: {e}", self.url))
            } else {
                ProbeError::unreachable(format!("{}: {e}", self.url))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProbeError::auth_rejected(format!(
                "{}: spooler rejected the request ({status})",
                self.url
            )));
        }
        if !status.is_success() {
            return Err(ProbeError::unreachable(format!(
                "{}: HTTP error: {status}",
                self.url
            )));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProbeError::malformed(format!("{}: {e}", self.url)))?;

        self.flatten(&document)
    }
}
