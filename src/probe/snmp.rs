//! SNMP v2c probe - one GET over UDP for the fixed printer OID set.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{instrument, trace};

use crate::snmp::{self, SnmpValue};

use super::{Probe, ProbeError, ProbeResult, RawSample};

/// Request ids only need to pair a response with its request, so a process
/// wide counter is enough.
static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

const MAX_RESPONSE_BYTES: usize = 4096;

#[derive(Debug)]
pub struct SnmpProbe {
    address: String,
    community: String,
    port: u16,
    timeout: Duration,
}

impl SnmpProbe {
    pub fn new(address: &str, community: &str, port: u16, timeout_secs: u64) -> Self {
        Self {
            address: address.to_string(),
            community: community.to_string(),
            port,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, ProbeError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| ProbeError::unreachable(format!("failed to bind UDP socket: {e}")))?;

        socket
            .connect(self.endpoint())
            .await
            .map_err(|e| ProbeError::unreachable(format!("{}: {e}", self.endpoint())))?;

        socket
            .send(request)
            .await
            .map_err(|e| ProbeError::unreachable(format!("{}: send failed: {e}", self.endpoint())))?;

        let mut buf = vec![0u8; MAX_RESPONSE_BYTES];
        let received = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| {
                // v2c agents silently drop requests carrying a bad community,
                // so a rejection is indistinguishable from a dead endpoint
                ProbeError::timeout(format!(
                    "{}: no response within {:?}",
                    self.endpoint(),
                    self.timeout
                ))
            })?
            .map_err(|e| ProbeError::unreachable(format!("{}: recv failed: {e}", self.endpoint())))?;

        buf.truncate(received);
        Ok(buf)
    }
}

#[async_trait]
impl Probe for SnmpProbe {
    #[instrument(skip(self), fields(endpoint = %self.endpoint()))]
    async fn probe(&self) -> ProbeResult {
        let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let request = snmp::encode_get(&self.community, request_id, snmp::PRINTER_OIDS)
            .map_err(|e| ProbeError::config(format!("failed to encode request: {e}")))?;

        let response_bytes = self.exchange(&request).await?;

        let response = snmp::decode_response(&response_bytes)
            .map_err(|e| ProbeError::malformed(format!("{}: {e}", self.endpoint())))?;

        if response.request_id != request_id as i64 {
            return Err(ProbeError::malformed(format!(
                "{}: response id {} does not match request id {request_id}",
                self.endpoint(),
                response.request_id
            )));
        }

        if response.error_status != 0 {
            return Err(ProbeError::malformed(format!(
                "{}: agent reported error status {} at index {}",
                self.endpoint(),
                response.error_status,
                response.error_index
            )));
        }

        let mut sample = RawSample {
            reachable: true,
            ..RawSample::default()
        };

        for (oid, value) in &response.varbinds {
            // noSuchObject and friends stay out of the sample entirely, so
            // the normalizer sees them as absent rather than zero
            if matches!(value, SnmpValue::Absent | SnmpValue::Null) {
                continue;
            }
            if let Some(text) = value.as_text() {
                sample.values.insert(oid.clone(), text);
            }
        }

        trace!("collected {} varbinds", sample.values.len());

        Ok(sample)
    }
}
