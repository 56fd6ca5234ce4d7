//! Helper functions for integration tests

use std::sync::Arc;

use async_trait::async_trait;
use printwatch::config::{PollPolicy, PrinterTarget, ProtocolConfig};
use printwatch::actors::poller::PollerHandle;
use printwatch::sink::{
    BroadcastLiveChannel, MemoryAlertRepository, MemoryStateRepository, NotificationSink,
    PersistenceError, PersistenceResult, StateRepository,
};
use printwatch::state::{FleetStateTable, PrinterRuntimeState};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn spooler_target(id: &str, host: &str, port: u16, queue: &str) -> PrinterTarget {
    PrinterTarget {
        id: id.to_string(),
        display: Some(format!("Test {id}")),
        address: host.to_string(),
        protocol: ProtocolConfig::Spooler {
            queue: queue.to_string(),
            port,
        },
        interval: 3600,
        timeout: 2,
        enabled: true,
    }
}

pub fn spooler_body(
    state: &str,
    page_count: u64,
    toner_percent: f32,
    paper_percent: f32,
) -> serde_json::Value {
    serde_json::json!({
        "state": state,
        "page_count": page_count,
        "toner_percent": toner_percent,
        "paper_percent": paper_percent
    })
}

/// Mount a spooler endpoint for `queue` on an existing mock server.
pub async fn mount_queue(server: &MockServer, queue: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/printers/{queue}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub fn host_and_port(server: &MockServer) -> (String, u16) {
    let url = url::Url::parse(&server.uri()).unwrap();
    (url.host_str().unwrap().to_string(), url.port().unwrap())
}

/// State repository that fails writes for one specific printer, for
/// dispatch-isolation tests.
pub struct SelectiveFailingStateRepository {
    pub fail_for: String,
    pub inner: MemoryStateRepository,
}

impl SelectiveFailingStateRepository {
    pub fn new(fail_for: &str) -> Self {
        Self {
            fail_for: fail_for.to_string(),
            inner: MemoryStateRepository::new(),
        }
    }
}

#[async_trait]
impl StateRepository for SelectiveFailingStateRepository {
    async fn save_state(&self, snapshot: &PrinterRuntimeState) -> PersistenceResult<()> {
        if snapshot.printer_id == self.fail_for {
            return Err(PersistenceError::WriteFailed(format!(
                "injected failure for {}",
                self.fail_for
            )));
        }
        self.inner.save_state(snapshot).await
    }
}

/// Everything a poller needs, wired against in-memory collaborators.
pub struct EngineFixture {
    pub table: Arc<FleetStateTable>,
    pub states: Arc<MemoryStateRepository>,
    pub alerts: Arc<MemoryAlertRepository>,
    pub live: Arc<BroadcastLiveChannel>,
    pub sink: Arc<NotificationSink>,
    pub pool: Arc<Semaphore>,
    pub policy_tx: watch::Sender<PollPolicy>,
}

pub fn engine_fixture(pool_size: usize) -> EngineFixture {
    let table = Arc::new(FleetStateTable::new());
    let states = Arc::new(MemoryStateRepository::new());
    let alerts = Arc::new(MemoryAlertRepository::new());
    let live = Arc::new(BroadcastLiveChannel::new(256));
    let sink = Arc::new(NotificationSink::new(
        states.clone(),
        alerts.clone(),
        live.clone(),
    ));
    let (policy_tx, _) = watch::channel(PollPolicy::default());

    EngineFixture {
        table,
        states,
        alerts,
        live,
        sink,
        pool: Arc::new(Semaphore::new(pool_size)),
        policy_tx,
    }
}

impl EngineFixture {
    pub fn with_sink(mut self, sink: Arc<NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn spawn_poller(&self, target: PrinterTarget) -> (PollerHandle, JoinHandle<()>) {
        PollerHandle::spawn(
            target,
            self.policy_tx.subscribe(),
            self.table.clone(),
            self.sink.clone(),
            self.pool.clone(),
        )
    }
}
