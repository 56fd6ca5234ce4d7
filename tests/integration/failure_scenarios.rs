//! Failure and chaos tests for the polling engine
//!
//! These tests verify that the engine handles failures gracefully:
//! - Unreachable printers and the failure streak
//! - Malformed responses
//! - Dispatch failures isolated per printer
//! - Misconfigured targets skipped without fleet impact

use std::sync::Arc;

use printwatch::sink::{MemoryAlertRepository, NotificationSink, BroadcastLiveChannel};
use printwatch::{AlertKind, PrinterStatus};
use wiremock::MockServer;

use crate::helpers::*;

#[tokio::test]
async fn test_failure_streak_and_single_poll_recovery() {
    let mock_server = MockServer::start().await;
    mount_queue(&mock_server, "q1", spooler_body("idle", 100, 80.0, 90.0)).await;
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(4);
    let (handle, _task) = fx.spawn_poller(spooler_target("p1", &host, port, "q1"));

    handle.poll_now().await.unwrap();
    assert_eq!(
        fx.table.snapshot("p1").await.unwrap().status,
        PrinterStatus::Online
    );

    // let the startup tick's cycle finish against the healthy endpoint
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // kill the spooler endpoint
    drop(mock_server);

    // first failure: status retained, streak counted, no alert
    assert!(handle.poll_now().await.is_err());
    let snapshot = fx.table.snapshot("p1").await.unwrap();
    assert_eq!(snapshot.status, PrinterStatus::Online);
    assert_eq!(snapshot.consecutive_failures, 1);
    assert!(fx.alerts.all().await.is_empty());

    // second failure: streak exhausted, offline with exactly one alert
    assert!(handle.poll_now().await.is_err());
    let snapshot = fx.table.snapshot("p1").await.unwrap();
    assert_eq!(snapshot.status, PrinterStatus::Offline);
    assert_eq!(snapshot.consecutive_failures, 2);

    let alerts = fx.alerts.all().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Offline);

    // staying down does not re-alert
    assert!(handle.poll_now().await.is_err());
    assert_eq!(fx.alerts.count().await, 1);

    // one successful probe is enough to recover
    let recovered_server = MockServer::start().await;
    mount_queue(&recovered_server, "q1", spooler_body("idle", 120, 80.0, 90.0)).await;
    let (new_host, new_port) = host_and_port(&recovered_server);

    handle
        .update_target(spooler_target("p1", &new_host, new_port, "q1"))
        .await
        .unwrap();
    handle.poll_now().await.unwrap();

    let snapshot = fx.table.snapshot("p1").await.unwrap();
    assert_eq!(snapshot.status, PrinterStatus::Online);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert!(snapshot.active_alerts.is_empty());
    // recovery produced a state change, not an alert
    assert_eq!(fx.alerts.count().await, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_response_counts_toward_streak() {
    let mock_server = MockServer::start().await;
    {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, ResponseTemplate};
        Mock::given(method("GET"))
            .and(path("/printers/q1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{invalid json"))
            .mount(&mock_server)
            .await;
    }
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(4);
    let (handle, _task) = fx.spawn_poller(spooler_target("p1", &host, port, "q1"));

    assert!(handle.poll_now().await.is_err());
    assert!(handle.poll_now().await.is_err());

    let snapshot = fx.table.snapshot("p1").await.unwrap();
    assert_eq!(snapshot.status, PrinterStatus::Offline);
    assert!(snapshot.consecutive_failures >= 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_device_reported_down_is_streak_gated_like_a_failed_probe() {
    let mock_server = MockServer::start().await;
    // the spooler answers, but for a printer it can no longer see
    mount_queue(&mock_server, "q1", spooler_body("offline", 100, 80.0, 90.0)).await;
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(4);
    let (handle, _task) = fx.spawn_poller(spooler_target("p1", &host, port, "q1"));

    // the probe itself succeeds, so the cycle reports no error - but the
    // device counts towards the streak and goes offline once it is exhausted
    handle.poll_now().await.unwrap();
    handle.poll_now().await.unwrap();
    handle.poll_now().await.unwrap();

    let snapshot = fx.table.snapshot("p1").await.unwrap();
    assert_eq!(snapshot.status, PrinterStatus::Offline);
    assert!(snapshot.consecutive_failures >= 2);

    let alerts = fx.alerts.all().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Offline);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dispatch_failure_for_one_printer_does_not_affect_another() {
    let mock_server = MockServer::start().await;
    mount_queue(&mock_server, "qa", spooler_body("idle", 100, 80.0, 90.0)).await;
    mount_queue(&mock_server, "qb", spooler_body("idle", 200, 80.0, 90.0)).await;
    let (host, port) = host_and_port(&mock_server);

    // state writes for pa fail, pb uses the shared repository normally
    let failing_states = Arc::new(SelectiveFailingStateRepository::new("pa"));
    let sink = Arc::new(NotificationSink::new(
        failing_states.clone(),
        Arc::new(MemoryAlertRepository::new()),
        Arc::new(BroadcastLiveChannel::new(64)),
    ));

    let fx = engine_fixture(4).with_sink(sink);
    let (handle_a, _task_a) = fx.spawn_poller(spooler_target("pa", &host, port, "qa"));
    let (handle_b, _task_b) = fx.spawn_poller(spooler_target("pb", &host, port, "qb"));

    // both cycles run concurrently; the dispatch failure is logged, not raised
    let (result_a, result_b) = tokio::join!(handle_a.poll_now(), handle_b.poll_now());
    result_a.unwrap();
    result_b.unwrap();

    // pb made it to the repository, pa did not - but pa's runtime state is intact
    assert!(failing_states.inner.get("pb").await.is_some());
    assert!(failing_states.inner.get("pa").await.is_none());
    assert_eq!(
        fx.table.snapshot("pa").await.unwrap().status,
        PrinterStatus::Online
    );

    handle_a.shutdown().await.unwrap();
    handle_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_misconfigured_target_does_not_affect_fleet() {
    let mock_server = MockServer::start().await;
    mount_queue(&mock_server, "qb", spooler_body("idle", 100, 80.0, 90.0)).await;
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(4);

    let mut broken = spooler_target("pa", &host, port, "qa");
    broken.address = String::new();

    let (handle_a, _task_a) = fx.spawn_poller(broken);
    let (handle_b, _task_b) = fx.spawn_poller(spooler_target("pb", &host, port, "qb"));

    assert!(handle_a.poll_now().await.is_err());
    handle_b.poll_now().await.unwrap();

    // the broken target never creates runtime state; the healthy one polls
    assert!(fx.table.snapshot("pa").await.is_none());
    assert_eq!(
        fx.table.snapshot("pb").await.unwrap().status,
        PrinterStatus::Online
    );

    handle_a.shutdown().await.unwrap();
    handle_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_offline_printer_keeps_staleness_visible() {
    let fx = engine_fixture(4);
    // nothing listens here
    let (handle, _task) = fx.spawn_poller(spooler_target("p1", "127.0.0.1", 47207, "q1"));

    assert!(handle.poll_now().await.is_err());
    assert!(handle.poll_now().await.is_err());

    let snapshot = fx.table.snapshot("p1").await.unwrap();
    assert_eq!(snapshot.status, PrinterStatus::Offline);
    // last_checked_at keeps moving even while failing, so dashboards can
    // derive an increasing staleness indicator instead of losing the printer
    assert!(snapshot.last_checked_at.is_some());
    assert!(snapshot.last_metrics.is_none());
    assert!(
        snapshot
            .staleness(chrono::Utc::now())
            .unwrap()
            .num_seconds()
            >= 0
    );

    handle.shutdown().await.unwrap();
}
