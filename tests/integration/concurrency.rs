//! Concurrency tests for the worker pool and per-printer ordering
//!
//! These tests verify the resource model:
//! - The semaphore bounds concurrent probes fleet-wide
//! - Cycles for a single printer never overlap
//! - Readers are not blocked by another printer's slow cycle

use std::time::{Duration, Instant};

use printwatch::PrinterStatus;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn mount_slow_queue(server: &MockServer, queue: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("/printers/{queue}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(spooler_body("idle", 100, 80.0, 90.0))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pool_of_one_serializes_probes() {
    let mock_server = MockServer::start().await;
    let delay = Duration::from_millis(400);
    mount_slow_queue(&mock_server, "qa", delay).await;
    mount_slow_queue(&mock_server, "qb", delay).await;
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(1);
    let (handle_a, _ta) = fx.spawn_poller(spooler_target("pa", &host, port, "qa"));
    let (handle_b, _tb) = fx.spawn_poller(spooler_target("pb", &host, port, "qb"));

    // let the two startup cycles drain through the single slot
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let start = Instant::now();
    let (ra, rb) = tokio::join!(handle_a.poll_now(), handle_b.poll_now());
    ra.unwrap();
    rb.unwrap();
    let elapsed = start.elapsed();

    // two 400ms probes through one slot cannot finish in parallel time
    assert!(
        elapsed >= Duration::from_millis(700),
        "pool of 1 must serialize: took {elapsed:?}"
    );

    handle_a.shutdown().await.unwrap();
    handle_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pool_of_two_probes_in_parallel() {
    let mock_server = MockServer::start().await;
    let delay = Duration::from_millis(400);
    mount_slow_queue(&mock_server, "qa", delay).await;
    mount_slow_queue(&mock_server, "qb", delay).await;
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(2);
    let (handle_a, _ta) = fx.spawn_poller(spooler_target("pa", &host, port, "qa"));
    let (handle_b, _tb) = fx.spawn_poller(spooler_target("pb", &host, port, "qb"));

    tokio::time::sleep(Duration::from_millis(1000)).await;

    let start = Instant::now();
    let (ra, rb) = tokio::join!(handle_a.poll_now(), handle_b.poll_now());
    ra.unwrap();
    rb.unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_millis(700),
        "pool of 2 should run both probes concurrently: took {elapsed:?}"
    );

    handle_a.shutdown().await.unwrap();
    handle_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cycles_for_one_printer_never_overlap() {
    let mock_server = MockServer::start().await;
    let delay = Duration::from_millis(400);
    mount_slow_queue(&mock_server, "q1", delay).await;
    let (host, port) = host_and_port(&mock_server);

    // plenty of pool capacity - the per-printer ordering must come from the
    // actor itself, not the semaphore
    let fx = engine_fixture(8);
    let (handle, _task) = fx.spawn_poller(spooler_target("p1", &host, port, "q1"));

    tokio::time::sleep(Duration::from_millis(600)).await;

    let start = Instant::now();
    let (r1, r2) = tokio::join!(handle.poll_now(), handle.poll_now());
    r1.unwrap();
    r2.unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(700),
        "two cycles for one printer must serialize: took {elapsed:?}"
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_printer_does_not_block_readers_of_another() {
    let mock_server = MockServer::start().await;
    mount_slow_queue(&mock_server, "slow", Duration::from_millis(800)).await;
    mount_queue(&mock_server, "fast", spooler_body("idle", 100, 80.0, 90.0)).await;
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(8);
    let (handle_slow, _ts) = fx.spawn_poller(spooler_target("pslow", &host, port, "slow"));
    let (handle_fast, _tf) = fx.spawn_poller(spooler_target("pfast", &host, port, "fast"));

    handle_fast.poll_now().await.unwrap();

    // kick off a slow cycle and read the other printer's state while it runs
    let slow_poll = tokio::spawn(async move { handle_slow.poll_now().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let read = tokio::time::timeout(Duration::from_millis(100), fx.table.snapshot("pfast"))
        .await
        .expect("snapshot read must not block on another printer's cycle")
        .unwrap();
    assert_eq!(read.status, PrinterStatus::Online);

    slow_poll.await.unwrap().unwrap();
    handle_fast.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_saturated_pool_still_completes_every_cycle() {
    let mock_server = MockServer::start().await;
    let delay = Duration::from_millis(100);
    for queue in ["q1", "q2", "q3", "q4", "q5"] {
        mount_slow_queue(&mock_server, queue, delay).await;
    }
    let (host, port) = host_and_port(&mock_server);

    let fx = engine_fixture(2);
    let mut handles = vec![];
    for (index, queue) in ["q1", "q2", "q3", "q4", "q5"].iter().enumerate() {
        let (handle, _task) =
            fx.spawn_poller(spooler_target(&format!("p{index}"), &host, port, queue));
        handles.push(handle);
    }

    let mut polls = vec![];
    for handle in &handles {
        let h = handle.clone();
        polls.push(tokio::spawn(async move { h.poll_now().await }));
    }

    for poll in polls {
        poll.await.unwrap().unwrap();
    }

    for index in 0..5 {
        assert_eq!(
            fx.table
                .snapshot(&format!("p{index}"))
                .await
                .unwrap()
                .status,
            PrinterStatus::Online
        );
    }

    for handle in handles {
        handle.shutdown().await.unwrap();
    }
}
