mod common;

use common::{build_test_context, fast_retry, spawn_server};
use std::time::Duration;
use tally_agent::{HttpTransport, ReportOutcome, Reporter, Scraper};
use tally_storage::MetricStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn two_scrapes_arrive_as_one_combined_report() {
    let ctx = build_test_context().await.unwrap();
    let server_cancel = CancellationToken::new();
    let addr = spawn_server(ctx.app.clone(), server_cancel.clone()).await;

    let transport = HttpTransport::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    let (tx, rx) = mpsc::channel(16);
    let mut scraper = Scraper::new(Vec::new(), tx, Duration::from_secs(2));
    let mut reporter = Reporter::new(
        transport,
        rx,
        fast_retry(),
        Duration::from_secs(5),
        Duration::from_secs(1),
        CancellationToken::new(),
    );

    assert!(scraper.scrape_once());
    assert!(scraper.scrape_once());

    // PollCount twice plus RandomValue, in one request.
    assert_eq!(reporter.report_once().await, ReportOutcome::Delivered(3));
    assert_eq!(reporter.report_once().await, ReportOutcome::Skipped);

    assert_eq!(ctx.store.counter("PollCount").await.unwrap(), 2);
    let random = ctx.store.gauge("RandomValue").await.unwrap();
    assert!((0.0..1.0).contains(&random));

    server_cancel.cancel();
}

#[tokio::test]
async fn reporter_gives_up_on_rejected_batch() {
    let ctx = build_test_context().await.unwrap();
    let server_cancel = CancellationToken::new();
    let addr = spawn_server(ctx.app.clone(), server_cancel.clone()).await;

    let transport = HttpTransport::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    let (tx, rx) = mpsc::channel(16);
    let mut reporter = Reporter::new(
        transport,
        rx,
        fast_retry(),
        Duration::from_secs(5),
        Duration::from_secs(1),
        CancellationToken::new(),
    );

    // A gauge with no value is rejected with 400, which is not retried.
    tx.send(
        vec![tally_common::MetricRecord {
            id: "Alloc".to_string(),
            kind: tally_common::MetricKind::Gauge,
            delta: None,
            value: None,
        }]
        .into(),
    )
    .await
    .unwrap();

    assert_eq!(reporter.report_once().await, ReportOutcome::Discarded(2));
    assert!(ctx.store.gauge("RandomValue").await.unwrap_err().is_not_found());

    server_cancel.cancel();
}

#[tokio::test]
async fn unreachable_collector_exhausts_retries() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let (tx, rx) = mpsc::channel(16);
    let mut scraper = Scraper::new(Vec::new(), tx, Duration::from_secs(2));
    let mut reporter = Reporter::new(
        transport,
        rx,
        fast_retry(),
        Duration::from_secs(5),
        Duration::from_secs(1),
        CancellationToken::new(),
    );

    scraper.scrape_once();
    assert_eq!(reporter.report_once().await, ReportOutcome::Discarded(2));
}
