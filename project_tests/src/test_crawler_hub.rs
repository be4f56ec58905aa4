//! # Crawler → Hub End-to-End Tests
//!
//! Wires a dashboard configuration, the HTTP fetcher, the poll cycle engine and the
//! broadcast hub together against local expvar endpoints, then reads the frames a
//! viewer would receive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;

use lib_vardash::configs::dashboard::parse_dashboard;
use lib_vardash::{Crawler, CrawlerOptions, FixedClock, HttpFetcher, Hub, HubHandle};

const FEB_3_2013: i64 = 1359849600;
const VARS: &str =
    r#"{"gauge": {"metric": 800}, "process": {"text": "text 1"}, "memstats": {"alloc": 123}}"#;

/// Serves `VARS` on `/debug/vars`, optionally after a delay.
async fn spawn_vars_server(delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/debug/vars",
        get(move || async move {
            tokio::time::sleep(delay).await;
            VARS
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn dashboard_json(fast: SocketAddr, slow: SocketAddr) -> String {
    format!(
        r#"{{
            "services": [
                {{"name": "fast", "url": "{fast}"}},
                {{"name": "slow", "url": "http://{slow}/"}}
            ],
            "rows": [
                {{"items": [
                    {{"type": "Gauge", "size": 3, "conf": {{"metric": "gauge.metric", "service": "fast", "max": 1000}}}},
                    {{"type": "Gauge", "size": 3, "conf": {{"metric": "gauge.metric", "service": "slow", "max": 1000}}}},
                    {{"type": "LineChart", "size": 6, "conf": {{"metric": "memstats.alloc", "services": ["fast", "slow"]}}}}
                ]}},
                {{"items": [
                    {{"type": "Text", "size": 6, "conf": {{"metric": "process.text", "service": "fast"}}}},
                    {{"type": "Text", "size": 6, "conf": {{"metric": "process.text", "service": "slow"}}}}
                ]}}
            ]
        }}"#
    )
}

async fn build(cycle_deadline: Duration) -> (Crawler, HubHandle, CancellationToken) {
    let fast = spawn_vars_server(Duration::ZERO).await;
    let slow = spawn_vars_server(Duration::from_secs(30)).await;
    let dashboard = parse_dashboard(&dashboard_json(fast, slow)).unwrap();

    let shutdown = CancellationToken::new();
    let (hub, handle) = Hub::new(10);
    tokio::spawn(hub.run(shutdown.clone()));

    let crawler = Crawler::new(
        CrawlerOptions {
            interval: Duration::from_millis(100),
            cycle_deadline,
        },
        Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap()),
        handle.clone(),
        dashboard.services,
        Arc::new(dashboard.widgets),
    )
    .with_clock(FixedClock(FEB_3_2013));

    (crawler, handle, shutdown)
}

#[tokio::test]
async fn stalled_service_degrades_but_cycle_publishes() {
    let (crawler, hub, shutdown) = build(Duration::from_millis(300)).await;
    let mut viewer = hub.register();

    let started = std::time::Instant::now();
    assert!(crawler.run_cycle(&shutdown).await);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "cycle returned before its deadline");
    assert!(elapsed < Duration::from_secs(3), "cycle waited for the stalled service");

    let frame = tokio::time::timeout(Duration::from_secs(1), viewer.frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        frame.as_ref(),
        concat!(
            r#"{"g":[{"i":"c1","v":0.8},{"i":"c2","v":0.0}],"#,
            r#""lc":[{"i":"c3","p":[{"time":1359849600,"y":123},{"time":1359849600,"y":0}]}],"#,
            r#""t":[{"i":"c4","v":"text 1"},{"i":"c5","v":"N/A"}]}"#
        )
    );

    shutdown.cancel();
}

#[tokio::test]
async fn every_viewer_gets_the_same_frame() {
    let (crawler, hub, shutdown) = build(Duration::from_millis(200)).await;
    let mut first = hub.register();
    let mut second = hub.register();

    crawler.run_cycle(&shutdown).await;

    let a = first.frames.recv().await.unwrap();
    let b = second.frames.recv().await.unwrap();
    assert_eq!(a, b);
    let decoded: serde_json::Value = serde_json::from_str(&a).unwrap();
    assert_eq!(decoded["g"].as_array().unwrap().len(), 2);

    shutdown.cancel();
}

#[tokio::test]
async fn running_crawler_streams_until_shutdown() {
    let (crawler, hub, shutdown) = build(Duration::from_millis(50)).await;
    let mut viewer = hub.register();

    let crawler = Arc::new(crawler);
    let task = {
        let crawler = Arc::clone(&crawler);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { crawler.run(shutdown).await })
    };

    for _ in 0..2 {
        let frame = tokio::time::timeout(Duration::from_secs(2), viewer.frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(frame.contains(r#""v":"text 1""#));
    }

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}
