//! # HTTP Fetcher Integration Tests
//!
//! Runs `HttpFetcher` against a local axum server that behaves like a service's
//! runtime-variables endpoint, including the slow and broken cases.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};

use lib_vardash::{FetchError, Fetcher, HttpFetcher, Metric, ScalarValue, Service};

const VARS: &str = r#"{
    "cmdline": ["/usr/bin/api", "-p", "8080"],
    "memstats": {"Alloc": 4194304, "PauseTotalNs": 1.5e9, "EnableGC": true},
    "version": "1.4.2"
}"#;

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/debug/vars", get(|| async { VARS }))
        .route("/custom/vars", get(|| async { r#"{"hits": 7}"# }))
        .route("/broken", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
        .route("/truncated", get(|| async { r#"{"memstats": {"# }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
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

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_millis(300)).unwrap()
}

#[tokio::test]
async fn default_path_snapshot_resolves_metrics() {
    let addr = spawn_server().await;
    let service = Service::new("api", &addr.to_string()).unwrap();
    assert_eq!(service.endpoint.path(), "/debug/vars");

    let snapshot = fetcher().fetch(&service.endpoint).await.unwrap();

    assert_eq!(
        snapshot.resolve(&Metric::new("memstats.Alloc")),
        Some(ScalarValue::Integer(4194304))
    );
    assert_eq!(
        snapshot.resolve(&Metric::new("memstats.PauseTotalNs")),
        Some(ScalarValue::Float(1.5e9))
    );
    assert_eq!(
        snapshot.resolve(&Metric::new("memstats.EnableGC")),
        Some(ScalarValue::Boolean(true))
    );
    assert_eq!(
        snapshot.resolve(&Metric::new("version")),
        Some(ScalarValue::String("1.4.2"))
    );
    assert_eq!(snapshot.resolve(&Metric::new("cmdline")), Some(ScalarValue::Unsupported));
    assert_eq!(snapshot.resolve(&Metric::new("memstats.Missing")), None);
}

#[tokio::test]
async fn explicit_path_is_kept() {
    let addr = spawn_server().await;
    let service = Service::new("custom", &format!("http://{addr}/custom/vars")).unwrap();

    let snapshot = fetcher().fetch(&service.endpoint).await.unwrap();
    assert_eq!(snapshot.resolve(&Metric::new("hits")), Some(ScalarValue::Integer(7)));
}

#[tokio::test]
async fn server_error_is_a_status_failure() {
    let addr = spawn_server().await;
    let url = url::Url::parse(&format!("http://{addr}/broken")).unwrap();

    match fetcher().fetch(&url).await {
        Err(FetchError::Status { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn truncated_body_is_a_parse_failure() {
    let addr = spawn_server().await;
    let url = url::Url::parse(&format!("http://{addr}/truncated")).unwrap();

    assert!(matches!(fetcher().fetch(&url).await, Err(FetchError::Parse(_))));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let addr = spawn_server().await;
    let url = url::Url::parse(&format!("http://{addr}/slow")).unwrap();

    let err = fetcher().fetch(&url).await.unwrap_err();
    assert!(err.is_timeout(), "expected a timeout, got {err:?}");
}

#[tokio::test]
async fn unreachable_service_is_a_request_failure() {
    // Bind and drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = url::Url::parse(&format!("http://{addr}/debug/vars")).unwrap();

    assert!(matches!(fetcher().fetch(&url).await, Err(FetchError::Request { .. })));
}
