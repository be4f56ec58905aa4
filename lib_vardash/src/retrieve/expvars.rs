//! # Runtime Variables Retrieval
//!
//! Fetches a process variables dump over HTTP and validates it into a `Snapshot`.
//!
//! The `Fetcher` trait is the seam between the poll cycle engine and the network:
//! the engine only ever sees `Result<Snapshot, FetchError>`, which keeps it
//! testable with in-memory fetchers. `HttpFetcher` is the production
//! implementation, a thin wrapper around a pooled `reqwest::Client` whose request
//! timeout should stay below the engine's per-cycle deadline.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::core::metric::{resolve, Metric, ScalarValue};

/// Errors produced while fetching a snapshot. All of them mean the same thing
/// to the engine: no usable snapshot for that source this cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure or client-side timeout.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-2xx status.
    #[error("could not fetch variables from {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body was not a JSON object.
    #[error("malformed variables document: {0}")]
    Parse(String),

    /// The cycle that issued the fetch gave up on it.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// True when the underlying request hit the client timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Request { source, .. } if source.is_timeout())
    }
}

/// # Snapshot
///
/// One source's point-in-time variables dump. Always a JSON object at the top level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot(Map<String, Value>);

impl Snapshot {
    /// Parses raw bytes into a snapshot.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FetchError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        Self::try_from(value)
    }

    /// Resolves a metric path against this document.
    pub fn resolve(&self, metric: &Metric) -> Option<ScalarValue<'_>> {
        resolve(self, metric)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for Snapshot {
    type Error = FetchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Snapshot(map)),
            other => Err(FetchError::Parse(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// # Fetcher
///
/// Retrieves a snapshot from a service endpoint. Implementations must bound their
/// own running time; the engine additionally drops the future when its cycle ends.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, endpoint: &Url) -> Result<Snapshot, FetchError>;
}

/// # HTTP Fetcher
///
/// `GET`s the endpoint and parses the body. The `reqwest::Client` is reused across
/// all services and cycles to benefit from connection pooling.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vardash/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, endpoint: &Url) -> Result<Snapshot, FetchError> {
        let request_error = |source| FetchError::Request {
            url: endpoint.to_string(),
            source,
        };

        let response = self
            .client
            .get(endpoint.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        Snapshot::from_slice(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use serde_json::json;
    use std::net::SocketAddr;

    const VARS: &str =
        r#"{"gauge": {"metric": 800}, "process": {"text": "text 1"}, "memstats": {"alloc": 123}}"#;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn vars_url(addr: SocketAddr) -> Url {
        Url::parse(&format!("http://{}/debug/vars", addr)).unwrap()
    }

    #[tokio::test]
    async fn fetch_success() {
        let addr = serve(Router::new().route("/debug/vars", get(|| async { VARS }))).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();

        let snapshot = fetcher.fetch(&vars_url(addr)).await.unwrap();
        let expected = Snapshot::try_from(serde_json::from_str::<Value>(VARS).unwrap()).unwrap();
        assert_eq!(snapshot, expected);
    }

    #[tokio::test]
    async fn fetch_bad_status() {
        let app = Router::new().route(
            "/debug/vars",
            get(|| async { (StatusCode::BAD_GATEWAY, "ERROR") }),
        );
        let addr = serve(app).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();

        match fetcher.fetch(&vars_url(addr)).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 502),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetch_malformed_body() {
        let addr = serve(Router::new().route("/debug/vars", get(|| async { "{" }))).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();

        let err = fetcher.fetch(&vars_url(addr)).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn fetch_timeout() {
        let app = Router::new().route(
            "/debug/vars",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                VARS
            }),
        );
        let addr = serve(app).await;
        let fetcher = HttpFetcher::new(Duration::from_millis(20)).unwrap();

        let err = fetcher.fetch(&vars_url(addr)).await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    }

    #[test]
    fn non_object_document_is_rejected() {
        let err = Snapshot::try_from(json!([1, 2, 3])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed variables document: expected a JSON object, got an array"
        );
    }
}
