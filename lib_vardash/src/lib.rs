//! # lib_vardash
//!
//! The polling and broadcast engine behind the `vardash` dashboard server.
//!
//! A dashboard is a set of services exposing a JSON runtime-variables endpoint
//! (`/debug/vars` style) and a set of widgets bound to dotted metric paths inside
//! those documents. This crate turns a dashboard configuration into a live stream
//! of update frames:
//!
//! - **`configs`**: reads the dashboard file into services, a layout and a widget registry.
//! - **`retrieve`**: service endpoints and the snapshot fetcher.
//! - **`core`**: metric resolution, the widget registry, the poll cycle engine
//!   (`Crawler`) and the broadcast `Hub`.
//!
//! The HTTP/WebSocket surface lives in the `servers` crate.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod configs;
pub mod core;
pub mod retrieve;

// --- Public API Re-exports ---
pub use configs::dashboard::{load_dashboard, ConfigError, DashboardConfig, Layout};
pub use core::{
    Clock, Crawler, CrawlerOptions, CrawlerState, FixedClock, Hub, HubHandle, Metric,
    ScalarValue, Subscription, SystemClock, UpdateEnvelope, Widget, WidgetId, WidgetRegistry,
};
pub use retrieve::{FetchError, Fetcher, HttpFetcher, Service, Snapshot};
