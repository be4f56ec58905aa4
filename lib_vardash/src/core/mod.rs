//! # Core Engine Module
//!
//! The concurrency and data-flow engine of the dashboard.
//!
//! ## Core Components:
//!
//! - **`metric`**: dotted metric paths, snapshot resolution and the per-widget
//!   value rules (gauge ratio, line chart integer, text rendering).
//!
//! - **`registry`**: the closed `Widget` sum type and the `WidgetRegistry` that
//!   assigns `c1, c2, …` identifiers across all variants.
//!
//! - **`crawler`**: the poll cycle engine. Fans out one fetch per service, joins
//!   under a deadline, extracts every widget's value and publishes one envelope.
//!
//! - **`hub`**: the single-writer broadcast actor. Owns the subscriber set and
//!   evicts subscribers whose queue is full.
//!
//! The two concurrency domains (`crawler` and `hub`) only talk through the hub's
//! event channel.

/// Metric paths, resolution and value rules.
pub mod metric;
/// Widget model and registry.
pub mod registry;
/// Wire shape of the update envelope.
pub mod updates;
/// Injected time source.
pub mod clock;
/// The poll cycle engine.
pub mod crawler;
/// The broadcast hub actor.
pub mod hub;

// --- Public API Re-exports ---
pub use clock::{Clock, FixedClock, SystemClock};
pub use crawler::{Crawler, CrawlerOptions, CrawlerState};
pub use hub::{Frame, Hub, HubHandle, SubscriberId, Subscription};
pub use metric::{Metric, ScalarValue};
pub use registry::{UnknownVariant, Widget, WidgetId, WidgetKind, WidgetRegistry};
pub use updates::UpdateEnvelope;
