//! # Data Retrieval Module
//!
//! Everything needed to get a runtime-variables document off a remote process:
//!
//! - **`service`**: the named endpoint a dashboard polls, plus URL normalization.
//! - **`expvars`**: the `Snapshot` document, the `Fetcher` seam used by the poll
//!   cycle engine and its `reqwest`-backed implementation, `HttpFetcher`.
//!
//! Every failure mode of a fetch is folded into `FetchError`; callers treat all of
//! them the same way (no usable snapshot for that source this cycle).

/// The named endpoint of a polled process.
pub mod service;
/// Snapshot documents and the fetcher seam.
pub mod expvars;

// --- Public API Re-exports ---
pub use expvars::{FetchError, Fetcher, HttpFetcher, Snapshot};
pub use service::{parse_url, Service};
