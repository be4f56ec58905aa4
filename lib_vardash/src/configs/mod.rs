//! # Configuration Modules
//!
//! Turns the dashboard file into services, layout and widget registry.

/// Dashboard file parsing and validation.
pub mod dashboard;
