//! # Metric Paths and Resolution
//!
//! A `Metric` is a dotted path into a snapshot document (`"memstats.alloc"`).
//! Resolution walks the document one object field at a time and classifies the
//! leaf it lands on. Absence is a normal outcome (`None`), not an error.
//!
//! The per-widget value rules built on top of resolution are defined here too, so
//! that every fallback (`0.0`, `0`, `"N/A"`) lives in one place.

use std::fmt;

use serde_json::{Number, Value};

use crate::retrieve::Snapshot;

/// Text shown for a metric that cannot be read.
pub const NOT_AVAILABLE: &str = "N/A";

/// # Metric
///
/// An immutable dotted path. Two metrics are equal when their paths are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metric {
    path: Vec<String>,
}

impl Metric {
    pub fn new(name: &str) -> Self {
        Self {
            path: name.split('.').map(str::to_string).collect(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("."))
    }
}

/// The classified leaf a metric path resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue<'a> {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(&'a str),
    /// Arrays, objects and `null` at the terminal segment.
    Unsupported,
}

impl<'a> ScalarValue<'a> {
    fn classify(value: &'a Value) -> Self {
        match value {
            Value::Number(n) => classify_number(n),
            Value::Bool(b) => ScalarValue::Boolean(*b),
            Value::String(s) => ScalarValue::String(s),
            Value::Null | Value::Array(_) | Value::Object(_) => ScalarValue::Unsupported,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Integer(_) => "integer",
            ScalarValue::Float(_) => "float",
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::String(_) => "string",
            ScalarValue::Unsupported => "unsupported value",
        }
    }
}

// serde_json keeps the literal form: `800` parses as an integer, `800.0` and
// `8e2` as floats. Integers beyond i64 degrade to Float.
fn classify_number(n: &Number) -> ScalarValue<'static> {
    if let Some(i) = n.as_i64() {
        ScalarValue::Integer(i)
    } else {
        ScalarValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Walks `metric` through nested objects of `snapshot`.
///
/// Returns `None` if any segment is missing or an intermediate value is not an object.
pub fn resolve<'a>(snapshot: &'a Snapshot, metric: &Metric) -> Option<ScalarValue<'a>> {
    let (first, rest) = metric.path.split_first()?;
    let mut current = snapshot.as_map().get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(ScalarValue::classify(current))
}

/// Gauge value: `numeric / max`, or `0.0` when the metric is missing or not numeric.
pub fn gauge_value(metric: &Metric, max: f64, snapshot: Option<&Snapshot>) -> f64 {
    match snapshot.and_then(|s| s.resolve(metric)) {
        Some(ScalarValue::Integer(i)) => i as f64 / max,
        Some(ScalarValue::Float(f)) => f / max,
        Some(other) => {
            log::warn!("Gauge metric '{}' is a {}, expected a number", metric, other.kind());
            0.0
        }
        None => {
            log::debug!("Gauge metric '{}' not available", metric);
            0.0
        }
    }
}

/// Line chart point: integers only, `0` otherwise.
pub fn line_chart_value(metric: &Metric, snapshot: Option<&Snapshot>) -> i64 {
    match snapshot.and_then(|s| s.resolve(metric)) {
        Some(ScalarValue::Integer(i)) => i,
        Some(other) => {
            log::warn!("Line chart metric '{}' is a {}, expected an integer", metric, other.kind());
            0
        }
        None => {
            log::debug!("Line chart metric '{}' not available", metric);
            0
        }
    }
}

/// Text value: the scalar rendered as a string, `"N/A"` when it can't be read.
pub fn text_value(metric: &Metric, snapshot: Option<&Snapshot>) -> String {
    match snapshot.and_then(|s| s.resolve(metric)) {
        Some(ScalarValue::Integer(i)) => i.to_string(),
        Some(ScalarValue::Float(f)) => format!("{:.2}", f),
        Some(ScalarValue::Boolean(b)) => b.to_string(),
        Some(ScalarValue::String(s)) => s.to_string(),
        Some(ScalarValue::Unsupported) => {
            log::warn!("Text metric '{}' is not a scalar", metric);
            NOT_AVAILABLE.to_string()
        }
        None => {
            log::debug!("Text metric '{}' not available", metric);
            NOT_AVAILABLE.to_string()
        }
    }
}
