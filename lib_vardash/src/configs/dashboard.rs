//! # Dashboard Configuration
//!
//! Reads the dashboard file into the three things the rest of the system needs:
//! the polled `Service`s, the page `Layout` and the `WidgetRegistry`.
//!
//! ```json
//! {
//!   "services": [{"name": "api", "url": "localhost:8080"}],
//!   "rows": [
//!     {"items": [
//!       {"type": "Gauge", "size": 4, "conf": {"metric": "memstats.alloc", "service": "api", "max": 1e9}},
//!       {"type": "LineChart", "size": 8, "conf": {"metric": "memstats.num_gc", "show_legend": false}}
//!     ]}
//!   ]
//! }
//! ```
//!
//! Every problem found here is fatal at startup: the engine never starts on a
//! configuration it cannot fully interpret.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::metric::Metric;
use crate::core::registry::{
    Gauge, LineChart, Text, UnknownVariant, Widget, WidgetId, WidgetKind, WidgetRegistry,
};
use crate::retrieve::Service;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read dashboard configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse dashboard configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL for service '{name}': {source}")]
    InvalidUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },

    #[error("service '{0}' is declared more than once")]
    DuplicateService(String),

    #[error("missing configuration for: {0}")]
    MissingConf(String),

    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),

    #[error("invalid {kind} configuration: {source}")]
    InvalidWidget {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} widget has an empty metric")]
    EmptyMetric { kind: &'static str },

    #[error("{kind} widget on '{metric}' is not bound to a service")]
    MissingService { kind: &'static str, metric: String },

    #[error("Gauge widget on '{metric}' needs a positive max, got {max}")]
    InvalidMax { metric: String, max: f64 },
}

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub services: Vec<RawService>,
    #[serde(default)]
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Deserialize)]
pub struct RawService {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
pub struct RawItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u32,
    pub conf: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GaugeConf {
    metric: String,
    service: Option<String>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LineChartConf {
    metric: String,
    #[serde(default)]
    services: Vec<String>,
    show_legend: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TextConf {
    metric: String,
    service: Option<String>,
}

/// Page layout: rows of sized columns, each column holding one widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Layout {
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    pub cols: Vec<Col>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Col {
    pub id: WidgetId,
    pub size: u32,
}

/// # Dashboard Configuration
#[derive(Debug)]
pub struct DashboardConfig {
    pub services: Vec<Service>,
    pub layout: Layout,
    pub widgets: WidgetRegistry,
}

/// Reads and interprets a dashboard file.
pub fn load_dashboard(path: &Path) -> Result<DashboardConfig, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_dashboard(&data)
}

/// Interprets the JSON text of a dashboard file.
pub fn parse_dashboard(data: &str) -> Result<DashboardConfig, ConfigError> {
    let raw: RawConfig = serde_json::from_str(data)?;
    raw.parse()
}

impl RawConfig {
    pub fn parse(self) -> Result<DashboardConfig, ConfigError> {
        let mut services = Vec::with_capacity(self.services.len());
        let mut names = HashSet::new();
        for raw in self.services {
            if !names.insert(raw.name.clone()) {
                return Err(ConfigError::DuplicateService(raw.name));
            }
            let service = Service::new(raw.name.as_str(), &raw.url).map_err(|source| {
                ConfigError::InvalidUrl {
                    name: raw.name.clone(),
                    source,
                }
            })?;
            services.push(service);
        }

        let mut widgets = WidgetRegistry::new();
        let mut layout = Layout::default();

        for row in self.rows {
            let mut cols = Vec::with_capacity(row.items.len());
            for item in row.items {
                let kind: WidgetKind = item.kind.parse()?;
                let conf = item
                    .conf
                    .ok_or_else(|| ConfigError::MissingConf(item.kind.clone()))?;
                let widget = read_widget(kind, conf, widgets.next_id())?;
                warn_unknown_services(&widget, &names);

                cols.push(Col {
                    id: widget.id().clone(),
                    size: item.size,
                });
                widgets.append(widget);
            }
            layout.rows.push(Row { cols });
        }

        log::info!(
            "Dashboard loaded: {} services, {} widgets in {} rows.",
            services.len(),
            widgets.len(),
            layout.rows.len()
        );

        Ok(DashboardConfig {
            services,
            layout,
            widgets,
        })
    }
}

fn decode<T: DeserializeOwned>(kind: WidgetKind, conf: Value) -> Result<T, ConfigError> {
    serde_json::from_value(conf).map_err(|source| ConfigError::InvalidWidget {
        kind: kind.as_str(),
        source,
    })
}

fn read_metric(kind: WidgetKind, name: &str) -> Result<Metric, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyMetric {
            kind: kind.as_str(),
        });
    }
    Ok(Metric::new(name))
}

fn required_service(
    kind: WidgetKind,
    metric: &Metric,
    service: Option<String>,
) -> Result<String, ConfigError> {
    service
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingService {
            kind: kind.as_str(),
            metric: metric.to_string(),
        })
}

fn read_widget(kind: WidgetKind, conf: Value, id: WidgetId) -> Result<Widget, ConfigError> {
    match kind {
        WidgetKind::Gauge => {
            let c: GaugeConf = decode(kind, conf)?;
            let metric = read_metric(kind, &c.metric)?;
            let service = required_service(kind, &metric, c.service)?;
            let max = c.max.unwrap_or(0.0);
            if !(max > 0.0) || !max.is_finite() {
                return Err(ConfigError::InvalidMax {
                    metric: metric.to_string(),
                    max,
                });
            }
            Ok(Widget::Gauge(Gauge {
                id,
                metric,
                service,
                max,
            }))
        }
        WidgetKind::LineChart => {
            let c: LineChartConf = decode(kind, conf)?;
            Ok(Widget::LineChart(LineChart {
                id,
                metric: read_metric(kind, &c.metric)?,
                services: c.services,
                show_legend: c.show_legend.unwrap_or(true),
            }))
        }
        WidgetKind::Text => {
            let c: TextConf = decode(kind, conf)?;
            let metric = read_metric(kind, &c.metric)?;
            let service = required_service(kind, &metric, c.service)?;
            Ok(Widget::Text(Text {
                id,
                metric,
                service,
            }))
        }
    }
}

fn warn_unknown_services(widget: &Widget, known: &HashSet<String>) {
    let bound: Vec<&String> = match widget {
        Widget::Gauge(g) => vec![&g.service],
        Widget::Text(t) => vec![&t.service],
        Widget::LineChart(c) => c.services.iter().collect(),
    };
    for name in bound.into_iter().filter(|n| !known.contains(*n)) {
        log::warn!(
            "Widget {} is bound to unknown service '{}'; it will show fallback values.",
            widget.id(),
            name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DASHBOARD: &str = r#"{
        "services": [
            {"name": "service1", "url": "localhost:1234"},
            {"name": "service2", "url": "http://localhost:5678/vars"}
        ],
        "rows": [
            {"items": [
                {"type": "Text", "size": 4, "conf": {"metric": "process.text", "service": "service1"}},
                {"type": "Gauge", "size": 8, "conf": {"metric": "gauge.metric", "service": "service2", "max": 1000}}
            ]},
            {"items": [
                {"type": "LineChart", "size": 12, "conf": {"metric": "memstats.alloc", "services": ["service2"], "show_legend": false}},
                {"type": "LineChart", "size": 6, "conf": {"metric": "memstats.num_gc"}}
            ]}
        ]
    }"#;

    fn parse_err(data: &str) -> ConfigError {
        parse_dashboard(data).unwrap_err()
    }

    #[test]
    fn parses_services_layout_and_widgets() {
        let config = parse_dashboard(DASHBOARD).unwrap();

        assert_eq!(config.services.len(), 2);
        assert_eq!(
            config.services[0].endpoint.as_str(),
            "http://localhost:1234/debug/vars"
        );
        assert_eq!(config.services[1].endpoint.as_str(), "http://localhost:5678/vars");

        let cols: Vec<Vec<(String, u32)>> = config
            .layout
            .rows
            .iter()
            .map(|r| r.cols.iter().map(|c| (c.id.to_string(), c.size)).collect())
            .collect();
        assert_eq!(
            cols,
            vec![
                vec![("c1".to_string(), 4), ("c2".to_string(), 8)],
                vec![("c3".to_string(), 12), ("c4".to_string(), 6)],
            ]
        );

        let widgets = &config.widgets;
        assert_eq!(widgets.texts()[0].id.as_str(), "c1");
        assert_eq!(widgets.gauges()[0].max, 1000.0);
        assert_eq!(widgets.gauges()[0].service, "service2");
        assert_eq!(widgets.line_charts()[0].services, vec!["service2".to_string()]);
        assert!(!widgets.line_charts()[0].show_legend);
        assert!(widgets.line_charts()[1].show_legend);
        assert!(widgets.line_charts()[1].services.is_empty());
    }

    #[test]
    fn unknown_widget_type() {
        let err = parse_err(r#"{"rows": [{"items": [{"type": "Pie", "conf": {"metric": "a"}}]}]}"#);
        assert!(matches!(err, ConfigError::UnknownVariant(UnknownVariant(ref k)) if k == "Pie"));
    }

    #[test]
    fn missing_conf() {
        let err = parse_err(r#"{"rows": [{"items": [{"type": "Text"}]}]}"#);
        assert_eq!(err.to_string(), "missing configuration for: Text");
    }

    #[test]
    fn gauge_and_text_need_a_service() {
        let err = parse_err(
            r#"{"rows": [{"items": [{"type": "Gauge", "conf": {"metric": "a.b", "max": 10}}]}]}"#,
        );
        assert!(matches!(err, ConfigError::MissingService { kind: "Gauge", .. }));

        let err = parse_err(r#"{"rows": [{"items": [{"type": "Text", "conf": {"metric": "a.b"}}]}]}"#);
        assert!(matches!(err, ConfigError::MissingService { kind: "Text", .. }));
    }

    #[test]
    fn gauge_max_must_be_positive() {
        for conf in [
            r#"{"metric": "a", "service": "s"}"#,
            r#"{"metric": "a", "service": "s", "max": 0}"#,
            r#"{"metric": "a", "service": "s", "max": -5}"#,
        ] {
            let data = format!(r#"{{"rows": [{{"items": [{{"type": "Gauge", "conf": {}}}]}}]}}"#, conf);
            assert!(matches!(parse_err(&data), ConfigError::InvalidMax { .. }), "{}", conf);
        }
    }

    #[test]
    fn empty_metric_is_rejected() {
        let err = parse_err(r#"{"rows": [{"items": [{"type": "LineChart", "conf": {"metric": ""}}]}]}"#);
        assert!(matches!(err, ConfigError::EmptyMetric { kind: "LineChart" }));
    }

    #[test]
    fn bad_service_url() {
        let err = parse_err(r#"{"services": [{"name": "bad", "url": "http://^"}]}"#);
        assert!(matches!(err, ConfigError::InvalidUrl { ref name, .. } if name == "bad"));
    }

    #[test]
    fn duplicate_service_names() {
        let err = parse_err(
            r#"{"services": [{"name": "a", "url": "h1"}, {"name": "a", "url": "h2"}]}"#,
        );
        assert!(matches!(err, ConfigError::DuplicateService(ref n) if n == "a"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DASHBOARD.as_bytes()).unwrap();

        let config = load_dashboard(file.path()).unwrap();
        assert_eq!(config.widgets.len(), 4);
    }

    #[test]
    fn load_missing_file() {
        let err = load_dashboard(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
