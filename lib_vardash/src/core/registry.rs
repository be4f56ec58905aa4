//! # Widget Registry
//!
//! The typed catalogue of configured widgets. Widgets are a closed sum type
//! (`Widget`) so that every place consuming them has to handle every variant;
//! the registry keeps one declaration-ordered list per variant, which is the
//! order updates are emitted in.
//!
//! Identifiers (`c1`, `c2`, ...) are handed out by a single counter shared across
//! variants. The registry is filled once while the dashboard configuration is
//! read, then shared read-only (behind an `Arc`) with the poll cycle engine.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::core::metric::Metric;

/// Raised when a widget kind tag is none of the known variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown widget type: {0}")]
pub struct UnknownVariant(pub String);

/// Stable widget identifier, `c` followed by a 1-based counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WidgetId(String);

impl WidgetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WidgetId {
    fn from(id: &str) -> Self {
        WidgetId(id.to_string())
    }
}

/// The discriminator used by the dashboard configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Gauge,
    LineChart,
    Text,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Gauge => "Gauge",
            WidgetKind::LineChart => "LineChart",
            WidgetKind::Text => "Text",
        }
    }
}

impl FromStr for WidgetKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Gauge" => Ok(WidgetKind::Gauge),
            "LineChart" => Ok(WidgetKind::LineChart),
            "Text" => Ok(WidgetKind::Text),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A ratio of one service's metric against a fixed maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge {
    pub id: WidgetId,
    pub metric: Metric,
    pub service: String,
    pub max: f64,
}

/// One series per service; an empty `services` list means every configured service.
#[derive(Debug, Clone, PartialEq)]
pub struct LineChart {
    pub id: WidgetId,
    pub metric: Metric,
    pub services: Vec<String>,
    pub show_legend: bool,
}

/// One service's metric rendered as a string.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub id: WidgetId,
    pub metric: Metric,
    pub service: String,
}

/// # Widget
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Gauge(Gauge),
    LineChart(LineChart),
    Text(Text),
}

impl Widget {
    pub fn id(&self) -> &WidgetId {
        match self {
            Widget::Gauge(g) => &g.id,
            Widget::LineChart(c) => &c.id,
            Widget::Text(t) => &t.id,
        }
    }

    pub fn kind(&self) -> WidgetKind {
        match self {
            Widget::Gauge(_) => WidgetKind::Gauge,
            Widget::LineChart(_) => WidgetKind::LineChart,
            Widget::Text(_) => WidgetKind::Text,
        }
    }

    pub fn metric(&self) -> &Metric {
        match self {
            Widget::Gauge(g) => &g.metric,
            Widget::LineChart(c) => &c.metric,
            Widget::Text(t) => &t.metric,
        }
    }

    /// Display title: the dotted metric path.
    pub fn title(&self) -> String {
        self.metric().to_string()
    }

    pub fn has_legend(&self) -> bool {
        match self {
            Widget::LineChart(c) => c.show_legend,
            Widget::Gauge(_) | Widget::Text(_) => false,
        }
    }

    /// Explicitly bound series (line charts only).
    pub fn series(&self) -> &[String] {
        match self {
            Widget::LineChart(c) => &c.services,
            Widget::Gauge(_) | Widget::Text(_) => &[],
        }
    }
}

/// # Widget Registry
#[derive(Debug, Default)]
pub struct WidgetRegistry {
    next_id: u32,
    gauges: Vec<Gauge>,
    line_charts: Vec<LineChart>,
    texts: Vec<Text>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next identifier. Never reuses one.
    pub fn next_id(&mut self) -> WidgetId {
        self.next_id += 1;
        WidgetId(format!("c{}", self.next_id))
    }

    /// Records a widget at the end of its variant group.
    pub fn append(&mut self, widget: Widget) {
        log::debug!("Registering {} widget {}", widget.kind().as_str(), widget.id());
        match widget {
            Widget::Gauge(g) => self.gauges.push(g),
            Widget::LineChart(c) => self.line_charts.push(c),
            Widget::Text(t) => self.texts.push(t),
        }
    }

    pub fn gauges(&self) -> &[Gauge] {
        &self.gauges
    }

    pub fn line_charts(&self) -> &[LineChart] {
        &self.line_charts
    }

    pub fn texts(&self) -> &[Text] {
        &self.texts
    }

    /// Looks a widget up by identifier, cloned out of its variant group.
    pub fn get(&self, id: &WidgetId) -> Option<Widget> {
        self.gauges
            .iter()
            .find(|g| &g.id == id)
            .map(|g| Widget::Gauge(g.clone()))
            .or_else(|| {
                self.line_charts
                    .iter()
                    .find(|c| &c.id == id)
                    .map(|c| Widget::LineChart(c.clone()))
            })
            .or_else(|| {
                self.texts
                    .iter()
                    .find(|t| &t.id == id)
                    .map(|t| Widget::Text(t.clone()))
            })
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.line_charts.len() + self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
