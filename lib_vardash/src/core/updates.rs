//! Wire shape of the per-cycle update envelope.
//!
//! ```text
//! {"g":[{"i":"c1","v":0.8}],
//!  "lc":[{"i":"c2","p":[{"time":1359849600,"y":123}]}],
//!  "t":[{"i":"c3","v":"text 1"}]}
//! ```
//!
//! All three arrays are always present, possibly empty.

use serde::Serialize;

use crate::core::registry::WidgetId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeUpdate {
    #[serde(rename = "i")]
    pub id: WidgetId,
    #[serde(rename = "v")]
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinePoint {
    pub time: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineChartUpdate {
    #[serde(rename = "i")]
    pub id: WidgetId,
    #[serde(rename = "p")]
    pub points: Vec<LinePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextUpdate {
    #[serde(rename = "i")]
    pub id: WidgetId,
    #[serde(rename = "v")]
    pub value: String,
}

/// Everything computed in one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateEnvelope {
    #[serde(rename = "g")]
    pub gauges: Vec<GaugeUpdate>,
    #[serde(rename = "lc")]
    pub line_charts: Vec<LineChartUpdate>,
    #[serde(rename = "t")]
    pub texts: Vec<TextUpdate>,
}

impl UpdateEnvelope {
    /// Serializes the envelope into the text frame pushed to subscribers.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
