//! # Dashboard Configuration Loading Tests
//!
//! Reads dashboard files from disk and checks the services, layout and widget
//! registry they produce, plus the failures a bad file reports.

use std::io::Write;

use lib_vardash::configs::dashboard::Col;
use lib_vardash::{load_dashboard, ConfigError, Widget, WidgetId};

fn write_dashboard(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_services_layout_and_widgets() {
    let file = write_dashboard(
        r#"{
            "services": [
                {"name": "api", "url": "localhost:8080"},
                {"name": "worker", "url": "https://worker.internal:9000/metrics"}
            ],
            "rows": [
                {"items": [
                    {"type": "Gauge", "size": 4, "conf": {"metric": "memstats.HeapAlloc", "service": "api", "max": 1048576}},
                    {"type": "LineChart", "size": 8, "conf": {"metric": "memstats.NumGC", "show_legend": true}}
                ]},
                {"items": [
                    {"type": "Text", "size": 12, "conf": {"metric": "cmdline", "service": "worker"}}
                ]}
            ]
        }"#,
    );

    let dashboard = load_dashboard(file.path()).unwrap();

    let urls: Vec<String> = dashboard.services.iter().map(|s| s.endpoint.to_string()).collect();
    assert_eq!(
        urls,
        vec![
            "http://localhost:8080/debug/vars".to_string(),
            "https://worker.internal:9000/metrics".to_string(),
        ]
    );

    assert_eq!(dashboard.layout.rows.len(), 2);
    assert_eq!(
        dashboard.layout.rows[0].cols,
        vec![
            Col { id: WidgetId::from("c1"), size: 4 },
            Col { id: WidgetId::from("c2"), size: 8 },
        ]
    );
    assert_eq!(dashboard.layout.rows[1].cols[0].id, WidgetId::from("c3"));

    assert_eq!(dashboard.widgets.len(), 3);
    match dashboard.widgets.get(&WidgetId::from("c2")) {
        Some(Widget::LineChart(chart)) => {
            assert!(chart.show_legend);
            assert!(chart.services.is_empty());
            assert_eq!(chart.metric.to_string(), "memstats.NumGC");
        }
        other => panic!("expected a line chart, got {other:?}"),
    }
    match dashboard.widgets.get(&WidgetId::from("c1")) {
        Some(Widget::Gauge(gauge)) => assert_eq!(gauge.max, 1048576.0),
        other => panic!("expected a gauge, got {other:?}"),
    }
}

#[test]
fn unknown_widget_type_is_rejected() {
    let file = write_dashboard(
        r#"{"services": [], "rows": [{"items": [{"type": "PieChart", "size": 4, "conf": {"metric": "a"}}]}]}"#,
    );

    match load_dashboard(file.path()) {
        Err(ConfigError::UnknownVariant(v)) => assert_eq!(v.0, "PieChart"),
        other => panic!("expected UnknownVariant, got {other:?}"),
    }
}

#[test]
fn malformed_json_is_rejected() {
    let file = write_dashboard(r#"{"services": ["#);
    assert!(matches!(load_dashboard(file.path()), Err(ConfigError::Json(_))));
}

#[test]
fn missing_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");

    let err = load_dashboard(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("missing.json"));
}
