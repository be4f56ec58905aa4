//! # Dashboard Page
//!
//! Renders the configured layout into a single HTML page. Each column becomes a
//! widget placeholder carrying the data the browser script needs to draw it:
//! `data-id`, `data-kind`, `data-title`, `data-legend` and `data-series`.
//! The script under `/static` then listens on `/updates` and routes envelope
//! entries by id.

use std::fmt::Write;

use lib_vardash::{Layout, WidgetRegistry};

const HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>vardash</title>
<link rel="stylesheet" href="/static/vardash.css">
</head>
<body>
<div class="dashboard">
"#;

const TAIL: &str = r#"</div>
<script src="/static/vardash.js"></script>
</body>
</html>
"#;

/// Escapes text for use in HTML element content and double-quoted attributes.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render(layout: &Layout, widgets: &WidgetRegistry) -> String {
    let mut html = String::from(HEAD);

    for row in &layout.rows {
        html.push_str("<div class=\"row\">\n");
        for col in &row.cols {
            let Some(widget) = widgets.get(&col.id) else {
                log::warn!("Layout references unknown widget {}; skipping.", col.id);
                continue;
            };
            let title = escape(&widget.title());
            let series = escape(&widget.series().join(","));
            // Writing into a String cannot fail.
            let _ = writeln!(
                html,
                "<div class=\"col col-{size}\"><div class=\"widget {kind}\" id=\"{id}\" data-id=\"{id}\" data-kind=\"{kind}\" data-title=\"{title}\" data-legend=\"{legend}\" data-series=\"{series}\"><h3>{title}</h3></div></div>",
                size = col.size,
                kind = widget.kind().as_str(),
                id = escape(col.id.as_str()),
                title = title,
                legend = widget.has_legend(),
                series = series,
            );
        }
        html.push_str("</div>\n");
    }

    html.push_str(TAIL);
    html
}
