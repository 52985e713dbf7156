//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with the configured scripts and all available endpoints.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use herakles_script_exporter::metrics::{BRANCH, BUILD_DATE, REVISION, VERSION};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Escapes text for inclusion in HTML.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    // Calculate actual uptime from service start time
    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let config = state.config.snapshot();
    let mut scripts = String::new();
    for script in &config.scripts {
        writeln!(
            scripts,
            r#"        <li><a href="/probe?script={query}">{name}</a> <code>{command}</code></li>"#,
            query = escape_html(&urlencoding::encode(&script.name)),
            name = escape_html(&script.name),
            command = escape_html(&script.command.join(" ")),
        )
        .ok();
    }
    if scripts.is_empty() {
        scripts.push_str("        <li>No scripts configured</li>\n");
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Herakles Script Exporter</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            line-height: 1.6;
        }}
        .container {{
            max-width: 900px;
            margin: 0 auto;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{
            color: #333;
            border-bottom: 3px solid #007bff;
            padding-bottom: 15px;
        }}
        .info {{
            background: #e9ecef;
            padding: 15px;
            border-radius: 4px;
            margin: 20px 0;
        }}
        .info-label {{
            font-weight: 600;
            color: #555;
        }}
        ul li {{
            margin: 8px 0;
        }}
        a {{
            color: #007bff;
            text-decoration: none;
        }}
        code {{
            background: #e9ecef;
            padding: 2px 6px;
            border-radius: 3px;
            font-family: 'Courier New', monospace;
        }}
        .footer {{
            margin-top: 40px;
            padding-top: 20px;
            border-top: 1px solid #ddd;
            color: #666;
            font-size: 0.9em;
            text-align: center;
        }}
    </style>
</head>
<body>
<div class="container">
    <h1>Herakles Script Exporter</h1>

    <div class="info">
        <div><span class="info-label">Version:</span> {version}</div>
        <div><span class="info-label">Revision:</span> {revision} ({branch})</div>
        <div><span class="info-label">Build date:</span> {build_date}</div>
        <div><span class="info-label">Uptime:</span> {uptime}</div>
    </div>

    <h2>Scripts</h2>
    <ul>
{scripts}    </ul>

    <h2>Endpoints</h2>
    <ul>
        <li><a href="/metrics">/metrics</a> exporter metrics</li>
        <li><a href="/discovery">/discovery</a> Prometheus HTTP service discovery</li>
        <li><a href="/config">/config</a> active configuration</li>
        <li><a href="/-/healthy">/-/healthy</a> health check</li>
    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = VERSION,
        revision = REVISION,
        branch = BRANCH,
        build_date = BUILD_DATE,
        uptime = uptime_str,
        scripts = scripts,
        footer = FOOTER_TEXT
    );

    Html(html)
}
