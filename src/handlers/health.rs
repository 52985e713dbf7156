//! Health check endpoint handler.

use axum::response::IntoResponse;
use tracing::{debug, instrument};

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/cansp-dev/herakles-script-exporter — More info: https://www.herakles.now — Support: exporter@herakles.now";

/// Handler for the /-/healthy endpoint.
#[instrument]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Processing /-/healthy request");
    "Healthy"
}
