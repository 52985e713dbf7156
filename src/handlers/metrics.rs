//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler that returns the
//! exporter's own metrics. Script metrics are served by `/probe`.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, TextEncoder};
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    debug!("Processing /metrics request");

    let families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    debug!("Metrics request completed: {} bytes", buffer.len());

    let body = String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)?;
    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    ))
}
