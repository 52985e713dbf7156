//! Service discovery endpoint handler.
//!
//! This module provides the `/discovery` endpoint handler that returns one
//! Prometheus HTTP SD target per configured script.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use herakles_script_exporter::discovery::build_targets;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /discovery endpoint.
#[instrument(skip(state, headers))]
pub async fn discovery_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    debug!("Processing /discovery request");

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let config = state.config.snapshot();

    Json(build_targets(&config, host, &state.discovery))
}
