//! Configuration display endpoint handler.
//!
//! This module provides the `/config` endpoint handler that returns the
//! active script configuration as YAML.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");

    let config = state.config.snapshot();
    match serde_yaml::to_string(config.as_ref()) {
        Ok(yaml) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            yaml,
        ),
        Err(e) => {
            error!("Failed to serialize configuration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("failed to marshal config: {}", e),
            )
        }
    }
}
