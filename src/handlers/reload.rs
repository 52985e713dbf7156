//! Configuration reload endpoint handler.
//!
//! `POST /-/reload` rereads every configuration source. Other methods are
//! rejected by the router with 405.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info, instrument};

use crate::state::SharedState;

/// Handler for the /-/reload endpoint.
#[instrument(skip(state))]
pub async fn reload_handler(State(state): State<SharedState>) -> impl IntoResponse {
    info!("Reloading configuration via /-/reload");

    let store = state.config.clone();
    let result = tokio::task::spawn_blocking(move || store.reload()).await;

    match result {
        Ok(Ok(())) => (StatusCode::OK, String::new()),
        Ok(Err(e)) => {
            error!("Failed to reload configuration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to reload config: {}", e),
            )
        }
        Err(e) => {
            error!("Configuration reload task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to reload config".to_string(),
            )
        }
    }
}
