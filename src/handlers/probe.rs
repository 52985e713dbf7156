//! Probe endpoint handler.
//!
//! `/probe?script=<name>` runs the named scripts in order and returns the
//! probe metrics of each, followed by the script output.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use herakles_script_exporter::prober::{ProbeRequest, SCRAPE_TIMEOUT_HEADER};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Handler for the /probe endpoint.
#[instrument(skip(state, headers))]
pub async fn probe_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    debug!("Processing /probe request");

    let scrape_timeout = headers
        .get(SCRAPE_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request = Arc::new(ProbeRequest::new(query, scrape_timeout));

    let config = state.config.snapshot();
    let scripts = match state.prober.resolve_scripts(&config, &request) {
        Ok(scripts) => scripts,
        Err(e) => {
            error!(error = %e, "Rejecting probe request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let mut body = String::new();
    for script in scripts {
        let name = script.name.clone();
        let _inflight = state.metrics.track_inflight(&name);
        let start = Instant::now();

        // The probe runs on its own task so a disconnecting client does not
        // abort the script before its result reaches the cache.
        let prober = state.prober.clone();
        let probe_request = request.clone();
        let output = match tokio::spawn(async move { prober.probe(&script, &probe_request).await }).await {
            Ok(output) => output,
            Err(e) => {
                error!(script = %name, error = %e, "Probe task failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Probe failed").into_response();
            }
        };

        let elapsed = start.elapsed();
        debug!(script = %name, duration = ?elapsed, output = %output, "Script was run");
        state.metrics.observe_request(&name, elapsed.as_secs_f64());
        body.push_str(&output);
    }

    ([(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_string, test_state};
    use herakles_script_exporter::config::Script;
    use std::time::Duration;

    fn query(pairs: &[(&str, &str)]) -> Query<Vec<(String, String)>> {
        Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn sleep_script() -> Script {
        let mut script = Script::new("test", &["sleep"]);
        script.args = vec!["1".to_string()];
        script
    }

    #[tokio::test]
    async fn test_probe_success() {
        let state = test_state(vec![sleep_script()]);

        let response = probe_handler(
            State(state.clone()),
            HeaderMap::new(),
            query(&[("script", "test")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );

        let body = body_string(response).await;
        assert!(body.contains("script_success{script=\"test\"} 1\n"));
        assert!(body.contains("script_exit_code{script=\"test\"} 0\n"));
        assert!(body.contains("script_cached{script=\"test\"} 0\n"));
        assert_eq!(
            state
                .metrics
                .http_requests_total
                .with_label_values(&["test"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_script() {
        let state = test_state(vec![sleep_script()]);

        let response = probe_handler(
            State(state.clone()),
            HeaderMap::new(),
            query(&[("script", "invalid")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "Script not found");
        assert_eq!(state.metrics.script_unknown_total.get(), 1);
    }

    #[tokio::test]
    async fn test_missing_script_parameter() {
        let state = test_state(vec![sleep_script()]);

        let response = probe_handler(State(state.clone()), HeaderMap::new(), query(&[])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "'script' parameter is missing");
        assert_eq!(state.metrics.script_unknown_total.get(), 1);
    }

    #[tokio::test]
    async fn test_cached_probe() {
        let mut script = sleep_script();
        script.cache.duration = Some(10.0);
        let state = test_state(vec![script]);

        let first = body_string(
            probe_handler(State(state.clone()), HeaderMap::new(), query(&[("script", "test")])).await,
        )
        .await;
        assert!(first.contains("script_cached{script=\"test\"} 0\n"));

        let start = Instant::now();
        let second = body_string(
            probe_handler(State(state.clone()), HeaderMap::new(), query(&[("script", "test")])).await,
        )
        .await;
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(second.contains("script_success{script=\"test\"} 1\n"));
        assert!(second.contains("script_exit_code{script=\"test\"} 0\n"));
        assert!(second.contains("script_cached{script=\"test\"} 1\n"));
    }

    #[tokio::test]
    async fn test_multiple_scripts_in_order() {
        let state = test_state(vec![
            Script::new("first", &["sh", "-c", "echo first_metric 1"]),
            Script::new("second", &["sh", "-c", "echo second_metric 2"]),
        ]);

        let body = body_string(
            probe_handler(
                State(state),
                HeaderMap::new(),
                query(&[("script", "second"), ("script", "first")]),
            )
            .await,
        )
        .await;

        let second = body.find("second_metric 2").unwrap();
        let first = body.find("first_metric 1").unwrap();
        assert!(second < first);
    }

    #[tokio::test]
    async fn test_scrape_timeout_header_enforced() {
        let mut script = Script::new("slow", &["sh", "-c", "sleep 5; true"]);
        script.timeout.enforced = true;
        script.timeout.wait_delay = 0.01;
        let state = test_state(vec![script]);

        let mut headers = HeaderMap::new();
        headers.insert(SCRAPE_TIMEOUT_HEADER, "1.5".parse().unwrap());

        let start = Instant::now();
        let body = body_string(
            probe_handler(State(state), headers, query(&[("script", "slow")])).await,
        )
        .await;
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(body.contains("script_success{script=\"slow\"} 0\n"));
        assert!(body.contains("script_exit_code{script=\"slow\"} -1\n"));
    }
}
