//! Effective script timeout resolution.
//!
//! The timeout comes from an explicit `timeout` query parameter or from the
//! scrape timeout header Prometheus sends with every scrape. An offset is
//! subtracted so the exporter gives up before the scraper does, and the
//! configured `max_timeout` of the script bounds whatever the request asks for.

use std::time::Duration;

use tracing::debug;

/// Header carrying the scrape timeout set by Prometheus.
pub const SCRAPE_TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";

/// Resolves the timeout in seconds for one script run (0 = no timeout).
pub fn resolve_timeout(
    query_timeout: Option<&str>,
    header_timeout: Option<&str>,
    offset: f64,
    max_timeout: f64,
) -> f64 {
    let raw = match query_timeout.filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => match header_timeout.filter(|v| !v.is_empty()) {
            Some(v) => v,
            None => return max_timeout,
        },
    };

    let requested = match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => {
            debug!(
                timeout = raw,
                "Ignoring unparsable timeout, falling back to max_timeout"
            );
            return max_timeout;
        }
    };

    let adjusted = requested - offset;
    if max_timeout > 0.0 && adjusted > max_timeout {
        max_timeout
    } else if adjusted <= 0.0 {
        0.0
    } else {
        adjusted
    }
}

/// Converts seconds to a `Duration`, saturating values too large to represent.
///
/// Negative and NaN values give `Duration::ZERO`.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
