//! Prometheus self-metrics of herakles-script-exporter.
//!
//! Only request-level instrumentation of the exporter lives here. The
//! per-probe metrics (`script_success`, `script_duration_seconds`, ...) are
//! rendered as text by the prober and never registered.

use prometheus::{
    Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

/// Version information baked in at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const REVISION: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};
pub const BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};
pub const BUILD_DATE: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

/// Exporter self-metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub script_unknown_total: IntCounter,
    pub http_requests_inflight: GaugeVec, // labels: script
    pub http_requests_total: IntCounterVec, // labels: script
    pub http_request_duration_seconds: HistogramVec, // labels: script
    pub build_info: GaugeVec, // labels: version, revision, branch, build_date
}

impl ExporterMetrics {
    /// Creates and registers all self-metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let script_unknown_total = IntCounter::new(
            "script_exporter_script_unknown_total",
            "Total number of unknown scripts requested by probes",
        )?;
        let http_requests_inflight = GaugeVec::new(
            Opts::new(
                "script_exporter_http_requests_inflight",
                "Number of HTTP inflight requests, partitioned by script.",
            ),
            &["script"],
        )?;
        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "script_exporter_http_requests_total",
                "Number of HTTP requests processed, partitioned by script.",
            ),
            &["script"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "script_exporter_http_request_duration_seconds",
                "Latency of HTTP requests processed, partitioned by script.",
            )
            .buckets(vec![
                0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
            ]),
            &["script"],
        )?;
        let build_info = GaugeVec::new(
            Opts::new(
                "script_exporter_build_info",
                "A metric with a constant '1' value labeled by version, revision, branch and build date.",
            ),
            &["version", "revision", "branch", "build_date"],
        )?;

        registry.register(Box::new(script_unknown_total.clone()))?;
        registry.register(Box::new(http_requests_inflight.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(build_info.clone()))?;

        build_info
            .with_label_values(&[VERSION, REVISION, BRANCH, BUILD_DATE])
            .set(1.0);

        Ok(Self {
            script_unknown_total,
            http_requests_inflight,
            http_requests_total,
            http_request_duration_seconds,
            build_info,
        })
    }

    /// Tracks one in-flight probe of `script` until the guard is dropped.
    pub fn track_inflight(&self, script: &str) -> InflightGuard {
        let gauge = self.http_requests_inflight.with_label_values(&[script]);
        gauge.inc();
        InflightGuard { gauge }
    }

    /// Records a finished probe of `script`.
    pub fn observe_request(&self, script: &str, seconds: f64) {
        self.http_requests_total.with_label_values(&[script]).inc();
        self.http_request_duration_seconds
            .with_label_values(&[script])
            .observe(seconds);
    }
}

/// Decrements the in-flight gauge on drop.
pub struct InflightGuard {
    gauge: Gauge,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
