//! Herakles Script Exporter Library
//!
//! Runs configured scripts on demand and re-serves their output as Prometheus
//! metrics. The library holds everything that does not depend on the HTTP
//! server: configuration loading, the probe pipeline, service discovery and
//! the exporter's self-metrics.
//!
//! # Usage
//!
//! ```rust,no_run
//! use herakles_script_exporter::config::{Config, Script};
//! use herakles_script_exporter::prober::{ProbeOptions, ProbeRequest, Prober, ResultCache};
//! use prometheus::IntCounter;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     scripts: vec![Script::new("uptime", &["sh", "-c", "echo uptime_ok 1"])],
//! };
//! let unknown = IntCounter::new("script_exporter_script_unknown_total", "Unknown scripts")?;
//! let prober = Prober::new(Arc::new(ResultCache::new()), ProbeOptions::default(), unknown);
//!
//! let request = ProbeRequest::new(vec![("script".into(), "uptime".into())], None);
//! for script in prober.resolve_scripts(&config, &request)? {
//!     print!("{}", prober.probe(&script, &request).await);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod exposition;
pub mod metrics;
pub mod prober;

// Re-export main types for convenience
pub use config::{Config, ConfigError, ConfigStore, Script};
pub use discovery::{build_targets, DiscoveryOptions, Target};
pub use metrics::ExporterMetrics;
pub use prober::{ProbeError, ProbeOptions, ProbeRequest, Prober, ResultCache, ScriptResult};
