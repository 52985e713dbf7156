//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/probe`: Runs scripts and returns their metrics
//! - `/metrics`: Exporter self-metrics
//! - `/discovery`: Prometheus HTTP service discovery targets
//! - `/config`: Active configuration as YAML
//! - `/-/healthy`: Liveness check
//! - `/-/reload`: Configuration reload (POST)
//! - `/`: Landing page

pub mod config;
pub mod discovery;
pub mod health;
pub mod metrics;
pub mod probe;
pub mod reload;
pub mod root;

// Re-export handlers
pub use config::config_handler;
pub use discovery::discovery_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use probe::probe_handler;
pub use reload::reload_handler;
pub use root::root_handler;
