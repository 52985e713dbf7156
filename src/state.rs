//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and the configuration reload task.

use herakles_script_exporter::config::ConfigStore;
use herakles_script_exporter::discovery::DiscoveryOptions;
use herakles_script_exporter::metrics::ExporterMetrics;
use herakles_script_exporter::prober::Prober;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: ExporterMetrics,
    /// Active configuration, swapped on reload.
    pub config: Arc<ConfigStore>,
    pub prober: Arc<Prober>,
    pub discovery: DiscoveryOptions,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
