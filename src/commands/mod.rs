//! CLI command implementations for herakles-script-exporter.
//!
//! This module provides implementations for all CLI subcommands and flags
//! that do not start the server:
//! - `scripts`: Script listing
//! - `probe`: Single probe run
//! - `--show-config` / `--check-config`: Configuration output and validation

pub mod config;
pub mod probe;
pub mod scripts;

// Re-export command functions
pub use config::{check_config, show_config};
pub use probe::command_probe;
pub use scripts::command_scripts;
