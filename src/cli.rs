//! CLI arguments and subcommands for herakles-script-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use herakles_script_exporter::config::{DEFAULT_CONFIG_FILE, DEFAULT_PORT, DEFAULT_TIMEOUT_OFFSET};

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-script-exporter",
    about = "Prometheus exporter that runs configured scripts and serves their metrics",
    long_about = "Prometheus exporter that runs configured scripts and serves their metrics.\n\n\
                  Scripts are executed on demand for every /probe request. Their output is \
                  validated against the text exposition format and returned together with \
                  success, duration, exit code and cache metrics.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version,
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-script-exporter — More info: https://www.herakles.now — Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Include the script environment in execution logs
    #[arg(long)]
    pub log_env: bool,

    /// Config file or directory (YAML/JSON/TOML), may be repeated
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: Vec<PathBuf>,

    /// Print the loaded configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Reload the configuration every N seconds (0 = only on SIGHUP or /-/reload)
    #[arg(long, default_value_t = 0)]
    pub config_reload_interval: u64,

    /// Do not pass the values of the `params` query parameter as script arguments
    #[arg(long)]
    pub script_no_args: bool,

    /// Seconds subtracted from the scrape timeout to leave room for network delays
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_OFFSET)]
    pub script_timeout_offset: f64,

    /// Host advertised by /discovery (default: from the Host header)
    #[arg(long)]
    pub discovery_host: Option<String>,

    /// Port advertised by /discovery (default: from the Host header)
    #[arg(long)]
    pub discovery_port: Option<String>,

    /// Scheme advertised by /discovery (default: http, or https with TLS)
    #[arg(long)]
    pub discovery_scheme: Option<String>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured scripts
    Scripts {
        /// Show command, timeout and cache settings of each script
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Run a single probe and print the resulting metrics
    Probe {
        /// Name of the script to run
        script: String,

        /// Query parameter passed to the probe (key=value), may be repeated
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Scrape timeout in seconds, as sent by Prometheus
        #[arg(long)]
        timeout: Option<f64>,
    },
}

impl Args {
    /// Validates the TLS flags (used by --check-config and startup).
    pub fn validate_tls(&self) -> Result<(), String> {
        if !self.enable_tls {
            return Ok(());
        }

        let (cert, key) = match (&self.tls_cert, &self.tls_key) {
            (None, None) => {
                return Err("TLS is enabled but neither --tls-cert nor --tls-key are set".into())
            }
            (Some(_), None) => return Err("TLS is enabled but --tls-key is not set".into()),
            (None, Some(_)) => return Err("TLS is enabled but --tls-cert is not set".into()),
            (Some(cert), Some(key)) => (cert, key),
        };

        for (kind, path) in [("certificate", cert), ("private key", key)] {
            match std::fs::metadata(path) {
                Ok(meta) if meta.len() == 0 => {
                    return Err(format!("TLS {} file is empty: {}", kind, path.display()));
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(format!("TLS {} file not found: {}", kind, path.display()));
                }
                Err(e) => {
                    return Err(format!(
                        "TLS {} file is not readable: {} ({})",
                        kind,
                        path.display(),
                        e
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Parses a `key=value` pair.
fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}
