//! Script configuration for herakles-script-exporter.
//!
//! This module defines the script records served by the exporter and handles
//! loading them from YAML, JSON or TOML files, validating them, and swapping
//! the active configuration atomically on reload.

use ahash::AHashSet as HashSet;
use prometheus::{Gauge, Registry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9469;
pub const DEFAULT_CONFIG_FILE: &str = "scripts.yaml";
pub const DEFAULT_TIMEOUT_OFFSET: f64 = 0.5;

/// File extensions picked up when a configuration source is a directory.
const CONFIG_EXTENSIONS: [&str; 4] = ["yaml", "yml", "json", "toml"];

/// Output handling policy for a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Output {
    /// Never return the script output, only the probe metrics.
    #[serde(default)]
    pub ignore: bool,
    /// Drop the script output when the script failed.
    #[serde(default)]
    pub ignore_on_error: bool,
    /// Declared output format. Accepted for compatibility, output is always
    /// read as text exposition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Timeout policy for a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timeout {
    /// Upper bound for the timeout in seconds (0 = no bound).
    #[serde(default)]
    pub max_timeout: f64,
    /// Kill the script once the timeout is reached.
    #[serde(default)]
    pub enforced: bool,
    /// Grace period in seconds to wait for output pipes after the script
    /// exited or was killed (0 = wait until they close).
    #[serde(default)]
    pub wait_delay: f64,
}

/// Result caching policy for a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cache {
    /// Cache lifetime in seconds; caching is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Also cache failed results.
    #[serde(default)]
    pub cache_on_error: bool,
    /// Serve an expired cache entry when a fresh run fails.
    #[serde(default)]
    pub use_expired_cache_on_error: bool,
}

/// Service discovery settings for a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Discovery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

/// A single configured script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default)]
    pub allow_env_overwrite: bool,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub timeout: Timeout,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub discovery: Discovery,
}

impl Script {
    /// Creates a script with the given name and command and default policies.
    pub fn new(name: impl Into<String>, command: &[&str]) -> Self {
        Self {
            name: name.into(),
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// The full set of configured scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl Config {
    /// Looks up a script by name.
    pub fn get_script(&self, name: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.name == name)
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration source not found: {0}")]
    NotFound(PathBuf),

    #[error("error reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing YAML config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("error parsing JSON config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("error parsing TOML config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validates a loaded configuration (used by --check-config, startup and reload).
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for script in &cfg.scripts {
        if script.name.is_empty() {
            return Err(ConfigError::Invalid("script name must not be empty".into()));
        }
        if !seen.insert(script.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate script name '{}'",
                script.name
            )));
        }
        if script.command.first().map_or(true, |c| c.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "script '{}' has no command",
                script.name
            )));
        }

        let timeout = &script.timeout;
        for (field, value) in [
            ("timeout.max_timeout", timeout.max_timeout),
            ("timeout.wait_delay", timeout.wait_delay),
            ("cache.duration", script.cache.duration.unwrap_or(0.0)),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "script '{}': {} must be a non-negative number, got {}",
                    script.name, field, value
                )));
            }
        }
    }

    Ok(())
}

/// Expands configuration sources into the list of files to read.
///
/// Directories contribute every supported file they contain in sorted order.
fn expand_sources(sources: &[PathBuf]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();

    for source in sources {
        if source.is_dir() {
            let entries = fs::read_dir(source).map_err(|e| ConfigError::Io {
                path: source.clone(),
                source: e,
            })?;
            let mut found: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .and_then(|s| s.to_str())
                            .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext))
                })
                .collect();
            found.sort();
            files.extend(found);
        } else if source.exists() {
            files.push(source.clone());
        } else {
            return Err(ConfigError::NotFound(source.clone()));
        }
    }

    Ok(files)
}

/// Parses one configuration file, choosing the format by extension.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| ConfigError::Json {
            path: path.to_path_buf(),
            source: e,
        })?,
        Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::Toml {
            path: path.to_path_buf(),
            source: e,
        })?,
        // Default to YAML
        _ => serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?,
    };

    debug!("Parsed configuration file: {}", path.display());
    Ok(config)
}

/// Loads and merges all configuration sources, then validates the result.
pub fn load_config(sources: &[PathBuf]) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for file in expand_sources(sources)? {
        let fc = load_config_file(&file)?;
        config.scripts.extend(fc.scripts);
    }

    validate_config(&config)?;
    Ok(config)
}

/// Holds the active configuration and swaps it atomically on reload.
///
/// Readers take a cheap `Arc` snapshot; a probe keeps its snapshot for its
/// whole lifetime even if a reload happens concurrently.
pub struct ConfigStore {
    sources: Vec<PathBuf>,
    current: RwLock<Arc<Config>>,
    reload_success: Gauge,
    reload_success_timestamp: Gauge,
}

impl ConfigStore {
    /// Creates an empty store for the given sources and registers the reload
    /// metrics with the registry.
    pub fn new(sources: Vec<PathBuf>, registry: &Registry) -> Result<Self, prometheus::Error> {
        let reload_success = Gauge::new(
            "script_exporter_config_last_reload_successful",
            "Script exporter config loaded successfully.",
        )?;
        let reload_success_timestamp = Gauge::new(
            "script_exporter_config_last_reload_success_timestamp_seconds",
            "Timestamp of the last successful configuration reload.",
        )?;
        registry.register(Box::new(reload_success.clone()))?;
        registry.register(Box::new(reload_success_timestamp.clone()))?;

        Ok(Self {
            sources,
            current: RwLock::new(Arc::new(Config::default())),
            reload_success,
            reload_success_timestamp,
        })
    }

    /// Creates a store serving a fixed configuration; reloads read no files.
    pub fn from_config(config: Config) -> Result<Self, prometheus::Error> {
        let store = Self::new(Vec::new(), &Registry::new())?;
        store.replace(config);
        Ok(store)
    }

    /// Returns the configuration sources of this store.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Returns the current configuration snapshot.
    pub fn snapshot(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn replace(&self, config: Config) {
        let config = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// Reloads the configuration from the sources.
    ///
    /// On failure the previous configuration stays active.
    pub fn reload(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Ok(());
        }

        match load_config(&self.sources) {
            Ok(config) => {
                info!(
                    "Loaded {} scripts from {} configuration source(s)",
                    config.scripts.len(),
                    self.sources.len()
                );
                self.replace(config);
                self.reload_success.set(1.0);
                self.reload_success_timestamp
                    .set(chrono::Utc::now().timestamp() as f64);
                Ok(())
            }
            Err(e) => {
                self.reload_success.set(0.0);
                Err(e)
            }
        }
    }
}
