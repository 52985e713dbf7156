//! Result cache for script probes.
//!
//! Results are keyed by script name and the ordered parameter values of the
//! request. Entries are never evicted; they are overwritten by newer results
//! for the same key or ignored once older than the script's cache duration.

use ahash::AHashMap as HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::Script;
use crate::prober::timeout::secs_to_duration;

/// Outcome of one probe as stored in the cache and emitted as metrics.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    /// Start of the probe the result is reported for.
    pub start_time: Instant,
    pub success: bool,
    /// Process exit code, -1 if the process did not report one.
    pub exit_code: i32,
    /// Set when the result was served from the cache.
    pub cached: bool,
    /// Filtered script output in exposition format.
    pub output: String,
}

impl ScriptResult {
    /// Creates an empty result for a probe starting at `start_time`.
    pub fn new(start_time: Instant) -> Self {
        Self {
            start_time,
            success: true,
            exit_code: -1,
            cached: false,
            output: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    cache_time: Instant,
    result: ScriptResult,
}

/// Thread-safe result cache shared by all probes.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

/// Builds the cache key for a script and its parameter values.
pub fn cache_key(script: &Script, values: &[String]) -> String {
    format!("{}--{}", script.name, values.join("-"))
}

/// Converts a configured cache duration to a `Duration`.
fn cache_duration(script: &Script) -> Option<Duration> {
    script
        .cache
        .duration
        .map(secs_to_duration)
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the cached result, if any.
    ///
    /// Entries older than the script's cache duration are only returned when
    /// `allow_expired` is set.
    pub fn get(&self, script: &Script, values: &[String], allow_expired: bool) -> Option<ScriptResult> {
        let duration = cache_duration(script)?;

        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = entries.get(&cache_key(script, values))?;

        if allow_expired || entry.cache_time.elapsed() < duration {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    /// Stores a result, replacing any previous entry for the same key.
    pub fn set(&self, script: &Script, values: &[String], result: &ScriptResult) {
        if cache_duration(script).is_none() {
            return;
        }

        let key = cache_key(script, values);
        debug!(script = %script.name, key = %key, "Saving script result to cache");

        let entry = CacheEntry {
            cache_time: Instant::now(),
            result: result.clone(),
        };
        match self.entries.write() {
            Ok(mut guard) => {
                guard.insert(key, entry);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key, entry);
            }
        }
    }

    /// Number of stored entries, fresh or stale.
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
