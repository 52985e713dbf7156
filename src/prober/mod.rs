//! Probe pipeline: resolve a script, consult the cache, run it, format its
//! output, update the cache and render the probe metrics.

pub mod cache;
pub mod output;
pub mod runner;
pub mod timeout;

use prometheus::IntCounter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::{Config, Script};

pub use cache::{ResultCache, ScriptResult};
pub use output::{apply_prefix, format_output};
pub use runner::{ExecutionOutcome, RunError};
pub use timeout::{resolve_timeout, SCRAPE_TIMEOUT_HEADER};

/// Errors that reject a probe request before any script runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("'script' parameter is missing")]
    MissingScript,

    #[error("Script not found")]
    UnknownScript(String),
}

/// Process-wide probe settings taken from the command line.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Include the script environment in execution logs.
    pub log_env: bool,
    /// Seconds subtracted from the requested timeout.
    pub timeout_offset: f64,
    /// Do not pass `params` values as script arguments.
    pub no_args: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            log_env: false,
            timeout_offset: crate::config::DEFAULT_TIMEOUT_OFFSET,
            no_args: false,
        }
    }
}

/// The parts of an HTTP probe request the pipeline looks at.
#[derive(Debug, Clone, Default)]
pub struct ProbeRequest {
    /// Query parameters in request order; names may repeat.
    pub query: Vec<(String, String)>,
    /// Value of the scrape timeout header, if sent.
    pub scrape_timeout: Option<String>,
}

impl ProbeRequest {
    pub fn new(query: Vec<(String, String)>, scrape_timeout: Option<String>) -> Self {
        Self {
            query,
            scrape_timeout,
        }
    }

    /// First value of a query parameter.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a query parameter in request order.
    pub fn all(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Requested script names.
    pub fn script_names(&self) -> Vec<&str> {
        self.all("script")
    }

    /// Metric name prefix requested with `prefix=`.
    pub fn prefix(&self) -> Option<&str> {
        self.first("prefix").filter(|p| !p.is_empty())
    }

    /// True when the request asked for `output=ignore`.
    pub fn output_ignored(&self) -> bool {
        self.first("output") == Some("ignore")
    }
}

/// Values passed as extra script arguments.
///
/// `params` names a comma separated list of query parameters; each resolves
/// to the first value of that parameter, or an empty string.
pub fn param_values(request: &ProbeRequest, no_args: bool) -> Vec<String> {
    if no_args {
        return Vec::new();
    }

    match request.first("params") {
        Some(names) if !names.is_empty() => names
            .split(',')
            .map(|name| request.first(name).unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Full argument vector of a script run.
pub fn build_args(script: &Script, values: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(script.command.len() + script.args.len() + values.len() + 1);
    if script.sudo {
        args.push("sudo".to_string());
    }
    args.extend(script.command.iter().cloned());
    args.extend(script.args.iter().cloned());
    args.extend(values.iter().cloned());
    args
}

fn is_valid_env_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('=') && !name.contains('\0')
}

/// Environment overlay of a script run.
///
/// Starts from the configured `env` and adds every query parameter (repeated
/// values joined by `,`). Query parameters only replace configured entries
/// when the script sets `allow_env_overwrite`.
pub fn build_env(script: &Script, query: &[(String, String)]) -> BTreeMap<String, String> {
    let mut env = script.env.clone();

    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, value) in query {
        grouped.entry(key.as_str()).or_default().push(value.as_str());
    }

    for (key, values) in grouped {
        if !is_valid_env_name(key) || values.iter().any(|v| v.contains('\0')) {
            debug!(script = %script.name, key = key, "Skipping query parameter unusable as environment variable");
            continue;
        }
        if !env.contains_key(key) || script.allow_env_overwrite {
            env.insert(key.to_string(), values.join(","));
        }
    }

    env
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}

/// Renders the probe metrics followed by the script output.
pub fn render_metrics(script_name: &str, result: &ScriptResult, output: &str) -> String {
    let label = escape_label_value(script_name);
    format!(
        "# HELP script_success Script exit status (0 = error, 1 = success).\n\
         # TYPE script_success gauge\n\
         script_success{{script=\"{label}\"}} {success}\n\
         # HELP script_duration_seconds Script execution time, in seconds.\n\
         # TYPE script_duration_seconds gauge\n\
         script_duration_seconds{{script=\"{label}\"}} {duration:.6}\n\
         # HELP script_exit_code The exit code of the script.\n\
         # TYPE script_exit_code gauge\n\
         script_exit_code{{script=\"{label}\"}} {exit_code}\n\
         # HELP script_cached Script result is returned from cache (0 = no, 1 = yes).\n\
         # TYPE script_cached gauge\n\
         script_cached{{script=\"{label}\"}} {cached}\n\
         {output}",
        label = label,
        success = u8::from(result.success),
        duration = result.start_time.elapsed().as_secs_f64(),
        exit_code = result.exit_code,
        cached = u8::from(result.cached),
        output = output,
    )
}

/// Runs probes against a shared result cache.
pub struct Prober {
    cache: Arc<ResultCache>,
    options: ProbeOptions,
    unknown_total: IntCounter,
}

impl Prober {
    pub fn new(cache: Arc<ResultCache>, options: ProbeOptions, unknown_total: IntCounter) -> Self {
        Self {
            cache,
            options,
            unknown_total,
        }
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Looks up every requested script.
    ///
    /// Fails on the first unknown name, or when no script was requested, and
    /// counts the failure in `script_exporter_script_unknown_total`.
    pub fn resolve_scripts(
        &self,
        config: &Config,
        request: &ProbeRequest,
    ) -> Result<Vec<Script>, ProbeError> {
        let names = request.script_names();
        if names.is_empty() {
            self.unknown_total.inc();
            return Err(ProbeError::MissingScript);
        }

        names
            .into_iter()
            .map(|name| match config.get_script(name) {
                Some(script) => Ok(script.clone()),
                None => {
                    self.unknown_total.inc();
                    Err(ProbeError::UnknownScript(name.to_string()))
                }
            })
            .collect()
    }

    /// Executes the probe pipeline for one script and returns its result.
    pub async fn execute(&self, script: &Script, request: &ProbeRequest) -> ScriptResult {
        let values = param_values(request, self.options.no_args);
        let start = Instant::now();

        if let Some(mut cached) = self.cache.get(script, &values, false) {
            cached.start_time = start;
            cached.cached = true;
            debug!(script = %script.name, "Using cached script result");
            return cached;
        }

        let timeout = resolve_timeout(
            request.first("timeout"),
            request.scrape_timeout.as_deref(),
            self.options.timeout_offset,
            script.timeout.max_timeout,
        );
        let args = build_args(script, &values);
        let env = build_env(script, &request.query);

        let outcome = runner::run(script, timeout, &args, &env, self.options.log_env).await;
        let failed = !outcome.is_success();

        let mut result = ScriptResult::new(start);
        result.success = !failed;
        result.exit_code = outcome.exit_code;
        result.output = format_output(script, &outcome.stdout, failed);

        if failed {
            if script.cache.use_expired_cache_on_error {
                if let Some(mut cached) = self.cache.get(script, &values, true) {
                    cached.start_time = start;
                    cached.cached = true;
                    debug!(script = %script.name, "Using expired cached result after failed run");
                    return cached;
                }
            }
            if script.cache.cache_on_error {
                self.cache.set(script, &values, &result);
            }
            return result;
        }

        self.cache.set(script, &values, &result);
        result
    }

    /// Executes one script and renders the metric block for the request.
    ///
    /// `output=ignore` and `prefix` only affect what is rendered here; the
    /// cached result keeps the unmodified output.
    pub async fn probe(&self, script: &Script, request: &ProbeRequest) -> String {
        let result = self.execute(script, request).await;

        let output = if request.output_ignored() {
            String::new()
        } else if let Some(prefix) = request.prefix() {
            apply_prefix(&result.output, prefix)
        } else {
            result.output.clone()
        };

        render_metrics(&script.name, &result, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn prober() -> Prober {
        let counter = IntCounter::new("unknown_total", "test").unwrap();
        Prober::new(Arc::new(ResultCache::new()), ProbeOptions::default(), counter)
    }

    fn shell_script(name: &str, body: &str) -> Script {
        Script::new(name, &["sh", "-c", body])
    }

    #[test]
    fn test_param_values() {
        let request = ProbeRequest::new(
            query(&[("params", "target,port,missing"), ("target", "a"), ("port", "1"), ("target", "b")]),
            None,
        );
        assert_eq!(param_values(&request, false), vec!["a", "1", ""]);
        assert!(param_values(&request, true).is_empty());
        assert!(param_values(&ProbeRequest::default(), false).is_empty());
    }

    #[test]
    fn test_build_args() {
        let mut script = Script::new("test", &["/bin/check", "--mode"]);
        script.args = vec!["fast".to_string()];
        script.sudo = true;

        assert_eq!(
            build_args(&script, &["x".to_string()]),
            vec!["sudo", "/bin/check", "--mode", "fast", "x"]
        );
    }

    #[test]
    fn test_build_env_keeps_configured_values() {
        let mut script = Script::new("test", &["true"]);
        script.env.insert("TARGET".to_string(), "configured".to_string());

        let query = query(&[("TARGET", "query"), ("extra", "1"), ("extra", "2")]);
        let env = build_env(&script, &query);
        assert_eq!(env.get("TARGET").map(String::as_str), Some("configured"));
        assert_eq!(env.get("extra").map(String::as_str), Some("1,2"));

        script.allow_env_overwrite = true;
        let env = build_env(&script, &query);
        assert_eq!(env.get("TARGET").map(String::as_str), Some("query"));
    }

    #[test]
    fn test_build_env_skips_unusable_names() {
        let script = Script::new("test", &["true"]);
        let env = build_env(&script, &query(&[("a=b", "1"), ("", "2"), ("ok", "3")]));
        assert_eq!(env.len(), 1);
        assert!(env.contains_key("ok"));
    }

    #[test]
    fn test_render_metrics() {
        let mut result = ScriptResult::new(Instant::now());
        result.exit_code = 0;
        let text = render_metrics("te\"st", &result, "up 1\n");

        assert!(text.contains("script_success{script=\"te\\\"st\"} 1\n"));
        assert!(text.contains("script_exit_code{script=\"te\\\"st\"} 0\n"));
        assert!(text.contains("script_cached{script=\"te\\\"st\"} 0\n"));
        assert!(text.ends_with("up 1\n"));
        for line in text.lines() {
            assert!(crate::exposition::parse_line(line).is_ok(), "{}", line);
        }
    }

    #[test]
    fn test_resolve_scripts() {
        let config = Config {
            scripts: vec![Script::new("a", &["true"]), Script::new("b", &["true"])],
        };
        let prober = prober();

        let ok = prober
            .resolve_scripts(&config, &ProbeRequest::new(query(&[("script", "b"), ("script", "a")]), None))
            .unwrap();
        assert_eq!(ok[0].name, "b");
        assert_eq!(ok[1].name, "a");

        assert_eq!(
            prober.resolve_scripts(&config, &ProbeRequest::default()),
            Err(ProbeError::MissingScript)
        );
        assert_eq!(
            prober.resolve_scripts(&config, &ProbeRequest::new(query(&[("script", "a"), ("script", "c")]), None)),
            Err(ProbeError::UnknownScript("c".to_string()))
        );
        assert_eq!(prober.unknown_total.get(), 2);
    }

    #[tokio::test]
    async fn test_successful_probe_is_cached() {
        let prober = prober();
        let mut script = shell_script("test", "echo 'value{k=\"v\"} 42'");
        script.cache.duration = Some(10.0);
        let request = ProbeRequest::default();

        let first = prober.execute(&script, &request).await;
        assert!(first.success);
        assert!(!first.cached);
        assert_eq!(first.output, "value{k=\"v\"} 42\n");

        let second = prober.execute(&script, &request).await;
        assert!(second.cached);
        assert_eq!(second.exit_code, 0);
        assert_eq!(second.output, first.output);
    }

    #[tokio::test]
    async fn test_failure_not_cached_without_cache_on_error() {
        let prober = prober();
        let mut script = shell_script("test", "exit 2");
        script.cache.duration = Some(10.0);

        let result = prober.execute(&script, &ProbeRequest::default()).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert!(prober.cache().is_empty());

        script.cache.cache_on_error = true;
        prober.execute(&script, &ProbeRequest::default()).await;
        assert_eq!(prober.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_used_on_error() {
        let prober = prober();
        let mut script = shell_script("test", "echo up 1");
        script.cache.duration = Some(0.05);
        script.cache.use_expired_cache_on_error = true;

        let request = ProbeRequest::default();
        assert!(prober.execute(&script, &request).await.success);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // Same name and parameters, so the same cache key
        script.command = vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()];
        let result = prober.execute(&script, &request).await;
        assert!(result.success);
        assert!(result.cached);
        assert_eq!(result.output, "up 1\n");
    }

    #[tokio::test]
    async fn test_request_modifiers_not_cached() {
        let prober = prober();
        let mut script = shell_script("test", "echo 'up 1'");
        script.cache.duration = Some(10.0);

        let prefixed = ProbeRequest::new(query(&[("script", "test"), ("prefix", "svc")]), None);
        let text = prober.probe(&script, &prefixed).await;
        assert!(text.ends_with("svc_up 1\n"));

        let ignored = ProbeRequest::new(query(&[("script", "test"), ("output", "ignore")]), None);
        let text = prober.probe(&script, &ignored).await;
        assert!(!text.contains("up 1"));
        assert!(text.contains("script_cached{script=\"test\"} 1"));

        let plain = ProbeRequest::new(query(&[("script", "test")]), None);
        let text = prober.probe(&script, &plain).await;
        assert!(text.ends_with("\nup 1\n"));
    }

    #[tokio::test]
    async fn test_params_passed_as_arguments_and_environment() {
        let prober = prober();
        let script = shell_script("test", "echo \"arg_$0 1\"; echo \"env_$target 1\"");
        let request = ProbeRequest::new(
            query(&[("script", "test"), ("params", "target"), ("target", "db")]),
            None,
        );

        // sh -c passes the first extra argument as $0
        let result = prober.execute(&script, &request).await;
        assert!(result.success);
        assert!(result.output.contains("arg_db 1\n"));
        assert!(result.output.contains("env_db 1\n"));
    }

    #[tokio::test]
    async fn test_stale_fallback_keeps_cached_success() {
        let prober = prober();
        let mut script = shell_script("test", "echo up 1");
        script.cache.duration = Some(0.05);
        script.cache.use_expired_cache_on_error = true;
        script.cache.cache_on_error = true;

        let request = ProbeRequest::default();
        assert!(prober.execute(&script, &request).await.success);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        script.command = vec!["sh".to_string(), "-c".to_string(), "echo down 1; exit 1".to_string()];
        let result = prober.execute(&script, &request).await;
        assert!(result.success);
        assert!(result.cached);

        // The failed run did not replace the entry it fell back to
        let stored = prober.cache().get(&script, &[], true).unwrap();
        assert!(stored.success);
        assert_eq!(stored.exit_code, 0);
        assert_eq!(stored.output, "up 1\n");
    }

    #[tokio::test]
    async fn test_cache_hit_duration_measured_from_request() {
        let prober = prober();
        let mut script = shell_script("test", "sleep 0.5; echo up 1");
        script.cache.duration = Some(10.0);
        let request = ProbeRequest::default();

        let duration_of = |text: &str| -> f64 {
            text.lines()
                .find(|l| l.starts_with("script_duration_seconds{"))
                .and_then(|l| l.rsplit(' ').next())
                .unwrap()
                .parse()
                .unwrap()
        };

        let first = prober.probe(&script, &request).await;
        assert!(duration_of(&first) >= 0.5);

        let second = prober.probe(&script, &request).await;
        assert!(second.contains("script_cached{script=\"test\"} 1"));
        assert!(duration_of(&second) < 0.2);
    }

    #[tokio::test]
    async fn test_signal_termination_is_failure() {
        let prober = prober();
        let script = shell_script("test", "echo up 1; kill -9 $$");

        let result = prober.execute(&script, &ProbeRequest::default()).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.output, "up 1\n");
    }

    #[tokio::test]
    async fn test_oversized_query_timeout() {
        let prober = Arc::new(prober());
        let mut script = shell_script("test", "sleep 0.3; echo up 1");
        script.timeout.enforced = true;

        for timeout in ["1e19", "1e300"] {
            let request = ProbeRequest::new(query(&[("script", "test"), ("timeout", timeout)]), None);
            let task_prober = prober.clone();
            let task_script = script.clone();
            let result = tokio::spawn(async move { task_prober.execute(&task_script, &request).await })
                .await
                .expect("execution must not panic");

            assert!(result.success, "timeout {}", timeout);
            assert_eq!(result.output, "up 1\n");
        }
    }
}
