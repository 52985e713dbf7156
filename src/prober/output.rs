//! Filtering of script output and request-level rewriting.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::Script;
use crate::exposition::{is_valid_metric_name, parse_line};

static HELP_TYPE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#\s*(?:HELP|TYPE)\s+)").expect("valid HELP/TYPE regex"));

/// Keeps the lines of `stdout` that are valid exposition lines.
///
/// Returns an empty string if the script's output is ignored, or if it failed
/// and its output is ignored on error.
pub fn format_output(script: &Script, stdout: &str, failed: bool) -> String {
    if script.output.ignore {
        return String::new();
    }
    if failed && script.output.ignore_on_error {
        return String::new();
    }

    let mut formatted = String::with_capacity(stdout.len());
    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok(_) => {
                formatted.push_str(line);
                formatted.push('\n');
            }
            Err(e) => debug!(
                script = %script.name,
                output = line,
                error = %e,
                "Dropping unparsable output line"
            ),
        }
    }

    formatted
}

/// Prepends `prefix_` to every metric name in already formatted output.
///
/// Plain comments are left alone. An invalid prefix leaves the output unchanged.
pub fn apply_prefix(output: &str, prefix: &str) -> String {
    if prefix.is_empty() || output.is_empty() {
        return output.to_string();
    }

    let prefix = format!("{}_", prefix);
    if !is_valid_metric_name(&prefix) {
        warn!(prefix = %prefix, "Ignoring invalid metric name prefix");
        return output.to_string();
    }

    let mut rewritten = String::with_capacity(output.len() + prefix.len() * 8);
    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let replacement = format!("${{1}}{}", prefix);
            rewritten.push_str(&HELP_TYPE_PREFIX.replace(trimmed, replacement.as_str()));
        } else if !trimmed.is_empty() {
            rewritten.push_str(&prefix);
            rewritten.push_str(trimmed);
        }
        rewritten.push('\n');
    }

    rewritten
}
