//! Probe command implementation.
//!
//! Runs one probe outside the HTTP server and prints the metric block a
//! `/probe` request would return.

use herakles_script_exporter::config::Config;
use herakles_script_exporter::prober::{ProbeOptions, ProbeRequest, Prober, ResultCache};
use prometheus::IntCounter;
use std::sync::Arc;
use std::time::Instant;

/// Builds the probe request for the given script and parameters.
fn build_request(script: &str, params: &[(String, String)], timeout: Option<f64>) -> ProbeRequest {
    let mut query = Vec::with_capacity(params.len() + 1);
    query.push(("script".to_string(), script.to_string()));
    query.extend(params.iter().cloned());

    ProbeRequest::new(query, timeout.map(|t| t.to_string()))
}

/// Runs a single probe and prints its metrics.
pub async fn command_probe(
    script: &str,
    params: &[(String, String)],
    timeout: Option<f64>,
    options: ProbeOptions,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let unknown = IntCounter::new(
        "script_exporter_script_unknown_total",
        "Total number of unknown scripts requested by probes",
    )?;
    let prober = Prober::new(Arc::new(ResultCache::new()), options, unknown);
    let request = build_request(script, params, timeout);

    let scripts = match prober.resolve_scripts(config, &request) {
        Ok(scripts) => scripts,
        Err(e) => {
            eprintln!("❌ {}: {}", e, script);
            std::process::exit(1);
        }
    };

    for script in scripts {
        let start = Instant::now();
        let output = prober.probe(&script, &request).await;
        print!("{}", output);
        eprintln!(
            "⏱️  {} finished in {:.3}s",
            script.name,
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
