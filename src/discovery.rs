//! Prometheus HTTP service discovery targets.
//!
//! Every configured script becomes one target pointing back at this exporter's
//! `/probe` endpoint, with the script and its discovery params encoded as
//! `__param_*` labels.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{Config, DEFAULT_PORT};

/// One entry of the HTTP SD response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// Overrides for the address advertised to Prometheus.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub host: Option<String>,
    pub port: Option<String>,
    pub scheme: Option<String>,
    /// Advertise `https` unless a scheme is set explicitly.
    pub tls: bool,
}

/// Splits a `Host` header value into host and port.
fn split_host_port(host_header: &str) -> (String, String) {
    if let Some((host, port)) = host_header.rsplit_once(':') {
        let bracketed_or_plain = host.ends_with(']') || !host.contains(':');
        if bracketed_or_plain && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
            return (host.to_string(), port.to_string());
        }
    }
    (host_header.to_string(), DEFAULT_PORT.to_string())
}

/// Builds the discovery targets for every configured script.
pub fn build_targets(
    config: &Config,
    host_header: Option<&str>,
    options: &DiscoveryOptions,
) -> Vec<Target> {
    let (mut host, mut port) = split_host_port(host_header.unwrap_or("localhost"));
    let mut scheme = if options.tls { "https" } else { "http" }.to_string();

    if let Some(h) = options.host.as_deref().filter(|h| !h.is_empty()) {
        host = h.to_string();
    }
    if let Some(p) = options.port.as_deref().filter(|p| !p.is_empty()) {
        port = p.to_string();
    }
    if let Some(s) = options.scheme.as_deref().filter(|s| !s.is_empty()) {
        scheme = s.to_string();
    }

    let address = format!("{}:{}", host, port);

    config
        .scripts
        .iter()
        .map(|script| {
            let mut labels = BTreeMap::new();
            labels.insert("__scheme__".to_string(), scheme.clone());
            labels.insert("__metrics_path__".to_string(), "/probe".to_string());
            labels.insert("__param_script".to_string(), script.name.clone());

            let discovery = &script.discovery;
            if let Some(interval) = discovery.scrape_interval.as_deref().filter(|v| !v.is_empty()) {
                labels.insert("__scrape_interval__".to_string(), interval.to_string());
            }
            if let Some(timeout) = discovery.scrape_timeout.as_deref().filter(|v| !v.is_empty()) {
                labels.insert("__scrape_timeout__".to_string(), timeout.to_string());
            }

            for (key, value) in &discovery.params {
                labels.insert(format!("__param_{}", key), value.clone());
            }
            let params: Vec<&str> = discovery.params.keys().map(String::as_str).collect();
            labels.insert("__param_params".to_string(), params.join(","));

            Target {
                targets: vec![address.clone()],
                labels,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Script;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("localhost:9469"), ("localhost".into(), "9469".into()));
        assert_eq!(split_host_port("example.com"), ("example.com".into(), "9469".into()));
        assert_eq!(split_host_port("[::1]:8080"), ("[::1]".into(), "8080".into()));
    }

    #[test]
    fn test_default_target() {
        let config = Config {
            scripts: vec![Script::new("test", &["test"])],
        };

        let targets = build_targets(&config, Some("localhost:9469"), &DiscoveryOptions::default());
        let json = serde_json::to_string(&targets).unwrap();
        assert_eq!(
            json,
            r#"[{"targets":["localhost:9469"],"labels":{"__metrics_path__":"/probe","__param_params":"","__param_script":"test","__scheme__":"http"}}]"#
        );
    }

    #[test]
    fn test_discovery_settings() {
        let mut script = Script::new("test", &["test"]);
        script.discovery.params.insert("seconds".into(), "5".into());
        script.discovery.params.insert("host".into(), "db".into());
        script.discovery.scrape_interval = Some("10s".into());
        script.discovery.scrape_timeout = Some("5s".into());
        let config = Config {
            scripts: vec![script],
        };

        let targets = build_targets(&config, Some("localhost"), &DiscoveryOptions::default());
        let labels = &targets[0].labels;
        assert_eq!(targets[0].targets, vec!["localhost:9469"]);
        assert_eq!(labels["__param_params"], "host,seconds");
        assert_eq!(labels["__param_seconds"], "5");
        assert_eq!(labels["__param_host"], "db");
        assert_eq!(labels["__scrape_interval__"], "10s");
        assert_eq!(labels["__scrape_timeout__"], "5s");
    }

    #[test]
    fn test_overrides() {
        let config = Config {
            scripts: vec![Script::new("test", &["test"])],
        };
        let options = DiscoveryOptions {
            host: Some("script_exporter".into()),
            port: Some("9999".into()),
            scheme: None,
            tls: true,
        };

        let targets = build_targets(&config, Some("localhost:9469"), &options);
        assert_eq!(targets[0].targets, vec!["script_exporter:9999"]);
        assert_eq!(targets[0].labels["__scheme__"], "https");

        let options = DiscoveryOptions {
            scheme: Some("http".into()),
            ..options
        };
        let targets = build_targets(&config, None, &options);
        assert_eq!(targets[0].labels["__scheme__"], "http");
    }
}
