//! Config command implementations.
//!
//! Renders and validates the loaded script configuration for `--show-config`
//! and `--check-config`.

use herakles_script_exporter::config::{load_config, Config};

use crate::cli::{Args, ConfigFormat};

/// Serializes the configuration in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Prints the loaded configuration.
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

/// Validates the TLS flags and configuration sources, exiting with code 1 on error.
pub fn check_config(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = args.validate_tls() {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    match load_config(&args.config) {
        Ok(config) => {
            println!(
                "✅ Configuration is valid ({} scripts)",
                config.scripts.len()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
