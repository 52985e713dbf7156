//! Scripts command implementation.
//!
//! Lists the configured scripts.

use herakles_script_exporter::config::{Config, Script};

fn describe_timeout(script: &Script) -> String {
    let timeout = &script.timeout;
    if timeout.max_timeout <= 0.0 {
        return "none".to_string();
    }
    let mut out = format!("{}s", timeout.max_timeout);
    if timeout.enforced {
        out.push_str(" (enforced");
        if timeout.wait_delay > 0.0 {
            out.push_str(&format!(", wait delay {}s", timeout.wait_delay));
        }
        out.push(')');
    }
    out
}

fn describe_cache(script: &Script) -> String {
    match script.cache.duration {
        None => "disabled".to_string(),
        Some(duration) => {
            let mut flags = Vec::new();
            if script.cache.cache_on_error {
                flags.push("cache on error");
            }
            if script.cache.use_expired_cache_on_error {
                flags.push("stale on error");
            }
            if flags.is_empty() {
                format!("{}s", duration)
            } else {
                format!("{}s ({})", duration, flags.join(", "))
            }
        }
    }
}

/// Lists configured scripts.
pub fn command_scripts(verbose: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("📜 Herakles Script Exporter - Configured Scripts");
    println!("================================================");

    for script in &config.scripts {
        println!("\n   ├─ 📂 {}", script.name);

        if verbose {
            let mut command = script.command.join(" ");
            if !script.args.is_empty() {
                command.push(' ');
                command.push_str(&script.args.join(" "));
            }
            if script.sudo {
                command = format!("sudo {}", command);
            }
            println!("   │  ├─ Command: {}", command);
            println!("   │  ├─ Timeout: {}", describe_timeout(script));
            println!("   │  ├─ Cache:   {}", describe_cache(script));
            if !script.env.is_empty() {
                let keys: Vec<&str> = script.env.keys().map(String::as_str).collect();
                println!("   │  └─ Env:     {}", keys.join(", "));
            }
        }
    }

    println!("\n📋 Total: {} scripts", config.scripts.len());
    Ok(())
}
