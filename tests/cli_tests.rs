//! Integration tests for the command line modes that do not start the server.

use std::io::Write;
use std::process::{Command, Output};
use tempfile::{Builder, NamedTempFile, TempDir};

fn binary_path() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_herakles-script-exporter"))
}

fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp config file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file.flush().expect("Failed to flush config file");
    file
}

const SCRIPTS: &str = r#"
scripts:
  - name: hello
    command: ["sh", "-c", "echo hello_total 1"]
  - name: args
    command: ["sh", "-c", "echo \"arg_value{value=\\\"$0\\\"} 1\""]
    cache:
      duration: 60
  - name: broken
    command: ["sh", "-c", "echo partial 1; exit 3"]
    output:
      ignore_on_error: true
"#;

fn run(config: &NamedTempFile, args: &[&str]) -> Output {
    Command::new(binary_path())
        .arg("-c")
        .arg(config.path())
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_check_config_valid() {
    let config = write_config(".yaml", SCRIPTS);
    let output = run(&config, &["--check-config"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Configuration is valid (3 scripts)"), "{}", stdout);
}

#[test]
fn test_check_config_rejects_unknown_field() {
    let config = write_config(
        ".yaml",
        "scripts:\n  - name: a\n    command: [\"true\"]\n    timeout_seconds: 5\n",
    );
    let output = run(&config, &["--check-config"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Configuration invalid"), "{}", stderr);
}

#[test]
fn test_check_config_missing_source() {
    let output = Command::new(binary_path())
        .args(["-c", "/nonexistent/scripts.yaml", "--check-config"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("configuration source not found"), "{}", stderr);
}

#[test]
fn test_check_config_directory() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join("a.yaml"),
        "scripts:\n  - name: a\n    command: [\"true\"]\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b.json"),
        r#"{"scripts": [{"name": "b", "command": ["true"]}]}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let output = Command::new(binary_path())
        .arg("-c")
        .arg(dir.path())
        .arg("--check-config")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Configuration is valid (2 scripts)"), "{}", stdout);
}

#[test]
fn test_show_config_json() {
    let config = write_config(".yaml", SCRIPTS);
    let output = run(&config, &["--show-config", "--config-format", "json"]);

    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("show-config should print JSON");
    assert_eq!(value["scripts"][0]["name"], "hello");
    assert_eq!(value["scripts"][1]["cache"]["duration"], 60.0);
}

#[test]
fn test_scripts_command() {
    let config = write_config(".yaml", SCRIPTS);
    let output = run(&config, &["--log-level", "off", "scripts", "--verbose"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    for name in ["hello", "args", "broken"] {
        assert!(stdout.contains(name), "missing {} in {}", name, stdout);
    }
}

#[test]
fn test_probe_command() {
    let config = write_config(".yaml", SCRIPTS);
    let output = run(&config, &["--log-level", "off", "probe", "hello"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("script_success{script=\"hello\"} 1"), "{}", stdout);
    assert!(stdout.contains("script_exit_code{script=\"hello\"} 0"), "{}", stdout);
    assert!(stdout.contains("hello_total 1"), "{}", stdout);
}

#[test]
fn test_probe_command_with_params() {
    let config = write_config(".yaml", SCRIPTS);
    let output = run(
        &config,
        &[
            "--log-level",
            "off",
            "probe",
            "args",
            "--param",
            "params=target",
            "--param",
            "target=db1",
        ],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("arg_value{value=\"db1\"} 1"), "{}", stdout);
}

#[test]
fn test_probe_command_failed_script() {
    let config = write_config(".yaml", SCRIPTS);
    let output = run(&config, &["--log-level", "off", "probe", "broken"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("script_success{script=\"broken\"} 0"), "{}", stdout);
    assert!(stdout.contains("script_exit_code{script=\"broken\"} 3"), "{}", stdout);
    assert!(!stdout.contains("partial 1"), "{}", stdout);
}

#[test]
fn test_probe_command_unknown_script() {
    let config = write_config(".yaml", SCRIPTS);
    let output = run(&config, &["--log-level", "off", "probe", "missing"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Script not found"), "{}", stderr);
}
