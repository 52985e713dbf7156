//! Process runner for configured scripts.
//!
//! A script is started with its stdout and stderr captured separately. When
//! the timeout is enforced the immediate child is killed at the deadline.
//! Processes forked by the script are not tracked: if they keep the output
//! pipes open, collection waits for them unless the script has a wait delay,
//! in which case the pipes are abandoned once the delay has passed.

use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::Script;
use crate::prober::timeout::secs_to_duration;

/// Errors a script execution can end with.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no command configured")]
    EmptyCommand,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exit status {0}")]
    ExitStatus(i32),

    #[error("terminated by signal {0}")]
    Signal(String),

    #[error("killed after reaching the timeout of {0:.3}s")]
    TimedOut(f64),

    #[error("output pipes still open {0:.3}s after the process ended")]
    PipesAbandoned(f64),

    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Result of one script execution.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub stdout: String,
    /// Exit code of the process, -1 if it did not report one.
    pub exit_code: i32,
    pub error: Option<RunError>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// Copies a pipe into a shared buffer until EOF.
///
/// The buffer is shared so output read so far survives an aborted reader.
fn spawn_reader<R>(mut pipe: R, buffer: OutputBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => match buffer.lock() {
                    Ok(mut guard) => guard.extend_from_slice(&chunk[..n]),
                    Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                },
            }
        }
    })
}

fn take_output(buffer: &OutputBuffer) -> String {
    let bytes = match buffer.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Waits for the readers to hit EOF, bounded by `wait_delay` seconds when set.
///
/// Returns false if the readers had to be abandoned.
async fn drain_pipes(mut readers: Vec<JoinHandle<()>>, wait_delay: f64) -> bool {
    let wait_all = async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    };

    if wait_delay <= 0.0 {
        wait_all.await;
        return true;
    }

    let Some(grace_deadline) = Instant::now().checked_add(secs_to_duration(wait_delay)) else {
        wait_all.await;
        return true;
    };
    if tokio::time::timeout_at(grace_deadline, wait_all).await.is_ok() {
        return true;
    }

    for reader in &readers {
        reader.abort();
    }
    false
}

fn signal_name(status: &ExitStatus) -> Option<String> {
    let signal = status.signal()?;
    Some(match Signal::try_from(signal) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("signal {}", signal),
    })
}

/// Unix time in seconds at which a timeout starting now expires.
fn wall_clock_deadline(timeout: f64) -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0 + timeout
}

/// Variables describing the timeout to the script, empty without a timeout.
fn timeout_variables(script: &Script, timeout: f64) -> Vec<(&'static str, String)> {
    if timeout <= 0.0 {
        return Vec::new();
    }
    vec![
        ("SCRIPT_TIMEOUT", format!("{:.3}", timeout)),
        ("SCRIPT_DEADLINE", format!("{:.3}", wall_clock_deadline(timeout))),
        (
            "SCRIPT_TIMEOUT_ENFORCED",
            (if script.timeout.enforced { "1" } else { "0" }).to_string(),
        ),
    ]
}

/// Runs `args[0]` with the remaining arguments.
///
/// The process inherits the exporter's environment overlaid with `env`. With a
/// positive `timeout`, `SCRIPT_TIMEOUT`, `SCRIPT_DEADLINE` and
/// `SCRIPT_TIMEOUT_ENFORCED` are exported as well.
pub async fn run(
    script: &Script,
    timeout: f64,
    args: &[String],
    env: &BTreeMap<String, String>,
    log_env: bool,
) -> ExecutionOutcome {
    let Some((program, rest)) = args.split_first() else {
        error!(script = %script.name, "Script execution failed: no command configured");
        return ExecutionOutcome {
            stdout: String::new(),
            exit_code: -1,
            error: Some(RunError::EmptyCommand),
        };
    };

    // A deadline too far out to represent is never reached
    let deadline = if script.timeout.enforced && timeout > 0.0 {
        Instant::now().checked_add(secs_to_duration(timeout))
    } else {
        None
    };

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let timeout_env = timeout_variables(script, timeout);
    cmd.envs(timeout_env.iter().map(|(k, v)| (*k, v.as_str())));

    let logged_env = if log_env {
        env.iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(timeout_env.iter().map(|(k, v)| (*k, v.as_str())))
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    } else {
        String::new()
    };

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(
                script = %script.name,
                args = %args.join(","),
                env = %logged_env,
                exit_code = -1,
                error = %e,
                "Script execution failed"
            );
            return ExecutionOutcome {
                stdout: String::new(),
                exit_code: -1,
                error: Some(RunError::Spawn {
                    program: program.clone(),
                    source: e,
                }),
            };
        }
    };

    let stdout_buf = OutputBuffer::default();
    let stderr_buf = OutputBuffer::default();
    let mut readers = Vec::with_capacity(2);
    if let Some(pipe) = child.stdout.take() {
        readers.push(spawn_reader(pipe, stdout_buf.clone()));
    }
    if let Some(pipe) = child.stderr.take() {
        readers.push(spawn_reader(pipe, stderr_buf.clone()));
    }

    let mut timed_out = false;
    let status = if let Some(deadline) = deadline {
        match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                timed_out = true;
                warn!(
                    script = %script.name,
                    timeout = timeout,
                    "Script reached its timeout, killing it"
                );
                if let Err(e) = child.start_kill() {
                    warn!(script = %script.name, error = %e, "Failed to kill script");
                }
                child.wait().await
            }
        }
    } else {
        child.wait().await
    };

    let pipes_closed = drain_pipes(readers, script.timeout.wait_delay).await;
    let stdout = take_output(&stdout_buf);
    let stderr = take_output(&stderr_buf);

    let mut signal = None;
    let (exit_code, run_error) = match status {
        Err(e) => (-1, Some(RunError::Wait(e))),
        Ok(status) => {
            signal = signal_name(&status);
            match status.code() {
                Some(0) if pipes_closed => (0, None),
                Some(0) => (
                    -1,
                    Some(RunError::PipesAbandoned(script.timeout.wait_delay)),
                ),
                Some(code) => (code, Some(RunError::ExitStatus(code))),
                None if timed_out => (-1, Some(RunError::TimedOut(timeout))),
                None => (
                    -1,
                    Some(RunError::Signal(
                        signal.clone().unwrap_or_else(|| "unknown".to_string()),
                    )),
                ),
            }
        }
    };

    match &run_error {
        None => debug!(
            script = %script.name,
            args = %args.join(","),
            env = %logged_env,
            stdout = %stdout,
            stderr = %stderr,
            exit_code = exit_code,
            "Script execution succeeded"
        ),
        Some(e) => error!(
            script = %script.name,
            args = %args.join(","),
            env = %logged_env,
            stdout = %stdout,
            stderr = %stderr,
            exit_code = exit_code,
            signal = signal.as_deref().unwrap_or(""),
            error = %e,
            "Script execution failed"
        ),
    }

    ExecutionOutcome {
        stdout,
        exit_code,
        error: run_error,
    }
}
