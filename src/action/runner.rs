/// Child process execution for actions.
///
/// Launches the action's command with an already expanded argument
/// vector, buffers stdout/stderr to completion and normalizes the exit
/// status. The child never inherits our stdin (the console transport
/// reads it).
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::{debug, warn};

use super::{ActionDefinition, ActionError, ExecutionResult, RunOutcome};

/// Exit code reported when the real one cannot be obtained
const FAILURE_EXIT_CODE: i32 = 1;

/// Runs `def.command` with `argv` and waits for it to finish.
///
/// Always returns a populated `ExecutionResult`:
/// - exited normally → real exit code, `NonZeroExit` error if it isn't 0
/// - killed by a signal → exit code 1, stderr describes the signal
/// - could not be started, or waiting failed → exit code 1, stderr holds
///   the OS error, `LaunchFailure` error
pub async fn run(def: &ActionDefinition, argv: &[String]) -> RunOutcome {
    let mut command = Command::new(&def.command);
    command
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // A dropped invocation frees the gate, the child must not outlive it
        .kill_on_drop(true);

    if let Some(dir) = def.resolved_working_dir() {
        debug!("Action {} runs in {}", def.name, dir.display());
        command.current_dir(dir);
    }

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Could not start {} for action {}: {e}", def.command, def.name);
            return launch_failure(def, e);
        }
    };

    let output = match child.wait_with_output().await {
        Ok(output) => output,
        Err(e) => {
            warn!("Could not wait for {} (action {}): {e}", def.command, def.name);
            return launch_failure(def, e);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let exit_code = match normalize_status(output.status) {
        Ok(code) => code,
        Err(reason) => {
            warn!(
                "Could not get exit code for {} {:?}: {reason}",
                def.command, argv
            );
            if stderr.is_empty() {
                stderr = reason;
            }
            FAILURE_EXIT_CODE
        }
    };

    let error = (exit_code != 0).then(|| ActionError::NonZeroExit {
        action: def.name.clone(),
        code: exit_code,
    });

    RunOutcome {
        result: ExecutionResult {
            exit_code,
            stdout,
            stderr,
        },
        error,
    }
}

/// Nothing was captured, so the OS error becomes the stderr content.
fn launch_failure(def: &ActionDefinition, e: std::io::Error) -> RunOutcome {
    RunOutcome {
        result: ExecutionResult {
            exit_code: FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: e.to_string(),
        },
        error: Some(ActionError::LaunchFailure {
            action: def.name.clone(),
            command: def.command.clone(),
            source: e,
        }),
    }
}

/// The one place that knows about platform exit statuses.
///
/// `Err` carries a description when no exit code exists (Unix signals).
fn normalize_status(status: ExitStatus) -> Result<i32, String> {
    if let Some(code) = status.code() {
        return Ok(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(format!("terminated by signal {signal}"));
        }
    }

    Err(format!("no exit status available ({status})"))
}
