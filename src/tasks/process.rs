//! Subprocess execution with Ctrl-C handling

use crate::error::{Result, TutorError};
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

fn spawn_error(program: &str, err: std::io::Error) -> TutorError {
    if err.kind() == ErrorKind::NotFound {
        TutorError::BackendMissing(format!("'{}' is not installed or not in PATH", program))
    } else {
        TutorError::Io(err)
    }
}

/// Run `program` with inherited standard streams and return its exit code.
/// Ctrl-C kills the child and yields [`TutorError::Cancelled`].
pub(crate) async fn run_inherited(program: &str, args: &[String]) -> Result<i32> {
    debug!("{} {}", program, shell_join(args));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    tokio::select! {
        status = child.wait() => Ok(status?.code().unwrap_or(1)),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping {}", program);
            // The child may already be gone.
            let _ = child.kill().await;
            Err(TutorError::Cancelled)
        }
    }
}

/// Run `program` and capture its standard output; a non-zero exit is an error
pub(crate) async fn run_captured(program: &str, args: &[String]) -> Result<String> {
    debug!("{} {}", program, shell_join(args));
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = tokio::signal::ctrl_c() => return Err(TutorError::Cancelled),
    };
    if !output.status.success() {
        return Err(TutorError::TaskFailed(format!(
            "{} {} failed: {}",
            program,
            args.first().map(String::as_str).unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Printable command line, quoting arguments that contain whitespace
pub(crate) fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('\'') {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
