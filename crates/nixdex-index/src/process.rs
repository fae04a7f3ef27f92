//! Subprocess execution with a hard timeout
//!
//! `git` and `nix` are treated as opaque collaborators. Every invocation goes
//! through [`run_with_timeout`], which kills the child when the deadline
//! passes instead of leaving it running behind the indexer.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Captured result of a finished subprocess
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
}

/// Runs `program args...` in `dir`, capturing output.
///
/// A non-zero exit is *not* an error here; callers inspect
/// [`ProcessOutput::exit_code`] and `stderr` themselves.
pub async fn run_with_timeout(
    program: &str,
    args: &[&str],
    dir: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProcessError::Timeout {
            program: program.to_string(),
            timeout,
        })?
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        elapsed: start.elapsed(),
    })
}
