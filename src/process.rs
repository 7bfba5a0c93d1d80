//! Bounded external tool invocation.

use crate::error::{EngineError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn a non-zero exit into a `BackendFailure` carrying stderr.
    pub fn ensure_success(self, backend: &str) -> Result<Self> {
        if self.status.success() {
            return Ok(self);
        }
        let detail = if self.stderr.trim().is_empty() {
            format!("exited with {}", self.status)
        } else {
            self.stderr.trim().to_string()
        };
        Err(EngineError::backend(backend, detail))
    }
}

/// Run `program` with `args`, killing it if it exceeds `timeout`.
pub async fn run<I, S>(backend: &str, program: &Path, args: I, timeout: Duration) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {:?}", command.as_std());

    let child = command
        .spawn()
        .map_err(|e| EngineError::backend(backend, format!("could not start {}: {}", program.display(), e)))?;

    // Dropping the future on timeout drops the child, which kills it.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            Ok(ToolOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        Err(_) => {
            warn!("{} exceeded {}s, abandoning it", backend, timeout.as_secs());
            Err(EngineError::Timeout {
                tool: backend.to_string(),
                secs: timeout.as_secs(),
            })
        }
    }
}
