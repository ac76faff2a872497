//! Local process execution
//!
//! [`SystemExecutor`] runs commands with `tokio::process`, capturing stdout
//! and stderr. The child is spawned with `kill_on_drop`, so losing the race
//! against the timeout or the cancellation token kills it.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::traits::{CommandExecutor, CommandOutput, CommandSpec};

/// Runs commands as local child processes
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        debug!(command = %command, "Running command");

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(program = %command.program, "Command cancelled, killing process");
                Err(Error::Cancelled)
            }
            _ = tokio::time::sleep(timeout) => {
                error!(program = %command.program, ?timeout, "Command timed out");
                Err(Error::timeout(command.program.clone(), timeout))
            }
            result = child => {
                let output = result.map_err(|e| {
                    Error::command_failed(command.program.clone(), format!("failed to start: {}", e))
                })?;
                Ok(CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }
}
