// # Command Executor Trait
//
// Defines how provisioning steps invoke external programs.
//
// Commands are always an explicit program plus argument vector. Nothing is
// ever passed through a shell, so a domain name can only ever end up as a
// single argument.
//
// ## Implementations
//
// - Local processes: [`crate::exec::SystemExecutor`]
// - Test doubles: `tests/common/mod.rs`

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A structured external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments, passed as-is
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    pub fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    /// Run this command through a wrapper program (e.g. `sudo`)
    ///
    /// `None` leaves the command untouched.
    pub fn wrapped(self, wrapper: Option<&str>) -> Self {
        match wrapper {
            Some(wrapper) => {
                let mut args = Vec::with_capacity(self.args.len() + 1);
                args.push(self.program);
                args.extend(self.args);
                Self {
                    program: wrapper.to_string(),
                    args,
                }
            }
            None => self,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a finished process produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` when terminated by a signal)
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// A successful, silent exit
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    /// A failed exit with the given stderr text
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Diagnostic text for a failed process
    ///
    /// stderr if the process wrote any, otherwise stdout, otherwise the exit status.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Trait for running external commands
///
/// # Contract
///
/// - `execute` returns `Ok` for any process that ran to completion, whatever
///   its exit code.
/// - A process that cannot be started is `Err(Error::CommandFailed)`.
/// - A process still running after `timeout` is killed and reported as
///   `Err(Error::Timeout)`.
/// - A process still running when `cancel` fires is killed and reported as
///   `Err(Error::Cancelled)`.
/// - No retries.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion
    async fn execute(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, crate::Error>;

    /// Run a command and treat a non-zero exit as an error
    ///
    /// The error carries the process's own diagnostic text.
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, crate::Error> {
        let output = self.execute(command, timeout, cancel).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(crate::Error::command_failed(
                command.program.clone(),
                output.diagnostic(),
            ))
        }
    }
}
