//! The raw process-launching seam.

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::process::Command;

use super::runner::CommandSpec;

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code, or `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl Output {
    /// Creates an output that exited with `code`.
    #[must_use]
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(code),
        }
    }

    /// Returns true for exit code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launches one program and waits for it.
///
/// Implementations capture both streams and never interpret the exit code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs the program named by `spec` with its arguments and working directory.
    async fn execute(&self, spec: &CommandSpec) -> io::Result<Output>;
}

/// Runs real processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(&self, spec: &CommandSpec) -> io::Result<Output> {
        let mut command = Command::new(spec.program());
        command
            .args(spec.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.working_dir() {
            command.current_dir(dir);
        }

        let output = command.output().await?;
        Ok(Output {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
