//! The single entry point every stage uses to run a tool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

use super::executor::{CommandExecutor, Output, SystemExecutor};
use super::filter::OutputFilter;
use crate::errors::{ExternalToolError, IsoforgeError, Result};
use crate::progress::ProgressPublisher;

/// A fully described tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    check: bool,
    echo: bool,
    stdout_filter: OutputFilter,
    stderr_filter: OutputFilter,
}

impl CommandSpec {
    /// Creates a checked, echoed invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            check: true,
            echo: true,
            stdout_filter: OutputFilter::Passthrough,
            stderr_filter: OutputFilter::Passthrough,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Accepts any exit code.
    #[must_use]
    pub fn unchecked(mut self) -> Self {
        self.check = false;
        self
    }

    /// Keeps the output off the progress stream.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Filters stdout before it is surfaced.
    #[must_use]
    pub fn filter_stdout(mut self, filter: OutputFilter) -> Self {
        self.stdout_filter = filter;
        self
    }

    /// Filters stderr before it is surfaced.
    #[must_use]
    pub fn filter_stderr(mut self, filter: OutputFilter) -> Self {
        self.stderr_filter = filter;
        self
    }

    /// The program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The working directory, if one was set.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs tools, enforces the exit-code contract and surfaces filtered output.
///
/// On success the filtered stdout and stderr are published as plain progress
/// messages. On a checked failure an error line and the filtered stderr are
/// published before [`ExternalToolError`] is returned.
#[derive(Clone)]
pub struct ProcessRunner {
    executor: Arc<dyn CommandExecutor>,
    progress: Option<ProgressPublisher>,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("surfaces_output", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Arc::new(SystemExecutor))
    }
}

impl ProcessRunner {
    /// Creates a runner over `executor` that surfaces nothing.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            progress: None,
        }
    }

    /// Surfaces tool output through `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressPublisher) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs `spec` to completion.
    pub async fn run(&self, spec: &CommandSpec) -> Result<Output> {
        debug!(command = %spec, cwd = ?spec.cwd, "launching");

        let raw = self
            .executor
            .execute(spec)
            .await
            .map_err(|e| IsoforgeError::unexpected(format!("failed to launch {}: {e}", spec.program)))?;

        // Filters only shorten successful output; a failure keeps all of stderr.
        if spec.check && !raw.success() {
            error!(command = %spec.program, exit_code = ?raw.exit_code, "tool failed");
            let err = ExternalToolError::new(&spec.program, raw.exit_code, &raw.stderr);
            if let Some(progress) = &self.progress {
                progress.error("\nOops, a called system process didn't work. :^(")?;
                if !raw.stderr.trim().is_empty() {
                    progress.error(&raw.stderr)?;
                }
            }
            return Err(err.into());
        }

        let output = Output {
            stdout: spec.stdout_filter.apply(&raw.stdout),
            stderr: spec.stderr_filter.apply(&raw.stderr),
            exit_code: raw.exit_code,
        };

        if spec.echo {
            self.surface(&output)?;
        }
        Ok(output)
    }

    fn surface(&self, output: &Output) -> Result<()> {
        let Some(progress) = &self.progress else {
            return Ok(());
        };
        if !output.stdout.trim().is_empty() {
            progress.running(&output.stdout)?;
        }
        if !output.stderr.trim().is_empty() {
            progress.running(&output.stderr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::process::executor::MockCommandExecutor;
    use crate::progress::{channel, ProgressEvent, Tone};
    use pretty_assertions::assert_eq;

    fn noisy_stderr() -> String {
        (1..=20).map(|i| format!("genisoimage: {i}")).collect::<Vec<_>>().join("\n")
    }

    #[tokio::test]
    async fn test_run_success_surfaces_filtered_output() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|spec| spec.program() == "genisoimage" && spec.arguments().len() == 2 && spec.working_dir().is_none())
            .times(1)
            .returning(|_| Ok(Output::exited(0, "", noisy_stderr())));

        let (tx, rx) = channel(None);
        let runner = ProcessRunner::new(Arc::new(mock)).with_progress(tx);
        let spec = CommandSpec::new("genisoimage")
            .args(["-o", "out.iso"])
            .filter_stderr(OutputFilter::head_tail(7, 6));

        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.stderr.lines().count(), 14);

        let surfaced: Vec<ProgressEvent> = std::iter::from_fn(|| rx.poll()).collect();
        assert_eq!(surfaced.len(), 1);
        assert!(surfaced[0].message().starts_with("genisoimage: 1\n"));
        assert!(surfaced[0].message().ends_with("genisoimage: 20\n"));
    }

    #[tokio::test]
    async fn test_run_checked_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_| Ok(Output::exited(47, "", "[ERROR] \"install.wim\" does not exist")));

        let (tx, rx) = channel(None);
        let runner = ProcessRunner::new(Arc::new(mock)).with_progress(tx);
        let err = runner.run(&CommandSpec::new("wimmountrw")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        match err {
            IsoforgeError::ExternalTool(tool) => {
                assert_eq!(tool.command, "wimmountrw");
                assert_eq!(tool.exit_code, Some(47));
                assert!(tool.stderr.contains("does not exist"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let surfaced: Vec<ProgressEvent> = std::iter::from_fn(|| rx.poll()).collect();
        assert_eq!(surfaced.len(), 2);
        assert!(surfaced.iter().all(|e| e.tone() == Tone::Error));
        assert!(surfaced[1].message().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_checked_failure_keeps_full_stderr() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_| Ok(Output::exited(2, "", noisy_stderr())));

        let (tx, rx) = channel(None);
        let runner = ProcessRunner::new(Arc::new(mock)).with_progress(tx);
        let spec = CommandSpec::new("genisoimage").filter_stderr(OutputFilter::head_tail(7, 6));
        let err = runner.run(&spec).await.unwrap_err();

        match err {
            IsoforgeError::ExternalTool(tool) => {
                assert_eq!(tool.stderr.lines().count(), 20);
                assert!(tool.stderr.contains("genisoimage: 10"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let surfaced: Vec<ProgressEvent> = std::iter::from_fn(|| rx.poll()).collect();
        assert_eq!(surfaced.len(), 2);
        assert_eq!(surfaced[1].message().lines().count(), 20);
        assert!(surfaced[1].message().contains("genisoimage: 10\n"));
    }

    #[tokio::test]
    async fn test_run_unchecked_failure_is_ok() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_| Ok(Output::exited(1, "", "not mounted")));

        let runner = ProcessRunner::new(Arc::new(mock));
        let output = runner
            .run(&CommandSpec::new("wimunmount").unchecked())
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_quiet_run_publishes_nothing() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_| Ok(Output::exited(0, "chatter", "more chatter")));

        let (tx, rx) = channel(None);
        let runner = ProcessRunner::new(Arc::new(mock)).with_progress(tx);
        runner.run(&CommandSpec::new("7z").quiet()).await.unwrap();

        assert!(rx.poll().is_none());
    }

    #[tokio::test]
    async fn test_launch_failure_is_unexpected() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_| Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")));

        let runner = ProcessRunner::new(Arc::new(mock));
        let err = runner.run(&CommandSpec::new("7z")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(err.to_string().contains("failed to launch 7z"));
    }

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("wimmountrw")
            .path_arg(Path::new("/tmp/a/sources/install.wim"))
            .arg("1")
            .path_arg(Path::new("/tmp/b"));
        assert_eq!(spec.to_string(), "wimmountrw /tmp/a/sources/install.wim 1 /tmp/b");
        assert_eq!(spec.arguments().len(), 3);
    }
}
