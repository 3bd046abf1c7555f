//! The customized-ISO build.
//!
//! [`IsoBuilder`] wires the seven stages into a [`Pipeline`], runs it and
//! turns the outcome into a [`PipelineResult`], reporting both on the
//! progress stream.

mod context;
mod copy;
mod preflight;
mod request;
mod stages;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub use context::{IsoBuildContext, INSTALL_IMAGE, ISO_TREE, MOUNTPOINT};
pub use copy::{copy_file, copy_tree};
pub use preflight::{validate, HostEnvironment, SystemEnvironment};
pub use request::{BootMode, BuildRequest};
pub use stages::{
    CommitImage, CopyPayloads, ExtractIso, MountImage, Preflight, Repackage, WriteAnswerFile, ANSWER_FILE_NAME,
};

use crate::config::BuildConfig;
use crate::errors::{error_trace, ErrorKind, IsoforgeError, Result};
use crate::pipeline::{Pipeline, PipelineResult, PipelineRun};
use crate::process::{CommandExecutor, ProcessRunner, SystemExecutor};
use crate::progress::{ProgressPublisher, ProgressState};
use crate::resources::{MountSettings, ResourceTracker};

/// Builds customized installation ISOs.
#[derive(Clone)]
pub struct IsoBuilder {
    config: BuildConfig,
    executor: Arc<dyn CommandExecutor>,
    host: Arc<dyn HostEnvironment>,
    temp_root: Option<PathBuf>,
}

impl fmt::Debug for IsoBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsoBuilder")
            .field("config", &self.config)
            .field("host", &self.host)
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}

impl IsoBuilder {
    /// A builder running real tools on this machine.
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            executor: Arc::new(SystemExecutor),
            host: Arc::new(SystemEnvironment),
            temp_root: None,
        }
    }

    /// Runs tools through `executor` instead.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Answers preflight questions through `host` instead.
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn HostEnvironment>) -> Self {
        self.host = host;
        self
    }

    /// Creates working directories under `root`.
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The stages, in order.
    #[must_use]
    pub fn pipeline() -> Pipeline<IsoBuildContext> {
        Pipeline::new("iso-build")
            .stage(Preflight)
            .stage(ExtractIso)
            .stage(MountImage)
            .stage(CopyPayloads)
            .stage(CommitImage)
            .stage(WriteAnswerFile)
            .stage(Repackage)
            .with_cleanup_notice("\nCleaning up.")
    }

    /// Runs the stages and cleanup without ending the progress stream.
    pub async fn run(&self, request: BuildRequest, progress: ProgressPublisher) -> PipelineRun {
        let runner = ProcessRunner::new(Arc::clone(&self.executor)).with_progress(progress.clone());
        let mut tracker = ResourceTracker::new(runner.clone(), MountSettings::from_config(&self.config));
        if let Some(root) = &self.temp_root {
            tracker = tracker.with_temp_root(root);
        }

        let mut ctx = IsoBuildContext {
            request,
            config: self.config.clone(),
            runner,
            tracker,
            progress,
            host: Arc::clone(&self.host),
        };

        let run = Self::pipeline().run(&mut ctx).await;
        info!(run_id = %run.run_id, succeeded = run.succeeded(), "build finished");
        if !run.cleanup_failures.is_empty() {
            warn!(count = run.cleanup_failures.len(), "resources left behind");
        }
        run
    }

    /// Runs one build and ends the progress stream with `Done` or `Failed`.
    pub async fn build(&self, request: BuildRequest, progress: ProgressPublisher) -> PipelineResult {
        let output = request.output.clone();
        let run = self.run(request, progress.clone()).await;

        let result = match run.into_result() {
            Ok(()) => PipelineResult::Success(stages::absolute(&output)),
            Err(err) => PipelineResult::Failure(err),
        };
        if let Err(e) = report(&progress, &result) {
            warn!(error = %e, "could not publish the build outcome");
        }
        result
    }
}

fn report(progress: &ProgressPublisher, result: &PipelineResult) -> Result<()> {
    match result {
        PipelineResult::Success(path) => progress.finish(
            ProgressState::Done,
            format!("\nThe custom Windows ISO has been successfully made.\n{}", path.display()),
        ),
        PipelineResult::Failure(err) => {
            report_error(progress, err)?;
            progress.finish(ProgressState::Failed, "Failed to make the custom Windows ISO.")
        }
    }
}

fn report_error(progress: &ProgressPublisher, err: &IsoforgeError) -> Result<()> {
    if err.kind() == ErrorKind::Validation {
        progress.error(format!("\n{err}"))?;
        if let IsoforgeError::Validation(validation) = err {
            if let Some(hint) = &validation.hint {
                progress.error(format!("Hint: {hint}"))?;
            }
        }
        return Ok(());
    }
    progress.error("\nOops, an exception occurred. :^(")?;
    progress.error("Printing Stack Trace.")?;
    progress.error(error_trace(err))
}
