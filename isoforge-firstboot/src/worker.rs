//! The background worker.
//!
//! The worker owns its own thread and a current-thread runtime. Everything it
//! has to say goes through the progress channel; nothing flows back.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

use isoforge::errors::{error_trace, IsoforgeError, Result};
use isoforge::pipeline::{Pipeline, PipelineContext, Stage};
use isoforge::process::{CommandExecutor, ProcessRunner, SystemExecutor};
use isoforge::progress::{ProgressPublisher, ProgressState};
use isoforge::resources::{MountSettings, ResourceTracker};

use crate::config::{ConfiguredCommand, FirstBootConfig};
use crate::session::{lookup_user, SessionTable};

/// Message of the `Done` event.
pub const SUCCESS_NOTICE: &str = "Windows Configuration is Complete!";

/// Message of the `Failed` event.
pub const FAILURE_NOTICE: &str = "An exception has occurred when configuring windows 10.\nPlease check the log file.\n";

/// State shared by the payload's stages.
pub struct FirstBootContext {
    config: FirstBootConfig,
    runner: ProcessRunner,
    tracker: ResourceTracker,
    progress: ProgressPublisher,
    user: Option<String>,
}

impl FirstBootContext {
    /// User found by the session lookup.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl PipelineContext for FirstBootContext {
    fn resources(&self) -> &ResourceTracker {
        &self.tracker
    }

    fn resources_mut(&mut self) -> &mut ResourceTracker {
        &mut self.tracker
    }

    fn progress(&self) -> &ProgressPublisher {
        &self.progress
    }
}

/// Says where the log is and that closing the window is harmless.
#[derive(Debug)]
struct Announce;

#[async_trait]
impl Stage<FirstBootContext> for Announce {
    fn name(&self) -> &str {
        "announce"
    }

    fn description(&self) -> &str {
        "Closing this window will not shutdown the background process."
    }

    async fn execute(&self, ctx: &mut FirstBootContext) -> Result<()> {
        ctx.progress
            .running(format!("Log file is located at {}.\n\n", ctx.config.log_path.display()))
    }
}

#[derive(Debug)]
struct Countdown;

#[async_trait]
impl Stage<FirstBootContext> for Countdown {
    fn name(&self) -> &str {
        "countdown"
    }

    fn description(&self) -> &str {
        "Waiting for the desktop to settle."
    }

    async fn execute(&self, ctx: &mut FirstBootContext) -> Result<()> {
        let delay = ctx.config.countdown_delay();
        for i in 1..=ctx.config.countdown_steps {
            ctx.progress.running(format!("Running background process... {i}"))?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct LookupUser;

#[async_trait]
impl Stage<FirstBootContext> for LookupUser {
    fn name(&self) -> &str {
        "lookup-user"
    }

    fn description(&self) -> &str {
        "\nLooking up the console user:"
    }

    async fn execute(&self, ctx: &mut FirstBootContext) -> Result<()> {
        let Some(id) = ctx.config.session_id else {
            return ctx.progress.running("Session lookup is disabled.");
        };
        let table = SessionTable::new().map_err(|e| IsoforgeError::unexpected(e.to_string()))?;
        ctx.user = lookup_user(&ctx.runner, &table, id).await;
        match &ctx.user {
            Some(user) => ctx.progress.running(format!("Session {id} belongs to {user}.")),
            None => ctx.progress.running(format!("No user found for session {id}.")),
        }
    }
}

/// One configured command. Its output is surfaced by the runner.
#[derive(Debug)]
struct RunCommand {
    name: String,
    command: ConfiguredCommand,
}

#[async_trait]
impl Stage<FirstBootContext> for RunCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.command.heading
    }

    async fn execute(&self, ctx: &mut FirstBootContext) -> Result<()> {
        ctx.runner.run(&self.command.spec()).await?;
        Ok(())
    }
}

/// The first-boot configuration run.
#[derive(Clone)]
pub struct FirstBoot {
    config: FirstBootConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for FirstBoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirstBoot")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FirstBoot {
    /// A run that launches real processes.
    #[must_use]
    pub fn new(config: FirstBootConfig) -> Self {
        Self {
            config,
            executor: Arc::new(SystemExecutor),
        }
    }

    /// Runs commands through `executor` instead.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Announcement, countdown, user lookup, then one stage per command.
    pub fn pipeline(&self) -> Pipeline<FirstBootContext> {
        let mut pipeline = Pipeline::new("first-boot").stage(Announce).stage(Countdown).stage(LookupUser);
        for (i, command) in self.config.commands.iter().enumerate() {
            pipeline = pipeline.stage(RunCommand {
                name: format!("command-{}", i + 1),
                command: command.clone(),
            });
        }
        pipeline
    }

    /// Runs to completion and ends the progress stream.
    pub async fn run(&self, progress: ProgressPublisher) -> ProgressState {
        tokio::time::sleep(self.config.start_delay()).await;

        let outcome = self.run_stages(&progress).await;
        let state = if outcome.is_ok() { ProgressState::Done } else { ProgressState::Failed };
        if let Err(e) = report(&progress, outcome) {
            error!(error = %e, "could not publish the outcome");
            return ProgressState::Failed;
        }
        state
    }

    async fn run_stages(&self, progress: &ProgressPublisher) -> Result<()> {
        progress.ready("Starting Process...")?;

        let runner = ProcessRunner::new(Arc::clone(&self.executor)).with_progress(progress.clone());
        let tracker = ResourceTracker::new(runner.clone(), MountSettings::default());
        let mut ctx = FirstBootContext {
            config: self.config.clone(),
            runner,
            tracker,
            progress: progress.clone(),
            user: None,
        };

        let run = self.pipeline().run(&mut ctx).await;
        info!(run_id = %run.run_id, succeeded = run.succeeded(), user = ?ctx.user(), "first boot finished");
        run.into_result()
    }
}

fn report(progress: &ProgressPublisher, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => progress.finish(ProgressState::Done, SUCCESS_NOTICE),
        Err(err) => {
            progress.error("\nOops, an exception occurred. :^(")?;
            progress.error("Printing Stack Trace.")?;
            progress.error(error_trace(&err))?;
            progress.finish(ProgressState::Failed, FAILURE_NOTICE)
        }
    }
}

/// Starts `first_boot` on its own thread.
///
/// The thread's result is the terminal state it reached.
pub fn spawn(first_boot: FirstBoot, progress: ProgressPublisher) -> io::Result<JoinHandle<ProgressState>> {
    thread::Builder::new().name("firstboot-worker".to_string()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "could not start the worker runtime");
                let outcome = Err(IsoforgeError::from(e));
                if let Err(e) = report(&progress, outcome) {
                    error!(error = %e, "could not publish the outcome");
                }
                return ProgressState::Failed;
            }
        };
        runtime.block_on(first_boot.run(progress))
    })
}
