//! Sequential stage execution with guaranteed cleanup.

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::stage::{PipelineContext, Stage};
use super::state::{PipelineRun, PipelineState};
use crate::errors::{IsoforgeError, Result};
use crate::observability::Stopwatch;
use crate::resources::CleanupFailure;

/// An ordered list of stages.
///
/// [`Pipeline::run`] executes the stages one after another, stops at the
/// first failure and then always releases every tracked resource, exactly
/// once, in reverse creation order.
pub struct Pipeline<C: Send> {
    name: String,
    stages: Vec<Box<dyn Stage<C>>>,
    cleanup_notice: Option<String>,
}

impl<C: Send> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<C: PipelineContext> Pipeline<C> {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            cleanup_notice: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Status line published when the cleanup phase starts.
    #[must_use]
    pub fn with_cleanup_notice(mut self, notice: impl Into<String>) -> Self {
        self.cleanup_notice = Some(notice.into());
        self
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if there are no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage against `ctx`, then cleans up.
    pub async fn run(&self, ctx: &mut C) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", pipeline = %self.name, %run_id);
        self.run_inner(ctx, run_id).instrument(span).await
    }

    async fn run_inner(&self, ctx: &mut C, run_id: Uuid) -> PipelineRun {
        let timer = Stopwatch::start(&self.name);
        let mut state = PipelineState::NotStarted;
        let mut completed = Vec::with_capacity(self.stages.len());
        info!(stages = self.stages.len(), "pipeline started");

        for (stage_index, stage) in self.stages.iter().enumerate() {
            state = PipelineState::Running {
                stage_index,
                stage: stage.name().to_string(),
            };

            let stage_timer = Stopwatch::start(stage.name());
            match Self::run_stage(stage.as_ref(), ctx).await {
                Ok(()) => {
                    info!(stage = stage.name(), duration_ms = stage_timer.stop(), "stage completed");
                    completed.push(stage.name().to_string());
                }
                Err(err) => {
                    error!(stage = stage.name(), kind = %err.kind(), error = %err, "stage failed");
                    state = PipelineState::Aborted {
                        stage_index,
                        stage: stage.name().to_string(),
                        error: err,
                    };
                    break;
                }
            }
        }

        if !state.is_terminal() {
            state = PipelineState::Succeeded;
        }

        let cleanup_failures = self.cleanup(ctx).await;
        let duration_ms = timer.stop();
        info!(state = %state, duration_ms, "pipeline finished");

        PipelineRun {
            run_id,
            state,
            completed,
            cleanup_failures,
            duration_ms,
        }
    }

    async fn run_stage(stage: &dyn Stage<C>, ctx: &mut C) -> Result<()> {
        if let Some(missing) = stage.requires().iter().find(|label| !ctx.resources().is_live(label)) {
            return Err(IsoforgeError::unexpected(format!(
                "stage '{}' needs resource '{missing}', which is not live",
                stage.name()
            )));
        }

        ctx.progress().heading(stage.description())?;

        match AssertUnwindSafe(stage.execute(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(IsoforgeError::unexpected(format!(
                "stage '{}' panicked: {}",
                stage.name(),
                panic_message(payload.as_ref())
            ))),
        }
    }

    async fn cleanup(&self, ctx: &mut C) -> Vec<CleanupFailure> {
        if let Some(notice) = &self.cleanup_notice {
            if let Err(e) = ctx.progress().heading(notice) {
                warn!(error = %e, "could not publish cleanup notice");
            }
        }

        let failures = ctx.resources_mut().release_all().await;
        for failure in &failures {
            let line = format!("Could not release {}: {}", failure.label, failure.message);
            if let Err(e) = ctx.progress().error(&line) {
                warn!(error = %e, "could not publish cleanup failure");
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessRunner;
    use crate::progress::{channel, ProgressPublisher, ProgressReceiver};
    use crate::resources::{MountSettings, ResourceTracker};
    use crate::testing::FakeToolchain;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct TestContext {
        tracker: ResourceTracker,
        progress: ProgressPublisher,
        created: Vec<PathBuf>,
    }

    impl PipelineContext for TestContext {
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

    fn context(root: &std::path::Path) -> (TestContext, ProgressReceiver) {
        let runner = ProcessRunner::new(Arc::new(FakeToolchain::new()));
        let tracker = ResourceTracker::new(runner, MountSettings::default()).with_temp_root(root);
        let (progress, rx) = channel(None);
        (
            TestContext {
                tracker,
                progress,
                created: Vec::new(),
            },
            rx,
        )
    }

    #[derive(Debug)]
    struct MakeDir(&'static str);

    #[async_trait]
    impl Stage<TestContext> for MakeDir {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, ctx: &mut TestContext) -> Result<()> {
            let path = ctx.tracker.create_temp_dir(self.0).await?;
            ctx.created.push(path);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Fail;

    #[async_trait]
    impl Stage<TestContext> for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        async fn execute(&self, _ctx: &mut TestContext) -> Result<()> {
            Err(IsoforgeError::unexpected("injected"))
        }
    }

    #[derive(Debug)]
    struct Panic;

    #[async_trait]
    impl Stage<TestContext> for Panic {
        fn name(&self) -> &str {
            "panic"
        }

        async fn execute(&self, _ctx: &mut TestContext) -> Result<()> {
            panic!("stage blew up");
        }
    }

    #[derive(Debug)]
    struct Needs(&'static str);

    #[async_trait]
    impl Stage<TestContext> for Needs {
        fn name(&self) -> &str {
            "needs"
        }

        fn requires(&self) -> &[&'static str] {
            std::slice::from_ref(&self.0)
        }

        async fn execute(&self, _ctx: &mut TestContext) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Counter(Mutex<usize>);

    #[async_trait]
    impl Stage<TestContext> for Arc<Counter> {
        fn name(&self) -> &str {
            "count"
        }

        async fn execute(&self, _ctx: &mut TestContext) -> Result<()> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_still_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let (mut ctx, _rx) = context(root.path());
        let pipeline = Pipeline::new("test").stage(MakeDir("a")).stage(MakeDir("b"));

        let run = pipeline.run(&mut ctx).await;

        assert!(run.succeeded());
        assert_eq!(run.completed, vec!["a", "b"]);
        assert!(ctx.created.iter().all(|p| !p.exists()));
        assert_eq!(ctx.tracker.live_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_stops_and_unwinds() {
        let root = tempfile::tempdir().unwrap();
        let (mut ctx, _rx) = context(root.path());
        let counter = Arc::new(Counter::default());
        let pipeline = Pipeline::new("test")
            .stage(MakeDir("a"))
            .stage(Fail)
            .stage(Arc::clone(&counter));

        let run = pipeline.run(&mut ctx).await;

        assert_eq!(run.failed_stage(), Some("fail"));
        assert!(matches!(run.state, PipelineState::Aborted { stage_index: 1, .. }));
        assert_eq!(*counter.0.lock(), 0);
        assert!(!ctx.created[0].exists());
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_unexpected() {
        let root = tempfile::tempdir().unwrap();
        let (mut ctx, _rx) = context(root.path());
        let pipeline = Pipeline::new("test").stage(MakeDir("a")).stage(Panic);

        let run = pipeline.run(&mut ctx).await;

        let err = run.error().unwrap();
        assert!(err.to_string().contains("stage blew up"));
        assert!(!ctx.created[0].exists());
    }

    #[tokio::test]
    async fn test_missing_requirement_aborts_before_execute() {
        let root = tempfile::tempdir().unwrap();
        let (mut ctx, _rx) = context(root.path());
        let pipeline = Pipeline::new("test").stage(Needs("iso-tree"));

        let run = pipeline.run(&mut ctx).await;
        assert!(run.error().unwrap().to_string().contains("iso-tree"));
    }

    #[tokio::test]
    async fn test_headings_and_cleanup_notice() {
        let root = tempfile::tempdir().unwrap();
        let (mut ctx, rx) = context(root.path());
        let pipeline = Pipeline::new("test")
            .stage(MakeDir("a"))
            .with_cleanup_notice("Cleaning up.");

        pipeline.run(&mut ctx).await;

        let messages: Vec<String> = std::iter::from_fn(|| rx.poll()).map(|e| e.message().to_string()).collect();
        assert_eq!(messages, vec!["a\n", "Cleaning up.\n"]);
    }

    #[test]
    fn test_debug_lists_stage_names() {
        let pipeline: Pipeline<TestContext> = Pipeline::new("build").stage(MakeDir("extract")).stage(Fail);
        let debug = format!("{pipeline:?}");
        assert!(debug.starts_with("Pipeline {"));
        assert!(debug.contains(r#"name: "build""#));
        assert!(debug.contains(r#"stages: ["extract", "fail"]"#));
    }

    #[tokio::test]
    async fn test_empty_pipeline_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let (mut ctx, _rx) = context(root.path());
        let pipeline: Pipeline<TestContext> = Pipeline::new("empty");
        assert!(pipeline.is_empty());
        assert!(pipeline.run(&mut ctx).await.succeeded());
    }
}
