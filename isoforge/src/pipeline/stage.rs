//! The stage trait and the context stages run against.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::Result;
use crate::progress::ProgressPublisher;
use crate::resources::ResourceTracker;

/// What every pipeline context must expose to the orchestrator.
pub trait PipelineContext: Send {
    /// The tracker owning every resource created during the run.
    fn resources(&self) -> &ResourceTracker;

    /// Mutable access to the tracker.
    fn resources_mut(&mut self) -> &mut ResourceTracker;

    /// Where stage headings and tool output go.
    fn progress(&self) -> &ProgressPublisher;
}

/// One ordered unit of pipeline work.
///
/// A stage runs at most once per run and is never retried.
#[async_trait]
pub trait Stage<C: Send>: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Status line published before the stage runs.
    fn description(&self) -> &str {
        self.name()
    }

    /// Labels of resources that must be live before the stage starts.
    fn requires(&self) -> &[&'static str] {
        &[]
    }

    /// Executes the stage.
    async fn execute(&self, ctx: &mut C) -> Result<()>;
}
