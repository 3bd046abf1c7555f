//! Pipeline orchestration.
//!
//! This module provides:
//! - `Stage`, one ordered unit of work with declared resource requirements
//! - `Pipeline`, which runs stages in order, stops at the first failure and
//!   always runs the cleanup phase
//! - `PipelineState`, `PipelineRun` and `PipelineResult` describing outcomes

mod orchestrator;
mod stage;
mod state;

pub use orchestrator::Pipeline;
pub use stage::{PipelineContext, Stage};
pub use state::{PipelineResult, PipelineRun, PipelineState};
