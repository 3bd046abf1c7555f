//! Run states and outcomes.

use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::IsoforgeError;
use crate::resources::CleanupFailure;

/// Where a run is in its lifecycle.
///
/// `Succeeded` and `Aborted` are terminal. There is no transition out of
/// `Aborted`: a failed stage ends the run.
#[derive(Debug)]
pub enum PipelineState {
    /// Nothing has run yet.
    NotStarted,
    /// A stage is executing.
    Running {
        /// Zero-based position of the stage.
        stage_index: usize,
        /// Its name.
        stage: String,
    },
    /// Every stage finished.
    Succeeded,
    /// A stage failed and the run stopped there.
    Aborted {
        /// Zero-based position of the failed stage.
        stage_index: usize,
        /// Its name.
        stage: String,
        /// Why it failed.
        error: IsoforgeError,
    },
}

impl PipelineState {
    /// Returns true for `Succeeded` and `Aborted`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running { stage, .. } => write!(f, "running({stage})"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Aborted { stage, .. } => write!(f, "aborted({stage})"),
        }
    }
}

/// Everything a finished run reports.
#[derive(Debug)]
pub struct PipelineRun {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Terminal state.
    pub state: PipelineState,
    /// Names of the stages that completed, in order.
    pub completed: Vec<String>,
    /// Resources that could not be released during cleanup.
    pub cleanup_failures: Vec<CleanupFailure>,
    /// Wall time of the stages and cleanup, in milliseconds.
    pub duration_ms: f64,
}

impl PipelineRun {
    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.state, PipelineState::Succeeded)
    }

    /// The failing stage's name, if the run aborted.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        match &self.state {
            PipelineState::Aborted { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// The abort error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&IsoforgeError> {
        match &self.state {
            PipelineState::Aborted { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Converts into `Ok(())` or the abort error.
    pub fn into_result(self) -> Result<(), IsoforgeError> {
        match self.state {
            PipelineState::Aborted { error, .. } => Err(error),
            PipelineState::Succeeded => Ok(()),
            other => Err(IsoforgeError::unexpected(format!("run ended in non-terminal state {other}"))),
        }
    }
}

/// Terminal outcome of a build.
#[derive(Debug)]
pub enum PipelineResult {
    /// The output image exists at this path.
    Success(PathBuf),
    /// The run failed.
    Failure(IsoforgeError),
}

impl PipelineResult {
    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success(_) => 0,
            Self::Failure(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn run(state: PipelineState) -> PipelineRun {
        PipelineRun {
            run_id: Uuid::new_v4(),
            state,
            completed: Vec::new(),
            cleanup_failures: Vec::new(),
            duration_ms: 0.0,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PipelineState::NotStarted.is_terminal());
        assert!(!PipelineState::Running { stage_index: 0, stage: "extract".into() }.is_terminal());
        assert!(PipelineState::Succeeded.is_terminal());
    }

    #[test]
    fn test_aborted_run_reports_stage_and_error() {
        let aborted = run(PipelineState::Aborted {
            stage_index: 2,
            stage: "mount".into(),
            error: IsoforgeError::unexpected("boom"),
        });
        assert!(!aborted.succeeded());
        assert_eq!(aborted.failed_stage(), Some("mount"));
        assert_eq!(aborted.state.to_string(), "aborted(mount)");
        assert_eq!(aborted.into_result().unwrap_err().kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn test_non_terminal_run_is_an_error() {
        assert!(run(PipelineState::NotStarted).into_result().is_err());
        assert!(run(PipelineState::Succeeded).into_result().is_ok());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PipelineResult::Success(PathBuf::from("/tmp/out.iso")).exit_code(), 0);
        assert_eq!(PipelineResult::Failure(IsoforgeError::unexpected("x")).exit_code(), 1);
    }
}
