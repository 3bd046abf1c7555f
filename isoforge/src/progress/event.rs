//! Progress states and events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    /// The worker has started.
    Ready,
    /// The worker is making progress.
    Running,
    /// The worker finished successfully.
    Done,
    /// The worker gave up.
    Failed,
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl ProgressState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// How a message should be rendered. The log file ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Tool output and ordinary notes.
    #[default]
    Plain,
    /// A status line announcing a step.
    Heading,
    /// A diagnostic.
    Error,
}

/// One message from a worker to its observer.
///
/// The message always ends in exactly one `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    state: ProgressState,
    message: String,
    #[serde(default)]
    tone: Tone,
}

impl ProgressEvent {
    /// Creates a plain event, normalizing the trailing newline.
    #[must_use]
    pub fn new(state: ProgressState, message: impl AsRef<str>) -> Self {
        Self {
            state,
            message: normalize_message(message.as_ref()),
            tone: Tone::Plain,
        }
    }

    /// Sets the rendering tone.
    #[must_use]
    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    /// The state carried by this event.
    #[must_use]
    pub fn state(&self) -> ProgressState {
        self.state
    }

    /// The newline-terminated message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The rendering tone.
    #[must_use]
    pub fn tone(&self) -> Tone {
        self.tone
    }

    /// Returns true if this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Collapses any run of trailing newlines into exactly one.
#[must_use]
pub fn normalize_message(message: &str) -> String {
    let mut normalized = message.trim_end_matches('\n').to_string();
    normalized.push('\n');
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_adds_missing_newline() {
        assert_eq!(normalize_message("Running background process... 1"), "Running background process... 1\n");
    }

    #[test]
    fn test_normalize_collapses_extra_newlines() {
        assert_eq!(normalize_message("Log file is located at C:\\x.txt.\n\n"), "Log file is located at C:\\x.txt.\n");
        assert_eq!(normalize_message("done\n"), "done\n");
        assert_eq!(normalize_message(""), "\n");
    }

    #[test]
    fn test_normalize_keeps_leading_newline() {
        assert_eq!(normalize_message("\nTime taken in minutes: 2"), "\nTime taken in minutes: 2\n");
    }

    #[test]
    fn test_event_normalizes_on_construction() {
        let event = ProgressEvent::new(ProgressState::Running, "copying");
        assert_eq!(event.message(), "copying\n");
        assert_eq!(event.tone(), Tone::Plain);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProgressState::Done.is_terminal());
        assert!(ProgressState::Failed.is_terminal());
        assert!(!ProgressState::Ready.is_terminal());
        assert!(!ProgressState::Running.is_terminal());
    }

    #[test]
    fn test_state_serialize() {
        let json = serde_json::to_string(&ProgressState::Failed).unwrap();
        assert_eq!(json, r#""failed""#);
    }
}
