//! Error types for isoforge.
//!
//! Every failure a build can hit falls into one of four kinds: a failed
//! preflight check, a tool that exited non-zero, a resource that could not be
//! created, or anything else. [`IsoforgeError::kind`] reports which.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = IsoforgeError> = std::result::Result<T, E>;

/// The main error type for isoforge operations.
#[derive(Debug, Error)]
pub enum IsoforgeError {
    /// A preflight check failed before any resource was touched.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An external tool exited with a non-zero status.
    #[error(transparent)]
    ExternalTool(#[from] ExternalToolError),

    /// A temporary directory or a mount could not be created.
    #[error("Failed to create {resource}")]
    ResourceCreation {
        /// Label of the resource being created.
        resource: String,
        /// What went wrong underneath.
        #[source]
        source: Box<IsoforgeError>,
    },

    /// A directory was about to be removed while an image is still mounted inside it.
    #[error("Refusing to remove {}: an image is still mounted there", path.display())]
    ResourceInUse {
        /// The directory that must not be removed yet.
        path: PathBuf,
    },

    /// The configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IsoforgeError {
    /// Wraps an error raised while creating the named resource.
    #[must_use]
    pub fn resource_creation(resource: impl Into<String>, source: Self) -> Self {
        Self::ResourceCreation {
            resource: resource.into(),
            source: Box::new(source),
        }
    }

    /// Creates an unexpected error.
    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::ExternalTool(_) => ErrorKind::ExternalTool,
            Self::ResourceCreation { .. } => ErrorKind::ResourceCreation,
            Self::ResourceInUse { .. } | Self::Config(_) | Self::Unexpected(_) | Self::Io(_) => {
                ErrorKind::Unexpected
            }
        }
    }
}

/// The four kinds of failure a run can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Preflight failure.
    Validation,
    /// Non-zero exit from an invoked tool.
    ExternalTool,
    /// A mount or directory operation failed outright.
    ResourceCreation,
    /// Anything else.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::ExternalTool => write!(f, "external_tool"),
            Self::ResourceCreation => write!(f, "resource_creation"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Error raised when a preflight check fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// Hint for fixing the problem.
    pub hint: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Error raised when an external tool exits unsuccessfully.
#[derive(Debug, Clone, Error)]
#[error("{command} exited with {}", exit_code.map_or_else(|| "no status (killed by signal)".to_string(), |c| format!("status {c}")))]
pub struct ExternalToolError {
    /// The program that was run.
    pub command: String,
    /// Its exit code, if it exited normally.
    pub exit_code: Option<i32>,
    /// Captured standard error, after output filtering.
    pub stderr: String,
}

impl ExternalToolError {
    /// Creates a new external tool error.
    #[must_use]
    pub fn new(command: impl Into<String>, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }
}

/// Formats an error and its chain of sources, one per line.
#[must_use]
pub fn error_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // Wrappers that print their source inline would repeat it.
        if !trace.ends_with(&text) {
            trace.push_str("\nCaused by: ");
            trace.push_str(&text);
        }
        source = cause.source();
    }
    trace
}

impl From<serde_json::Error> for IsoforgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let validation: IsoforgeError = ValidationError::new("missing input").into();
        assert_eq!(validation.kind(), ErrorKind::Validation);

        let tool: IsoforgeError = ExternalToolError::new("7z", Some(2), "boom").into();
        assert_eq!(tool.kind(), ErrorKind::ExternalTool);

        let creation = IsoforgeError::resource_creation("install-image", tool);
        assert_eq!(creation.kind(), ErrorKind::ResourceCreation);

        let io: IsoforgeError = std::io::Error::other("disk gone").into();
        assert_eq!(io.kind(), ErrorKind::Unexpected);

        let in_use = IsoforgeError::ResourceInUse { path: PathBuf::from("/tmp/x") };
        assert_eq!(in_use.kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn test_external_tool_error_display() {
        let err = ExternalToolError::new("wimmountrw", Some(47), "no such image");
        assert_eq!(err.to_string(), "wimmountrw exited with status 47");

        let killed = ExternalToolError::new("genisoimage", None, "");
        assert!(killed.to_string().contains("killed by signal"));
    }

    #[test]
    fn test_resource_creation_keeps_source() {
        let inner: IsoforgeError = ExternalToolError::new("wimmountrw", Some(1), "").into();
        let err = IsoforgeError::resource_creation("install-image", inner);

        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("wimmountrw exited with status 1"));
        assert!(err.to_string().starts_with("Failed to create install-image"));
    }

    #[test]
    fn test_validation_error_hint() {
        let err = ValidationError::new("The program, 7z, is not installed.")
            .with_hint("install p7zip-full");
        assert_eq!(err.hint.as_deref(), Some("install p7zip-full"));
        assert_eq!(err.to_string(), "The program, 7z, is not installed.");
    }

    #[test]
    fn test_error_trace_walks_sources() {
        let inner: IsoforgeError = ExternalToolError::new("wimmountrw", Some(47), "").into();
        let err = IsoforgeError::resource_creation("install-image", inner);
        assert_eq!(
            error_trace(&err),
            "Failed to create install-image\nCaused by: wimmountrw exited with status 47"
        );

        let io: IsoforgeError = std::io::Error::other("disk gone").into();
        assert_eq!(error_trace(&io), "IO error: disk gone");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ExternalTool.to_string(), "external_tool");
        assert_eq!(ErrorKind::ResourceCreation.to_string(), "resource_creation");
    }
}
