//! # isoforge
//!
//! Builds customized Windows installation ISOs.
//!
//! A build extracts a stock ISO, mounts its install image read-write, copies
//! payloads into it, commits the image, drops an unattended-install answer
//! file at the ISO root and authors a new bootable ISO. isoforge provides:
//!
//! - **Process running**: one entry point for every external tool, with an
//!   exit-code contract and output filters
//! - **Resource tracking**: temporary directories and mounts released in
//!   reverse creation order, never removing a directory that backs a mount
//! - **Pipeline orchestration**: ordered stages, stop on first failure,
//!   cleanup that always runs exactly once
//! - **Progress reporting**: an ordered worker-to-observer channel mirrored
//!   to an append-only report log
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use isoforge::prelude::*;
//!
//! let (progress, receiver) = channel(None);
//! let builder = IsoBuilder::new(BuildConfig::default());
//! let request = BuildRequest::new("win10.iso", "custom.iso").with_boot_mode(BootMode::Uefi);
//!
//! match builder.build(request, progress).await {
//!     PipelineResult::Success(path) => println!("wrote {}", path.display()),
//!     PipelineResult::Failure(err) => eprintln!("{err}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod build;
pub mod config;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod resources;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::build::{BootMode, BuildRequest, IsoBuildContext, IsoBuilder};
    pub use crate::config::{BuildConfig, PayloadKind, PayloadSpec, ToolNames};
    pub use crate::errors::{ErrorKind, ExternalToolError, IsoforgeError, Result, ValidationError};
    pub use crate::pipeline::{Pipeline, PipelineContext, PipelineResult, PipelineRun, PipelineState, Stage};
    pub use crate::process::{CommandExecutor, CommandSpec, Output, OutputFilter, ProcessRunner, SystemExecutor};
    pub use crate::progress::{
        channel, observe, ConsoleDisplay, ProgressDisplay, ProgressEvent, ProgressPublisher, ProgressReceiver,
        ProgressState, ReportLog,
    };
    pub use crate::resources::{ResourceKind, ResourceTracker, UnmountMode};
}
