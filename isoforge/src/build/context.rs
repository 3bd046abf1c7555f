//! State shared by the build stages.

use std::path::PathBuf;
use std::sync::Arc;

use super::preflight::HostEnvironment;
use super::request::BuildRequest;
use crate::config::BuildConfig;
use crate::errors::{IsoforgeError, Result};
use crate::pipeline::PipelineContext;
use crate::process::ProcessRunner;
use crate::progress::ProgressPublisher;
use crate::resources::ResourceTracker;

/// Label of the directory the source ISO is extracted into.
pub const ISO_TREE: &str = "iso-tree";
/// Label of the empty directory the install image is mounted on.
pub const MOUNTPOINT: &str = "image-mountpoint";
/// Label of the mounted install image.
pub const INSTALL_IMAGE: &str = "install-image";

/// Everything a build stage reads or writes.
#[derive(Debug)]
pub struct IsoBuildContext {
    pub(crate) request: BuildRequest,
    pub(crate) config: BuildConfig,
    pub(crate) runner: ProcessRunner,
    pub(crate) tracker: ResourceTracker,
    pub(crate) progress: ProgressPublisher,
    pub(crate) host: Arc<dyn HostEnvironment>,
}

impl IsoBuildContext {
    /// The request being built.
    #[must_use]
    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    /// The build configuration.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Path of a live resource a stage depends on.
    pub(crate) fn live_path(&self, label: &str) -> Result<PathBuf> {
        self.tracker
            .path_of(label)
            .map(std::path::Path::to_path_buf)
            .ok_or_else(|| IsoforgeError::unexpected(format!("resource '{label}' is not live")))
    }
}

impl PipelineContext for IsoBuildContext {
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
