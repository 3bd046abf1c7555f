//! Ownership and release of the resources a run creates.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::resource::{MountState, Resource, ResourceHandle, ResourceRequest, UnmountMode};
use crate::config::BuildConfig;
use crate::errors::{IsoforgeError, Result};
use crate::process::{CommandSpec, OutputFilter, ProcessRunner};

/// How mounts are created and torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSettings {
    /// Read-write mount program.
    pub mount_program: String,
    /// Unmount program.
    pub unmount_program: String,
    /// Filter for the unmount program's stdout.
    pub unmount_filter: OutputFilter,
    /// Wait after a committing unmount before the tree is reused.
    pub settle_delay: Duration,
}

impl MountSettings {
    /// Derives the settings from a build configuration.
    #[must_use]
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            mount_program: config.tools.mount.clone(),
            unmount_program: config.tools.unmount.clone(),
            unmount_filter: config.unmount_filter(),
            settle_delay: config.settle_delay(),
        }
    }
}

impl Default for MountSettings {
    fn default() -> Self {
        Self::from_config(&BuildConfig::default())
    }
}

/// A resource that could not be released during cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Label of the resource.
    pub label: String,
    /// Why it failed.
    pub message: String,
}

#[derive(Debug)]
struct Entry {
    label: String,
    resource: Resource,
    released: bool,
}

/// Tracks live resources in creation order.
///
/// Release runs in reverse creation order so a mount always goes before the
/// directories backing it. A directory that still backs a live mount is never
/// removed.
#[derive(Debug)]
pub struct ResourceTracker {
    runner: ProcessRunner,
    mounts: MountSettings,
    temp_root: PathBuf,
    entries: Vec<Entry>,
}

impl ResourceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(runner: ProcessRunner, mounts: MountSettings) -> Self {
        Self {
            runner,
            mounts,
            temp_root: std::env::temp_dir(),
            entries: Vec::new(),
        }
    }

    /// Creates temporary directories under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    /// Creates the requested resource and starts tracking it.
    ///
    /// Nothing is tracked if creation fails.
    pub async fn acquire(&mut self, label: &str, request: ResourceRequest) -> Result<ResourceHandle> {
        if self.is_live(label) {
            return Err(IsoforgeError::unexpected(format!("resource '{label}' is already live")));
        }

        let resource = match request {
            ResourceRequest::TempDirectory => self
                .make_temp_dir()
                .map_err(|e| IsoforgeError::resource_creation(label, e.into()))?,
            ResourceRequest::MountedImage { image, index, mountpoint } => {
                self.mount(&image, index, &mountpoint)
                    .await
                    .map_err(|e| IsoforgeError::resource_creation(label, e))?;
                Resource::MountedImage {
                    image,
                    index,
                    mountpoint,
                    state: MountState::Mounted,
                }
            }
        };

        info!(label, kind = %resource.kind(), path = %resource.path().display(), "acquired resource");
        self.entries.push(Entry {
            label: label.to_string(),
            resource,
            released: false,
        });
        Ok(ResourceHandle(self.entries.len() - 1))
    }

    /// Creates and tracks a temporary directory, returning its path.
    pub async fn create_temp_dir(&mut self, label: &str) -> Result<PathBuf> {
        let handle = self.acquire(label, ResourceRequest::TempDirectory).await?;
        Ok(self.entries[handle.0].resource.path().to_path_buf())
    }

    /// Mounts an image read-write and tracks the mount.
    pub async fn mount_image(&mut self, label: &str, image: &Path, index: u32, mountpoint: &Path) -> Result<ResourceHandle> {
        let request = ResourceRequest::MountedImage {
            image: image.to_path_buf(),
            index,
            mountpoint: mountpoint.to_path_buf(),
        };
        self.acquire(label, request).await
    }

    /// Releases one resource. Releasing twice is a no-op.
    ///
    /// `mode` only matters for mounts. A committing unmount is followed by the
    /// settling delay.
    pub async fn release(&mut self, handle: ResourceHandle, mode: UnmountMode) -> Result<()> {
        let Some(entry) = self.entries.get(handle.0) else {
            return Err(IsoforgeError::unexpected(format!("unknown resource handle {}", handle.0)));
        };
        if entry.released {
            return Ok(());
        }

        match entry.resource.clone() {
            Resource::TempDirectory { path } => {
                if let Some(pinning) = self.live_mount_inside(&path) {
                    warn!(dir = %path.display(), mount = %pinning.display(), "directory still backs a mount");
                    return Err(IsoforgeError::ResourceInUse { path });
                }
                remove_dir(&path)?;
                self.entries[handle.0].released = true;
            }
            Resource::MountedImage { mountpoint, .. } => {
                self.unmount(&mountpoint, mode).await?;
                let entry = &mut self.entries[handle.0];
                if let Resource::MountedImage { state, .. } = &mut entry.resource {
                    *state = mode.into();
                }
                entry.released = true;
                if mode == UnmountMode::Commit && !self.mounts.settle_delay.is_zero() {
                    debug!(delay = ?self.mounts.settle_delay, "waiting for the filesystem to settle");
                    tokio::time::sleep(self.mounts.settle_delay).await;
                }
            }
        }

        info!(label = %self.entries[handle.0].label, "released resource");
        Ok(())
    }

    /// Releases a resource by label.
    pub async fn release_label(&mut self, label: &str, mode: UnmountMode) -> Result<()> {
        let handle = self
            .handle_of(label)
            .ok_or_else(|| IsoforgeError::unexpected(format!("no resource labelled '{label}'")))?;
        self.release(handle, mode).await
    }

    /// Releases every live resource, last acquired first.
    ///
    /// Mounts that are still live are discarded. Failures do not stop the
    /// remaining releases; they are collected and returned.
    pub async fn release_all(&mut self) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        for index in (0..self.entries.len()).rev() {
            if self.entries[index].released {
                continue;
            }
            if let Err(err) = self.release(ResourceHandle(index), UnmountMode::Discard).await {
                let label = self.entries[index].label.clone();
                warn!(label = %label, error = %err, "cleanup failed");
                failures.push(CleanupFailure {
                    label,
                    message: err.to_string(),
                });
            }
        }
        failures
    }

    /// Returns true if a resource with `label` is tracked and not yet released.
    #[must_use]
    pub fn is_live(&self, label: &str) -> bool {
        self.entries.iter().any(|e| e.label == label && !e.released)
    }

    /// Handle of the most recent resource with `label`.
    #[must_use]
    pub fn handle_of(&self, label: &str) -> Option<ResourceHandle> {
        self.entries.iter().rposition(|e| e.label == label).map(ResourceHandle)
    }

    /// Working path of the live resource with `label`.
    #[must_use]
    pub fn path_of(&self, label: &str) -> Option<&Path> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.label == label && !e.released)
            .map(|e| e.resource.path())
    }

    /// The resource behind `handle`.
    #[must_use]
    pub fn get(&self, handle: ResourceHandle) -> Option<&Resource> {
        self.entries.get(handle.0).map(|e| &e.resource)
    }

    /// Number of resources not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.released).count()
    }

    /// Labels of every resource ever acquired, in creation order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    fn make_temp_dir(&self) -> io::Result<Resource> {
        let dir = tempfile::Builder::new()
            .prefix("isoforge-")
            .tempdir_in(&self.temp_root)?;
        // Removal is ours to do, in order, so the guard must not delete it on drop.
        #[allow(deprecated)]
        let path = dir.into_path();
        Ok(Resource::TempDirectory { path })
    }

    async fn mount(&self, image: &Path, index: u32, mountpoint: &Path) -> Result<()> {
        let spec = CommandSpec::new(&self.mounts.mount_program)
            .path_arg(image)
            .arg(index.to_string())
            .path_arg(mountpoint);
        self.runner.run(&spec).await.map(|_| ())
    }

    async fn unmount(&self, mountpoint: &Path, mode: UnmountMode) -> Result<()> {
        let mut spec = CommandSpec::new(&self.mounts.unmount_program)
            .path_arg(mountpoint)
            .filter_stdout(self.mounts.unmount_filter.clone());
        if mode == UnmountMode::Commit {
            spec = spec.args(["--commit", "--force"]);
        }
        self.runner.run(&spec).await.map(|_| ())
    }

    fn live_mount_inside(&self, dir: &Path) -> Option<PathBuf> {
        self.entries
            .iter()
            .filter(|e| !e.released)
            .find(|e| e.resource.pins(dir))
            .map(|e| e.resource.path().to_path_buf())
    }
}

fn remove_dir(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
