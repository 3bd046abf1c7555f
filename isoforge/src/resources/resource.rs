//! Resource kinds and their states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The two kinds of filesystem object a run creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Recursively removed on release.
    TempDirectory,
    /// Unmounted (commit or discard) on release.
    MountedImage,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TempDirectory => write!(f, "temp_directory"),
            Self::MountedImage => write!(f, "mounted_image"),
        }
    }
}

/// Whether an unmount keeps or drops the changes made while mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmountMode {
    /// Persist the changes into the image.
    Commit,
    /// Throw the changes away.
    Discard,
}

/// Mount lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    /// Still mounted.
    Mounted,
    /// Unmounted with changes kept.
    Committed,
    /// Unmounted with changes dropped.
    Discarded,
}

impl From<UnmountMode> for MountState {
    fn from(mode: UnmountMode) -> Self {
        match mode {
            UnmountMode::Commit => Self::Committed,
            UnmountMode::Discard => Self::Discarded,
        }
    }
}

/// What to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    /// A fresh, empty temporary directory.
    TempDirectory,
    /// Mount `index` of `image` read-write at `mountpoint`.
    MountedImage {
        /// Image file.
        image: PathBuf,
        /// Image index inside the file.
        index: u32,
        /// Existing, empty directory to mount on.
        mountpoint: PathBuf,
    },
}

impl ResourceRequest {
    /// The kind this request creates.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::TempDirectory => ResourceKind::TempDirectory,
            Self::MountedImage { .. } => ResourceKind::MountedImage,
        }
    }
}

/// A live or released filesystem object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// A temporary directory.
    TempDirectory {
        /// Its path.
        path: PathBuf,
    },
    /// A mounted image.
    MountedImage {
        /// Image file.
        image: PathBuf,
        /// Image index.
        index: u32,
        /// Where it is mounted.
        mountpoint: PathBuf,
        /// Current state.
        state: MountState,
    },
}

impl Resource {
    /// The resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::TempDirectory { .. } => ResourceKind::TempDirectory,
            Self::MountedImage { .. } => ResourceKind::MountedImage,
        }
    }

    /// The directory callers work in: the temp dir itself, or the mountpoint.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::TempDirectory { path } => path,
            Self::MountedImage { mountpoint, .. } => mountpoint,
        }
    }

    /// Returns true if this is an image that is still mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        matches!(self, Self::MountedImage { state: MountState::Mounted, .. })
    }

    /// Returns true if removing `dir` would pull the ground from under this mount.
    #[must_use]
    pub fn pins(&self, dir: &Path) -> bool {
        match self {
            Self::MountedImage { image, mountpoint, state: MountState::Mounted, .. } => {
                mountpoint.starts_with(dir) || image.starts_with(dir)
            }
            _ => false,
        }
    }
}

/// Opaque reference to a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub(crate) usize);
