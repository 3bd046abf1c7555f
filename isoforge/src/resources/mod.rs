//! Filesystem resources created during a run.
//!
//! A run creates temporary directories and mounts an image inside one of
//! them. [`ResourceTracker`] records each one as it is created and knows how
//! to release it, so the cleanup phase can unwind from any point.

mod resource;
mod tracker;

pub use resource::{MountState, Resource, ResourceHandle, ResourceKind, ResourceRequest, UnmountMode};
pub use tracker::{CleanupFailure, MountSettings, ResourceTracker};
