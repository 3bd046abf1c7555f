//! Checks run before any resource is created.

use std::fmt::Debug;
use std::path::PathBuf;

use super::request::BuildRequest;
use crate::config::{BuildConfig, PayloadKind};
use crate::errors::ValidationError;

/// What preflight needs to know about the host.
pub trait HostEnvironment: Send + Sync + Debug {
    /// Full path of `program` if it is on the search path.
    fn resolve(&self, program: &str) -> Option<PathBuf>;

    /// Returns true if the process runs with elevated privileges.
    fn is_elevated(&self) -> bool;
}

/// The machine we are running on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl HostEnvironment for SystemEnvironment {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    // Elevation is enforced by the image tools themselves on other hosts.
    #[cfg(not(unix))]
    fn is_elevated(&self) -> bool {
        true
    }
}

/// Validates a request without touching the filesystem beyond reads.
///
/// Checks run in order: input ISO, output directory, privileges, tools,
/// then the payload and answer-file assets. The first failure is returned.
pub fn validate(request: &BuildRequest, config: &BuildConfig, host: &dyn HostEnvironment) -> Result<(), ValidationError> {
    if !request.input.is_file() {
        return Err(ValidationError::new(format!(
            "The input ISO, {}, does not exist.",
            request.input.display()
        )));
    }

    let output_dir = request.output_dir();
    if !output_dir.is_dir() {
        return Err(ValidationError::new(format!(
            "The output ISO's directory, {}, does not exist.",
            output_dir.display()
        )));
    }

    if config.require_elevation && !host.is_elevated() {
        return Err(ValidationError::new("This program can only be run as root.")
            .with_hint("re-run it with sudo, or set require_elevation to false in the config"));
    }

    for program in config.tools.all() {
        if host.resolve(program).is_none() {
            return Err(ValidationError::new(format!("The program, {program}, is not installed."))
                .with_hint("install wimtools, p7zip-full and genisoimage"));
        }
    }

    for payload in &config.payloads {
        let source = config.resolve_asset(&payload.source);
        let present = match payload.kind {
            PayloadKind::Tree => source.is_dir(),
            PayloadKind::File => source.is_file(),
        };
        if !present {
            return Err(ValidationError::new(format!("The payload, {}, does not exist.", source.display())));
        }
    }

    let answer_file = request.boot_mode.answer_file(config);
    if !answer_file.is_file() {
        return Err(ValidationError::new(format!(
            "The answer file, {}, does not exist.",
            answer_file.display()
        )));
    }

    Ok(())
}
