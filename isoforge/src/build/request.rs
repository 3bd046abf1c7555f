//! What to build.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;

/// Partitioning scheme the answer file sets up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    /// Legacy BIOS with an MBR disk.
    #[default]
    Mbr,
    /// UEFI with a GPT disk.
    Uefi,
}

impl BootMode {
    /// Maps the `--uefi` flag.
    #[must_use]
    pub fn from_uefi_flag(uefi: bool) -> Self {
        if uefi {
            Self::Uefi
        } else {
            Self::Mbr
        }
    }

    /// The answer file for this mode, resolved against the asset root.
    #[must_use]
    pub fn answer_file(self, config: &BuildConfig) -> PathBuf {
        let path = match self {
            Self::Mbr => &config.answer_files.mbr,
            Self::Uefi => &config.answer_files.uefi,
        };
        config.resolve_asset(path)
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mbr => write!(f, "mbr"),
            Self::Uefi => write!(f, "uefi"),
        }
    }
}

/// One ISO build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// The stock installation ISO.
    pub input: PathBuf,
    /// Where the customized ISO is written.
    pub output: PathBuf,
    /// Which answer file to embed.
    pub boot_mode: BootMode,
}

impl BuildRequest {
    /// Creates an MBR build request.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            boot_mode: BootMode::Mbr,
        }
    }

    /// Sets the boot mode.
    #[must_use]
    pub fn with_boot_mode(mut self, boot_mode: BootMode) -> Self {
        self.boot_mode = boot_mode;
        self
    }

    /// Directory the output lands in. A bare file name means the current directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        match self.output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}
