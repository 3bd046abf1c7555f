//! Build configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{IsoforgeError, Result};
use crate::process::OutputFilter;

/// Names of the external programs the build shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolNames {
    /// Archive extractor.
    #[serde(default = "default_extractor")]
    pub extractor: String,
    /// Read-write image mount tool.
    #[serde(default = "default_mount")]
    pub mount: String,
    /// Image unmount tool.
    #[serde(default = "default_unmount")]
    pub unmount: String,
    /// ISO authoring tool.
    #[serde(default = "default_authoring")]
    pub authoring: String,
}

fn default_extractor() -> String {
    "7z".to_string()
}

fn default_mount() -> String {
    "wimmountrw".to_string()
}

fn default_unmount() -> String {
    "wimunmount".to_string()
}

fn default_authoring() -> String {
    "genisoimage".to_string()
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            extractor: default_extractor(),
            mount: default_mount(),
            unmount: default_unmount(),
            authoring: default_authoring(),
        }
    }
}

impl ToolNames {
    /// All four programs, in the order preflight reports them.
    #[must_use]
    pub fn all(&self) -> [&str; 4] {
        [&self.extractor, &self.authoring, &self.mount, &self.unmount]
    }
}

/// Whether a payload is a directory tree or a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Copied recursively.
    Tree,
    /// Copied as one file.
    File,
}

/// Something copied into the mounted install image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSpec {
    /// Where it comes from, relative to the asset root unless absolute.
    pub source: PathBuf,
    /// Where it lands, relative to the image root.
    pub destination: PathBuf,
    /// Tree or file.
    pub kind: PayloadKind,
}

impl PayloadSpec {
    /// A directory tree payload.
    #[must_use]
    pub fn tree(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind: PayloadKind::Tree,
        }
    }

    /// A single file payload.
    #[must_use]
    pub fn file(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind: PayloadKind::File,
        }
    }
}

fn default_payloads() -> Vec<PayloadSpec> {
    vec![
        PayloadSpec::tree("first-login-scripts", "Users/Public/first-login-scripts"),
        PayloadSpec::file("storage_dir/Hello-World.txt", "Users/Public/Hello-world.txt"),
    ]
}

/// The two answer-file variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFiles {
    /// Legacy BIOS / MBR partitioning.
    #[serde(default = "default_mbr_answer_file")]
    pub mbr: PathBuf,
    /// UEFI / GPT partitioning.
    #[serde(default = "default_uefi_answer_file")]
    pub uefi: PathBuf,
}

fn default_mbr_answer_file() -> PathBuf {
    PathBuf::from("autounattend-files/autounattend-mbr.xml")
}

fn default_uefi_answer_file() -> PathBuf {
    PathBuf::from("autounattend-files/autounattend-uefi.xml")
}

impl Default for AnswerFiles {
    fn default() -> Self {
        Self {
            mbr: default_mbr_answer_file(),
            uefi: default_uefi_answer_file(),
        }
    }
}

/// Configuration for one ISO build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// External program names.
    #[serde(default)]
    pub tools: ToolNames,
    /// Base directory for relative payload and answer-file paths.
    #[serde(default = "default_asset_root")]
    pub asset_root: PathBuf,
    /// Install image inside the extracted tree.
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,
    /// Image index to mount.
    #[serde(default = "default_image_index")]
    pub image_index: u32,
    /// El Torito boot image, relative to the extracted tree.
    #[serde(default = "default_boot_image")]
    pub boot_image: PathBuf,
    /// Wait after a committing unmount, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Files and trees copied into the mounted image.
    #[serde(default = "default_payloads")]
    pub payloads: Vec<PayloadSpec>,
    /// Answer-file variants.
    #[serde(default)]
    pub answer_files: AnswerFiles,
    /// Fail preflight unless running with elevated privileges.
    #[serde(default = "default_require_elevation")]
    pub require_elevation: bool,
    /// Progress log for the build.
    #[serde(default)]
    pub report_log: Option<PathBuf>,
    /// Unmount stdout is cut at the first line containing this.
    #[serde(default = "default_unmount_noise_marker")]
    pub unmount_noise_marker: String,
    /// Authoring stderr lines kept from the start.
    #[serde(default = "default_authoring_head_lines")]
    pub authoring_head_lines: usize,
    /// Authoring stderr lines kept from the end.
    #[serde(default = "default_authoring_tail_lines")]
    pub authoring_tail_lines: usize,
}

fn default_asset_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_image_path() -> PathBuf {
    PathBuf::from("sources/install.wim")
}

fn default_image_index() -> u32 {
    1
}

fn default_boot_image() -> PathBuf {
    PathBuf::from("boot/etfsboot.com")
}

fn default_settle_delay_ms() -> u64 {
    5_000
}

fn default_require_elevation() -> bool {
    true
}

fn default_unmount_noise_marker() -> String {
    "Using XPRESS compression with".to_string()
}

fn default_authoring_head_lines() -> usize {
    7
}

fn default_authoring_tail_lines() -> usize {
    6
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tools: ToolNames::default(),
            asset_root: default_asset_root(),
            image_path: default_image_path(),
            image_index: default_image_index(),
            boot_image: default_boot_image(),
            settle_delay_ms: default_settle_delay_ms(),
            payloads: default_payloads(),
            answer_files: AnswerFiles::default(),
            require_elevation: default_require_elevation(),
            report_log: None,
            unmount_noise_marker: default_unmount_noise_marker(),
            authoring_head_lines: default_authoring_head_lines(),
            authoring_tail_lines: default_authoring_tail_lines(),
        }
    }
}

impl BuildConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| IsoforgeError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Parses a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sets the asset root.
    #[must_use]
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// Sets the settling delay.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the tool names.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolNames) -> Self {
        self.tools = tools;
        self
    }

    /// Replaces the payload list.
    #[must_use]
    pub fn with_payloads(mut self, payloads: Vec<PayloadSpec>) -> Self {
        self.payloads = payloads;
        self
    }

    /// Enables or disables the elevation check.
    #[must_use]
    pub fn with_require_elevation(mut self, required: bool) -> Self {
        self.require_elevation = required;
        self
    }

    /// Sets the progress log path.
    #[must_use]
    pub fn with_report_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_log = Some(path.into());
        self
    }

    /// Settling delay as a `Duration`.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Resolves a possibly relative asset path against the asset root.
    #[must_use]
    pub fn resolve_asset(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }

    /// Filter applied to the unmount tool's stdout.
    #[must_use]
    pub fn unmount_filter(&self) -> OutputFilter {
        OutputFilter::truncate_at(&self.unmount_noise_marker)
    }

    /// Filter applied to the authoring tool's stderr.
    #[must_use]
    pub fn authoring_filter(&self) -> OutputFilter {
        OutputFilter::head_tail(self.authoring_head_lines, self.authoring_tail_lines)
    }
}
