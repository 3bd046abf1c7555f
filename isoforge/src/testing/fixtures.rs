//! A throwaway workspace for build tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::toolchain::FakeToolchain;
use crate::build::{BuildRequest, IsoBuilder};
use crate::config::BuildConfig;

const MBR_ANSWER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<unattend xmlns="urn:schemas-microsoft-com:unattend"><!-- mbr --></unattend>
"#;

const UEFI_ANSWER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<unattend xmlns="urn:schemas-microsoft-com:unattend"><!-- uefi --></unattend>
"#;

/// Temporary directory laid out as a build expects it:
///
/// ```text
/// assets/   first-login-scripts/, storage_dir/Hello-World.txt, autounattend-files/
/// input/    win.iso
/// output/   (empty)
/// work/     temp root for the build's working directories
/// ```
#[derive(Debug)]
pub struct BuildFixture {
    dir: TempDir,
}

impl BuildFixture {
    /// Creates the layout.
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();

        let scripts = root.join("assets").join("first-login-scripts");
        std::fs::create_dir_all(&scripts)?;
        std::fs::write(scripts.join("configure.ps1"), "Write-Output 'configuring'\n")?;
        std::fs::create_dir_all(root.join("assets").join("storage_dir"))?;
        std::fs::write(root.join("assets").join("storage_dir").join("Hello-World.txt"), "Hello World!\n")?;
        let answers = root.join("assets").join("autounattend-files");
        std::fs::create_dir_all(&answers)?;
        std::fs::write(answers.join("autounattend-mbr.xml"), MBR_ANSWER)?;
        std::fs::write(answers.join("autounattend-uefi.xml"), UEFI_ANSWER)?;

        std::fs::create_dir_all(root.join("input"))?;
        std::fs::write(root.join("input").join("win.iso"), "CD001")?;
        std::fs::create_dir_all(root.join("output"))?;
        std::fs::create_dir_all(root.join("work"))?;

        Ok(Self { dir })
    }

    /// Root of the layout.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The asset root.
    #[must_use]
    pub fn assets(&self) -> PathBuf {
        self.root().join("assets")
    }

    /// The input ISO.
    #[must_use]
    pub fn input(&self) -> PathBuf {
        self.root().join("input").join("win.iso")
    }

    /// Where the output ISO should land.
    #[must_use]
    pub fn output(&self) -> PathBuf {
        self.root().join("output").join("custom.iso")
    }

    /// Temp root for working directories.
    #[must_use]
    pub fn work(&self) -> PathBuf {
        self.root().join("work")
    }

    /// Config pointing at the fixture assets, with no settling delay and no
    /// elevation requirement.
    #[must_use]
    pub fn config(&self) -> BuildConfig {
        BuildConfig::default()
            .with_asset_root(self.assets())
            .with_settle_delay(Duration::ZERO)
            .with_require_elevation(false)
    }

    /// An MBR request from `input()` to `output()`.
    #[must_use]
    pub fn request(&self) -> BuildRequest {
        BuildRequest::new(self.input(), self.output())
    }

    /// A builder that runs everything through `fake`.
    #[must_use]
    pub fn builder(&self, fake: &Arc<FakeToolchain>) -> IsoBuilder {
        IsoBuilder::new(self.config())
            .with_executor(fake.clone())
            .with_host(fake.clone())
            .with_temp_root(self.work())
    }

    /// Returns true if no working directory is left under `work()`.
    #[must_use]
    pub fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work()).map_or(false, |mut entries| entries.next().is_none())
    }
}
