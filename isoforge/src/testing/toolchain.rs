//! An in-process stand-in for the imaging tools.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::build::HostEnvironment;
use crate::config::ToolNames;
use crate::process::{CommandExecutor, CommandSpec, Output};

/// One recorded tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    program: String,
    when_arg: Option<String>,
    exit_code: i32,
    stderr: String,
}

impl FailureRule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        spec.program() == self.program
            && self
                .when_arg
                .as_ref()
                .map_or(true, |arg| spec.arguments().iter().any(|a| a == arg))
    }
}

#[derive(Debug, Default)]
struct State {
    invocations: Vec<Invocation>,
    // mountpoint -> image
    mounted: BTreeMap<PathBuf, PathBuf>,
    // mountpoints found missing while still mounted
    violations: Vec<PathBuf>,
}

/// Simulates extraction, mounting, unmounting and ISO authoring on the real
/// filesystem.
///
/// Every call is recorded. Mounts are tracked so tests can check that a
/// mountpoint is never removed while mounted. Failures are injected per
/// program with [`FakeToolchain::failing`].
#[derive(Debug)]
pub struct FakeToolchain {
    tools: ToolNames,
    rules: Vec<FailureRule>,
    missing: Vec<String>,
    elevated: bool,
    extra_dirs: Vec<PathBuf>,
    state: Mutex<State>,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        Self {
            tools: ToolNames::default(),
            rules: Vec::new(),
            missing: Vec::new(),
            elevated: true,
            extra_dirs: Vec::new(),
            state: Mutex::new(State::default()),
        }
    }
}

impl FakeToolchain {
    /// A toolchain answering to the default program names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A toolchain answering to `tools`.
    #[must_use]
    pub fn with_tools(tools: ToolNames) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    /// Makes every call to `program` exit with `exit_code`.
    #[must_use]
    pub fn failing(mut self, program: &str, exit_code: i32, stderr: &str) -> Self {
        self.rules.push(FailureRule {
            program: program.to_string(),
            when_arg: None,
            exit_code,
            stderr: stderr.to_string(),
        });
        self
    }

    /// Makes calls to `program` that pass `arg` exit with `exit_code`.
    #[must_use]
    pub fn failing_with_arg(mut self, program: &str, arg: &str, exit_code: i32, stderr: &str) -> Self {
        self.rules.push(FailureRule {
            program: program.to_string(),
            when_arg: Some(arg.to_string()),
            exit_code,
            stderr: stderr.to_string(),
        });
        self
    }

    /// Reports `program` as not installed.
    #[must_use]
    pub fn without_tool(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Reports the process as running without elevated privileges.
    #[must_use]
    pub fn unelevated(mut self) -> Self {
        self.elevated = false;
        self
    }

    /// Adds a directory at `relative` to every extracted tree.
    #[must_use]
    pub fn extracting_dir(mut self, relative: impl Into<PathBuf>) -> Self {
        self.extra_dirs.push(relative.into());
        self
    }

    /// Every call so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Calls to `program` so far.
    #[must_use]
    pub fn invocations_of(&self, program: &str) -> Vec<Invocation> {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|i| i.program == program)
            .cloned()
            .collect()
    }

    /// Programs called so far, in order.
    #[must_use]
    pub fn programs(&self) -> Vec<String> {
        self.state.lock().invocations.iter().map(|i| i.program.clone()).collect()
    }

    /// Returns true if something is mounted at `mountpoint`.
    #[must_use]
    pub fn is_mounted(&self, mountpoint: &Path) -> bool {
        self.state.lock().mounted.contains_key(mountpoint)
    }

    /// Mountpoints whose directory or image disappeared while mounted.
    ///
    /// Also reports current mounts whose directory no longer exists.
    #[must_use]
    pub fn mount_violations(&self) -> Vec<PathBuf> {
        let state = self.state.lock();
        let mut violations = state.violations.clone();
        violations.extend(
            state
                .mounted
                .iter()
                .filter(|(mountpoint, image)| !mountpoint.is_dir() || !image.is_file())
                .map(|(mountpoint, _)| mountpoint.clone()),
        );
        violations
    }

    /// Current mountpoints.
    #[must_use]
    pub fn mounted(&self) -> Vec<PathBuf> {
        self.state.lock().mounted.keys().cloned().collect()
    }

    fn extract(&self, args: &[String]) -> io::Result<Output> {
        let dest = args
            .iter()
            .find_map(|a| a.strip_prefix("-o"))
            .map(PathBuf::from);
        let (Some(dest), Some(archive)) = (dest, args.last()) else {
            return Ok(Output::exited(7, "", "Command Line Error: missing operands"));
        };
        if !Path::new(archive).is_file() {
            return Ok(Output::exited(2, "", format!("ERROR: {archive}\nThe system cannot find the file specified.")));
        }

        std::fs::create_dir_all(dest.join("sources"))?;
        std::fs::create_dir_all(dest.join("boot"))?;
        std::fs::write(dest.join("sources").join("install.wim"), "WIM image\n")?;
        std::fs::write(dest.join("boot").join("etfsboot.com"), "boot sector")?;
        std::fs::write(dest.join("setup.exe"), "MZ")?;
        for dir in &self.extra_dirs {
            std::fs::create_dir_all(dest.join(dir))?;
        }
        Ok(Output::exited(0, "Extracting archive\nEverything is Ok", ""))
    }

    fn mount(&self, args: &[String]) -> io::Result<Output> {
        let [image, index, mountpoint] = args else {
            return Ok(Output::exited(1, "", "Usage: wimmountrw WIMFILE IMAGE DIRECTORY"));
        };
        let (image, mountpoint) = (PathBuf::from(image), PathBuf::from(mountpoint));
        if !image.is_file() {
            return Ok(Output::exited(47, "", format!("[ERROR] \"{}\" does not exist", image.display())));
        }
        if !mountpoint.is_dir() || std::fs::read_dir(&mountpoint)?.next().is_some() {
            return Ok(Output::exited(
                47,
                "",
                format!("[ERROR] \"{}\" is not an empty directory", mountpoint.display()),
            ));
        }
        let mut state = self.state.lock();
        if state.mounted.contains_key(&mountpoint) {
            return Ok(Output::exited(47, "", "[ERROR] already mounted"));
        }

        std::fs::create_dir_all(mountpoint.join("Windows").join("System32"))?;
        std::fs::create_dir_all(mountpoint.join("Users").join("Public"))?;
        state.mounted.insert(mountpoint, image.clone());
        Ok(Output::exited(0, format!("Mounting image {index} of {}", image.display()), ""))
    }

    fn unmount(&self, args: &[String]) -> io::Result<Output> {
        let Some(mountpoint) = args.first().map(PathBuf::from) else {
            return Ok(Output::exited(1, "", "Usage: wimunmount DIRECTORY"));
        };
        let commit = args.iter().any(|a| a == "--commit");

        let mut state = self.state.lock();
        let Some(image) = state.mounted.get(&mountpoint).cloned() else {
            return Ok(Output::exited(
                1,
                "",
                format!("[ERROR] \"{}\" is not a mounted WIM image", mountpoint.display()),
            ));
        };

        if !mountpoint.is_dir() || !image.is_file() {
            state.violations.push(mountpoint.clone());
            return Ok(Output::exited(
                1,
                "",
                format!("[ERROR] \"{}\" vanished while mounted", mountpoint.display()),
            ));
        }

        if commit {
            let mut manifest = String::new();
            for entry in walkdir::WalkDir::new(&mountpoint).min_depth(1).sort_by_file_name() {
                let entry = entry.map_err(io::Error::other)?;
                if let Ok(relative) = entry.path().strip_prefix(&mountpoint) {
                    manifest.push_str(&relative.to_string_lossy());
                    manifest.push('\n');
                }
            }
            let mut contents = std::fs::read_to_string(&image)?;
            contents.push_str(&manifest);
            std::fs::write(&image, contents)?;
        }

        for entry in std::fs::read_dir(&mountpoint)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        state.mounted.remove(&mountpoint);

        let stdout = if commit {
            "Committing changes to WIM image\nUsing XPRESS compression with 4 threads\nArchiving file data: 100% done"
        } else {
            "Unmounting image and discarding changes"
        };
        Ok(Output::exited(0, stdout, ""))
    }

    fn author(args: &[String]) -> io::Result<Output> {
        let value_after = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .map(PathBuf::from)
        };
        let (Some(output), Some(boot), Some(source)) = (value_after("-o"), value_after("-b"), args.last()) else {
            return Ok(Output::exited(255, "", "genisoimage: Missing pathspec."));
        };
        let source = PathBuf::from(source);
        if !source.is_dir() {
            return Ok(Output::exited(255, "", format!("genisoimage: No such file or directory. Invalid node - '{}'.", source.display())));
        }
        if !source.join(&boot).is_file() {
            return Ok(Output::exited(255, "", format!("genisoimage: Uh oh, I cant find the boot image '{}' !", boot.display())));
        }

        let mut listing = String::from("ISO 9660 image\n");
        for entry in walkdir::WalkDir::new(&source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::other)?;
            if let Ok(relative) = entry.path().strip_prefix(&source) {
                listing.push_str(&relative.to_string_lossy());
                listing.push('\n');
            }
        }
        std::fs::write(&output, listing)?;

        let stderr = (1..=20)
            .map(|i| format!("genisoimage: pass {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Output::exited(0, "", stderr))
    }
}

#[async_trait]
impl CommandExecutor for FakeToolchain {
    async fn execute(&self, spec: &CommandSpec) -> io::Result<Output> {
        self.state.lock().invocations.push(Invocation {
            program: spec.program().to_string(),
            args: spec.arguments().to_vec(),
        });

        if let Some(rule) = self.rules.iter().find(|r| r.matches(spec)) {
            return Ok(Output::exited(rule.exit_code, "", rule.stderr.clone()));
        }

        let args = spec.arguments();
        match spec.program() {
            p if p == self.tools.extractor => self.extract(args),
            p if p == self.tools.mount => self.mount(args),
            p if p == self.tools.unmount => self.unmount(args),
            p if p == self.tools.authoring => Self::author(args),
            other => Err(io::Error::new(io::ErrorKind::NotFound, format!("{other}: command not found"))),
        }
    }
}

impl HostEnvironment for FakeToolchain {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        let known = self.tools.all().contains(&program);
        (known && !self.missing.iter().any(|m| m == program)).then(|| PathBuf::from("/usr/bin").join(program))
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }
}
