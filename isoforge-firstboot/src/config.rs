//! Payload configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use isoforge::errors::{IsoforgeError, Result};
use isoforge::process::CommandSpec;

/// A command run after the user lookup, with its stdout published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredCommand {
    /// Status line shown before the command runs.
    pub heading: String,
    /// Program to launch.
    pub program: String,
    /// Its arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Fail the run when the command exits non-zero.
    #[serde(default)]
    pub check: bool,
}

impl ConfiguredCommand {
    /// The command line handed to the runner.
    #[must_use]
    pub fn spec(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.program).args(&self.args);
        if self.check {
            spec
        } else {
            spec.unchecked()
        }
    }
}

#[cfg(windows)]
fn default_commands() -> Vec<ConfiguredCommand> {
    vec![ConfiguredCommand {
        heading: "\nLooking at root folder:".to_string(),
        program: "cmd".to_string(),
        args: vec!["/C".to_string(), "DIR".to_string(), "C:\\".to_string()],
        check: false,
    }]
}

#[cfg(not(windows))]
fn default_commands() -> Vec<ConfiguredCommand> {
    vec![ConfiguredCommand {
        heading: "\nLooking at root folder:".to_string(),
        program: "ls".to_string(),
        args: vec!["/".to_string()],
        check: false,
    }]
}

#[cfg(windows)]
fn default_log_path() -> PathBuf {
    PathBuf::from(r"C:\Users\Public\Windows_Configuration_Report.txt")
}

#[cfg(not(windows))]
fn default_log_path() -> PathBuf {
    std::env::temp_dir().join("Windows_Configuration_Report.txt")
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_start_delay_ms() -> u64 {
    1_000
}

fn default_countdown_steps() -> u32 {
    5
}

fn default_countdown_delay_ms() -> u64 {
    1_000
}

#[allow(clippy::unnecessary_wraps)]
fn default_session_id() -> Option<u32> {
    Some(1)
}

/// Configuration for the first-boot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstBootConfig {
    /// Report log location.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Observer poll interval, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wait before the worker starts, in milliseconds.
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    /// Number of "Running background process..." lines.
    #[serde(default = "default_countdown_steps")]
    pub countdown_steps: u32,
    /// Wait after each of them, in milliseconds.
    #[serde(default = "default_countdown_delay_ms")]
    pub countdown_delay_ms: u64,
    /// Session whose user name is looked up. `None` skips the lookup.
    #[serde(default = "default_session_id")]
    pub session_id: Option<u32>,
    /// Commands run after the lookup.
    #[serde(default = "default_commands")]
    pub commands: Vec<ConfiguredCommand>,
}

impl Default for FirstBootConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            poll_interval_ms: default_poll_interval_ms(),
            start_delay_ms: default_start_delay_ms(),
            countdown_steps: default_countdown_steps(),
            countdown_delay_ms: default_countdown_delay_ms(),
            session_id: default_session_id(),
            commands: default_commands(),
        }
    }
}

impl FirstBootConfig {
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

    /// Builder: set the report log location.
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Builder: skip every wait.
    #[must_use]
    pub fn without_delays(mut self) -> Self {
        self.start_delay_ms = 0;
        self.countdown_delay_ms = 0;
        self
    }

    /// Builder: replace the commands.
    #[cfg(test)]
    #[must_use]
    pub fn with_commands(mut self, commands: Vec<ConfiguredCommand>) -> Self {
        self.commands = commands;
        self
    }

    /// Builder: look up the user of another session, or none.
    #[cfg(test)]
    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<u32>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn countdown_delay(&self) -> Duration {
        Duration::from_millis(self.countdown_delay_ms)
    }
}
