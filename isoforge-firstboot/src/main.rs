//! `isoforge-firstboot`: the payload that configures Windows at first logon.
//!
//! A worker thread runs the configuration while the console observer polls
//! its progress. Everything is mirrored to the Windows Configuration Report.
//! Exits 0 when the worker reaches `Done`, 1 otherwise.

mod config;
mod session;
mod worker;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

use isoforge::observability::{init_tracing, DEFAULT_FILTER};
use isoforge::progress::{alert, channel, observe, ConsoleDisplay, ProgressState, ReportLog};

use crate::config::FirstBootConfig;
use crate::worker::FirstBoot;

const REPORT_TITLE: &str = "Windows Configuration Report";

/// Runs the first-logon configuration of a freshly installed Windows.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON payload configuration.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Report log location.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Start immediately and skip the countdown waits.
    #[arg(long)]
    no_wait: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

impl Cli {
    fn first_boot_config(&self) -> Result<FirstBootConfig> {
        let mut config = match &self.config {
            Some(path) => FirstBootConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => FirstBootConfig::default(),
        };
        if let Some(log) = &self.log {
            config = config.with_log_path(log);
        }
        if self.no_wait {
            config = config.without_delays();
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.first_boot_config()?;
    debug!(?config, "configuration loaded");

    let (progress, receiver) = channel(Some(ReportLog::new(&config.log_path, REPORT_TITLE)));
    let poll_interval = config.poll_interval();
    let handle = worker::spawn(FirstBoot::new(config), progress).context("Failed to start the worker thread")?;

    let mut display = ConsoleDisplay::new("Windows Configuration Succeeded", "Windows Configuration Failed");
    if cli.no_color || !std::io::stdout().is_terminal() {
        display = display.without_color();
    }
    let last = observe(&receiver, &mut display, poll_interval).await;

    let state = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("Failed to wait for the worker thread")?
        .map_err(|_| anyhow!("The worker thread panicked"))?;
    info!(%state, "worker finished");

    let done = state == ProgressState::Done && last.is_some_and(|e| e.state() == ProgressState::Done);
    Ok(if done { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing(DEFAULT_FILTER);
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", alert(&format!("{err:?}")));
            ExitCode::FAILURE
        }
    }
}
