//! `isoforge` command line.
//!
//! Builds a customized Windows ISO from a stock one. Exits 0 on success and
//! 1 on any failure.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use isoforge::observability::{init_tracing, DEFAULT_FILTER};
use isoforge::prelude::*;
use isoforge::progress::{alert, DEFAULT_POLL_INTERVAL};

/// Creates a modified Windows ISO with files baked into install.wim and an
/// autounattend.xml file at the root of the ISO.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The path to the input iso file.
    input_iso: PathBuf,

    /// The path to the output iso file.
    output_iso: PathBuf,

    /// Make the Windows autounattend.xml boot from uefi instead of mbr.
    #[arg(short, long)]
    uefi: bool,

    /// JSON build configuration.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the payloads and answer files.
    #[arg(long, value_name = "DIR")]
    assets: Option<PathBuf>,

    /// Also append progress to this report log.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

impl Cli {
    fn build_config(&self) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => BuildConfig::default(),
        };
        if let Some(assets) = &self.assets {
            config = config.with_asset_root(assets);
        }
        if let Some(log) = &self.log {
            config = config.with_report_log(log);
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.build_config()?;
    debug!(?config, "configuration loaded");

    let log = config
        .report_log
        .as_ref()
        .map(|path| ReportLog::new(path, "Windows ISO Build Report"));
    let (progress, receiver) = channel(log);

    let builder = IsoBuilder::new(config);
    let request = BuildRequest::new(&cli.input_iso, &cli.output_iso).with_boot_mode(BootMode::from_uefi_flag(cli.uefi));
    let worker = tokio::spawn(async move { builder.build(request, progress).await });

    let mut display = ConsoleDisplay::new("ISO build succeeded", "ISO build failed");
    if cli.no_color || !std::io::stdout().is_terminal() {
        display = display.without_color();
    }
    observe(&receiver, &mut display, DEFAULT_POLL_INTERVAL).await;

    let result = worker.await.context("The build task stopped unexpectedly")?;
    Ok(ExitCode::from(u8::try_from(result.exit_code()).unwrap_or(1)))
}

#[tokio::main]
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
