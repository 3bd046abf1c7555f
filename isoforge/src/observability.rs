//! Tracing setup and timing helpers.
//!
//! Diagnostics go through `tracing` to stderr. What the user sees while a
//! build runs is the progress stream, rendered separately.

use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "warn";

/// Installs the global stderr subscriber, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if let Err(e) = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
    {
        tracing::debug!("tracing already initialised: {e}");
    }
}

/// Wall-clock duration of a pipeline or one of its stages, reported in
/// milliseconds in the `duration_ms` field of the completion events.
#[derive(Debug)]
pub struct Stopwatch {
    label: String,
    started: Instant,
}

impl Stopwatch {
    #[must_use]
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    /// What is being measured.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Milliseconds since [`Stopwatch::start`].
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1e3
    }

    /// Consumes the stopwatch, returning the final reading.
    #[must_use]
    pub fn stop(self) -> f64 {
        let ms = self.elapsed_ms();
        tracing::trace!(label = %self.label, duration_ms = ms, "stopwatch stopped");
        ms
    }
}
