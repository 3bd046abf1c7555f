//! Append-only progress log with a header and an end-of-file trailer.
//!
//! Layout:
//!
//! ```text
//! <title>
//! UTC TimeStamp: <local start time>
//! Epoch Time: <start, fractional epoch seconds>
//! ## END OF HEADER ##
//! <one message per progress event>
//! ## END OF FILE ##
//! <terminal message>
//! ```

use chrono::{DateTime, Local, Utc};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Last line of the header.
pub const HEADER_END: &str = "## END OF HEADER ##";

/// Last line of a finished log.
pub const FILE_END: &str = "## END OF FILE ##";

/// A plain-text UTF-8 log, created with its header on first use.
#[derive(Debug)]
pub struct ReportLog {
    path: PathBuf,
    title: String,
    started_at: DateTime<Utc>,
    initialized: bool,
}

impl ReportLog {
    /// Creates a log that will be written at `path`. Nothing touches disk yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            started_at: Utc::now(),
            initialized: false,
        }
    }

    /// Overrides the start time recorded in the header.
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Where the log lives.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Appends `message` verbatim, writing the header first if needed.
    pub fn append(&mut self, message: &str) -> io::Result<()> {
        self.ensure_header()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(message.as_bytes())?;
        file.flush()
    }

    /// Appends the end-of-file marker.
    ///
    /// A newline is inserted first only when the file does not already end in one.
    pub fn write_end_marker(&mut self) -> io::Result<()> {
        self.ensure_header()?;
        let mut marker = format!("{FILE_END}\n");
        if !ends_with_newline(&self.path)? {
            marker.insert(0, '\n');
        }
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(marker.as_bytes())?;
        file.flush()
    }

    fn ensure_header(&mut self) -> io::Result<()> {
        if self.initialized {
            return Ok(());
        }

        let local: DateTime<Local> = self.started_at.with_timezone(&Local);
        let epoch = self.started_at.timestamp_millis() as f64 / 1000.0;

        let mut file = File::create(&self.path)?;
        writeln!(file, "{}", self.title)?;
        writeln!(file, "UTC TimeStamp: {}", local.format("%Y-%m-%d %H:%M:%S%.6f"))?;
        writeln!(file, "Epoch Time: {epoch}")?;
        writeln!(file, "{HEADER_END}")?;
        file.flush()?;

        self.initialized = true;
        Ok(())
    }
}

/// Returns true for an empty file or one whose last byte is `\n`.
fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Formats the two elapsed-time trailer lines.
///
/// Minutes are rounded up; seconds keep their fraction.
#[must_use]
pub fn elapsed_lines(elapsed_secs: f64) -> (String, String) {
    let minutes = (elapsed_secs / 60.0).ceil();
    (
        format!("\nTime taken in minutes: {minutes}\n"),
        format!("Time taken in seconds: {elapsed_secs}\n"),
    )
}
