//! Terminal rendering of progress events.

use std::io::{self, Write};

use super::event::{ProgressEvent, ProgressState, Tone};
use super::observer::ProgressDisplay;

const BOLD: &str = "\x1b[1m";
const BOLD_RED: &str = "\x1b[1;31m";
const BOLD_GREEN: &str = "\x1b[1;32m";
const RESET: &str = "\x1b[0m";

/// Wraps `text` in bold.
#[must_use]
pub fn bold(text: &str) -> String {
    format!("{BOLD}{text}{RESET}")
}

/// Wraps `text` in bold red.
#[must_use]
pub fn alert(text: &str) -> String {
    format!("{BOLD_RED}{text}{RESET}")
}

/// Prints events to stdout, diagnostics to stderr.
///
/// Headings are bold, errors bold red. The terminal event becomes a framed
/// notice under a status line.
#[derive(Debug, Clone)]
pub struct ConsoleDisplay {
    success_status: String,
    failure_status: String,
    color: bool,
}

impl ConsoleDisplay {
    /// Creates a display with the status lines shown on `Done` and `Failed`.
    #[must_use]
    pub fn new(success_status: impl Into<String>, failure_status: impl Into<String>) -> Self {
        Self {
            success_status: success_status.into(),
            failure_status: failure_status.into(),
            color: true,
        }
    }

    /// Disables ANSI escapes.
    #[must_use]
    pub fn without_color(mut self) -> Self {
        self.color = false;
        self
    }

    fn styled(&self, tone: Tone, text: &str) -> String {
        match (self.color, tone) {
            (false, _) | (true, Tone::Plain) => text.to_string(),
            (true, Tone::Heading) => bold(text),
            (true, Tone::Error) => alert(text),
        }
    }

    /// Renders the final notice for a terminal event.
    #[must_use]
    pub fn render_notice(&self, event: &ProgressEvent) -> String {
        let (status, color) = match event.state() {
            ProgressState::Failed => (&self.failure_status, BOLD_RED),
            _ => (&self.success_status, BOLD_GREEN),
        };

        let body: Vec<&str> = event.message().lines().collect();
        let width = body
            .iter()
            .map(|l| l.chars().count())
            .chain(std::iter::once(status.chars().count()))
            .max()
            .unwrap_or(0);
        let rule = "=".repeat(width + 4);

        let mut notice = String::new();
        notice.push('\n');
        notice.push_str(&rule);
        notice.push('\n');
        if self.color {
            notice.push_str(&format!("  {color}{status}{RESET}\n"));
        } else {
            notice.push_str(&format!("  {status}\n"));
        }
        notice.push_str(&rule);
        notice.push('\n');
        for line in body {
            notice.push_str("  ");
            notice.push_str(line);
            notice.push('\n');
        }
        notice.push_str(&rule);
        notice.push('\n');
        notice
    }
}

impl ProgressDisplay for ConsoleDisplay {
    fn show(&mut self, event: &ProgressEvent) {
        let text = self.styled(event.tone(), event.message().trim_end_matches('\n'));
        if event.tone() == Tone::Error {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{text}");
            let _ = err.flush();
        } else {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{text}");
            let _ = out.flush();
        }
    }

    fn conclude(&mut self, event: &ProgressEvent) {
        let notice = self.render_notice(event);
        if event.state() == ProgressState::Failed {
            let _ = io::stderr().lock().write_all(notice.as_bytes());
        } else {
            let mut out = io::stdout().lock();
            let _ = out.write_all(notice.as_bytes());
            let _ = out.flush();
        }
    }
}
