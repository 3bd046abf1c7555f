//! Trimming of noisy tool output before it is shown.
//!
//! Only successful output is trimmed. A checked command that fails reports
//! its stderr in full.

use serde::{Deserialize, Serialize};

/// How captured output is cut down before it reaches the user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputFilter {
    /// Leave the output alone.
    #[default]
    Passthrough,
    /// Keep the first `head` and last `tail` lines with one empty line between.
    HeadTail {
        /// Lines kept from the start.
        head: usize,
        /// Lines kept from the end.
        tail: usize,
    },
    /// Drop everything from the first line containing `marker` onward.
    TruncateAt {
        /// Substring that starts the noise.
        marker: String,
    },
}

impl OutputFilter {
    /// Creates a head/tail filter.
    #[must_use]
    pub fn head_tail(head: usize, tail: usize) -> Self {
        Self::HeadTail { head, tail }
    }

    /// Creates a truncate-at-marker filter.
    #[must_use]
    pub fn truncate_at(marker: impl Into<String>) -> Self {
        Self::TruncateAt { marker: marker.into() }
    }

    /// Applies the filter. Filtered output is re-joined with `\n`.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        match self {
            Self::Passthrough => text.to_string(),
            Self::HeadTail { head, tail } => {
                let lines: Vec<&str> = text.lines().collect();
                // Nothing to drop: showing the separator would just duplicate lines.
                if lines.len() <= head + tail {
                    return text.to_string();
                }
                let mut kept: Vec<&str> = Vec::with_capacity(head + tail + 1);
                kept.extend_from_slice(&lines[..*head]);
                kept.push("");
                kept.extend_from_slice(&lines[lines.len() - tail..]);
                kept.join("\n")
            }
            Self::TruncateAt { marker } => text
                .lines()
                .take_while(|line| !line.contains(marker.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_head_tail_twenty_lines() {
        let filtered = OutputFilter::head_tail(7, 6).apply(&numbered(20));
        let lines: Vec<&str> = filtered.split('\n').collect();

        let mut expected: Vec<String> = (1..=7).map(|i| format!("line {i}")).collect();
        expected.push(String::new());
        expected.extend((15..=20).map(|i| format!("line {i}")));

        assert_eq!(lines, expected);
    }

    #[test]
    fn test_head_tail_short_output_untouched() {
        let text = numbered(13);
        assert_eq!(OutputFilter::head_tail(7, 6).apply(&text), text);
        assert_eq!(OutputFilter::head_tail(7, 6).apply(""), "");
    }

    #[test]
    fn test_head_tail_just_over_threshold() {
        let filtered = OutputFilter::head_tail(7, 6).apply(&numbered(14));
        assert_eq!(filtered.lines().count(), 14);
        assert!(!filtered.contains("line 8\n"));
    }

    #[test]
    fn test_truncate_at_marker() {
        let stdout = "Committing changes to \"install.wim\" (image 1)\n\
                      Scanning \"/tmp/mnt\"\n\
                      Using XPRESS compression with 4 threads\n\
                      Archiving file data: 20 MiB of 20 MiB (100%) done\n\
                      Unmounted /tmp/mnt";
        let filtered = OutputFilter::truncate_at("Using XPRESS compression with").apply(stdout);
        assert_eq!(filtered, "Committing changes to \"install.wim\" (image 1)\nScanning \"/tmp/mnt\"");
    }

    #[test]
    fn test_truncate_without_marker_keeps_everything() {
        let filtered = OutputFilter::truncate_at("XPRESS").apply("a\nb\n");
        assert_eq!(filtered, "a\nb");
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(OutputFilter::Passthrough.apply("x\n\ny\n"), "x\n\ny\n");
    }

    #[test]
    fn test_filter_deserialize() {
        let filter: OutputFilter = serde_json::from_str(r#"{"type":"head_tail","head":7,"tail":6}"#).unwrap();
        assert_eq!(filter, OutputFilter::head_tail(7, 6));
    }
}
