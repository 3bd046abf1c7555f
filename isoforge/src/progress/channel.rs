//! The ordered queue between a worker and its observer.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

use super::event::{ProgressEvent, ProgressState, Tone};
use super::log::{elapsed_lines, ReportLog};
use crate::errors::Result;

type Queue = Arc<Mutex<VecDeque<ProgressEvent>>>;

/// Creates a connected publisher/receiver pair.
///
/// When `log` is given, every published message is also appended to it.
#[must_use]
pub fn channel(log: Option<ReportLog>) -> (ProgressPublisher, ProgressReceiver) {
    let queue: Queue = Arc::new(Mutex::new(VecDeque::new()));
    let started_at = log.as_ref().map_or_else(Utc::now, ReportLog::started_at);
    let publisher = ProgressPublisher {
        queue: Arc::clone(&queue),
        log: log.map(|l| Arc::new(Mutex::new(l))),
        started_at,
    };
    (publisher, ProgressReceiver { queue })
}

/// The sending half. Cloning it shares the same queue and log.
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    queue: Queue,
    log: Option<Arc<Mutex<ReportLog>>>,
    started_at: chrono::DateTime<Utc>,
}

impl ProgressPublisher {
    /// Persists the event's message, then enqueues the event.
    pub fn publish(&self, event: ProgressEvent) -> Result<()> {
        if let Some(log) = &self.log {
            log.lock().append(event.message())?;
        }
        trace!(state = %event.state(), message = event.message().trim_end(), "progress");
        self.queue.lock().push_back(event);
        Ok(())
    }

    /// Publishes a `Ready` event.
    pub fn ready(&self, message: impl AsRef<str>) -> Result<()> {
        self.publish(ProgressEvent::new(ProgressState::Ready, message))
    }

    /// Publishes a plain `Running` event.
    pub fn running(&self, message: impl AsRef<str>) -> Result<()> {
        self.publish(ProgressEvent::new(ProgressState::Running, message))
    }

    /// Publishes a `Running` status line.
    pub fn heading(&self, message: impl AsRef<str>) -> Result<()> {
        self.publish(ProgressEvent::new(ProgressState::Running, message).with_tone(Tone::Heading))
    }

    /// Publishes a `Running` diagnostic.
    pub fn error(&self, message: impl AsRef<str>) -> Result<()> {
        self.publish(ProgressEvent::new(ProgressState::Running, message).with_tone(Tone::Error))
    }

    /// Ends the stream.
    ///
    /// Publishes the elapsed-time lines, closes the log with its end-of-file
    /// marker and then records the terminal event below it. Nothing should be
    /// published after.
    pub fn finish(&self, state: ProgressState, message: impl AsRef<str>) -> Result<()> {
        debug_assert!(state.is_terminal(), "finish() needs Done or Failed");

        let elapsed = (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0;
        let (minutes, seconds) = elapsed_lines(elapsed.max(0.0));
        self.running(minutes)?;
        self.running(seconds)?;

        let tone = if state == ProgressState::Failed { Tone::Error } else { Tone::Heading };
        let terminal = ProgressEvent::new(state, message).with_tone(tone);

        if let Some(log) = &self.log {
            let mut log = log.lock();
            log.write_end_marker()?;
            log.append(terminal.message())?;
        }
        self.queue.lock().push_back(terminal);
        Ok(())
    }

    /// Path of the backing log, if any.
    #[must_use]
    pub fn log_path(&self) -> Option<std::path::PathBuf> {
        self.log.as_ref().map(|l| l.lock().path().to_path_buf())
    }
}

/// The receiving half. Polling never blocks.
#[derive(Debug)]
pub struct ProgressReceiver {
    queue: Queue,
}

impl ProgressReceiver {
    /// Pops the oldest event, if any.
    #[must_use]
    pub fn poll(&self) -> Option<ProgressEvent> {
        self.queue.lock().pop_front()
    }

    /// Returns true once every publisher is gone and the queue is drained.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        Arc::strong_count(&self.queue) == 1 && self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::log::FILE_END;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_poll_empty() {
        let (_tx, rx) = channel(None);
        assert!(rx.poll().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = channel(None);
        tx.ready("Starting Process...").unwrap();
        for i in 1..=5 {
            tx.running(format!("Running background process... {i}")).unwrap();
        }

        assert_eq!(rx.poll().unwrap().state(), ProgressState::Ready);
        for i in 1..=5 {
            let event = rx.poll().unwrap();
            assert_eq!(event.message(), format!("Running background process... {i}\n"));
        }
        assert!(rx.poll().is_none());
    }

    #[test]
    fn test_publish_persists_normalized_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let (tx, rx) = channel(Some(ReportLog::new(&path, "Report")));

        tx.running("first").unwrap();
        tx.running("second\n\n\n").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("## END OF HEADER ##\nfirst\nsecond\n"));
        assert_eq!(rx.poll().unwrap().message(), "first\n");
        assert_eq!(rx.poll().unwrap().message(), "second\n");
    }

    #[test]
    fn test_finish_writes_trailer_and_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let (tx, rx) = channel(Some(ReportLog::new(&path, "Report")));

        tx.running("work").unwrap();
        tx.finish(ProgressState::Done, "Windows Configuration is Complete!").unwrap();

        let events: Vec<ProgressEvent> = std::iter::from_fn(|| rx.poll()).collect();
        assert_eq!(events.len(), 4);
        assert!(events[1].message().starts_with("\nTime taken in minutes: "));
        assert!(events[2].message().starts_with("Time taken in seconds: "));
        assert_eq!(events[3].state(), ProgressState::Done);

        let content = std::fs::read_to_string(&path).unwrap();
        let tail: Vec<&str> = content.lines().rev().take(2).collect();
        assert_eq!(tail, vec!["Windows Configuration is Complete!", FILE_END]);
    }

    #[test]
    fn test_end_marker_follows_elapsed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let (tx, _rx) = channel(Some(ReportLog::new(&path, "Report")));

        tx.running("work").unwrap();
        tx.finish(ProgressState::Failed, "Windows Configuration Failed").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        let end = lines.iter().position(|l| *l == FILE_END).unwrap();
        assert!(lines[end - 1].starts_with("Time taken in seconds: "));
        assert!(lines[end - 2].starts_with("Time taken in minutes: "));
        assert_eq!(lines[end - 3], "");
        assert_eq!(lines[end - 4], "work");
        assert_eq!(&lines[end + 1..], ["Windows Configuration Failed"]);
    }

    #[test]
    fn test_receiver_closed_after_publishers_drop() {
        let (tx, rx) = channel(None);
        tx.running("last words").unwrap();
        let clone = tx.clone();
        drop(tx);
        assert!(!rx.is_closed());
        drop(clone);
        assert!(!rx.is_closed());
        let _ = rx.poll();
        assert!(rx.is_closed());
    }

    #[test]
    fn test_publisher_usable_across_threads() {
        let (tx, rx) = channel(None);
        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                tx.running(i.to_string()).unwrap();
            }
        });
        handle.join().unwrap();

        let received: Vec<String> = std::iter::from_fn(|| rx.poll())
            .map(|e| e.message().trim_end().to_string())
            .collect();
        let expected: Vec<String> = (0..100).map(|i: i32| i.to_string()).collect();
        assert_eq!(received, expected);
    }
}
