//! One-directional progress reporting from a worker to an observer.
//!
//! This module provides:
//! - `ProgressEvent` with its `ProgressState` and rendering `Tone`
//! - A publisher/receiver pair over a single locked FIFO
//! - `ReportLog`, the append-only log every published message lands in
//! - The cooperative `observe` loop and a console display

mod channel;
mod display;
mod event;
pub mod log;
mod observer;

pub use channel::{channel, ProgressPublisher, ProgressReceiver};
pub use display::{alert, bold, ConsoleDisplay};
pub use event::{normalize_message, ProgressEvent, ProgressState, Tone};
pub use log::ReportLog;
pub use observer::{observe, ProgressDisplay, DEFAULT_POLL_INTERVAL};
