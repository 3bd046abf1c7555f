//! Cooperative polling loop that feeds a display from a [`ProgressReceiver`].

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::channel::ProgressReceiver;
use super::event::ProgressEvent;

/// Default time between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Something that renders progress for a human.
pub trait ProgressDisplay {
    /// Shows a `Ready` or `Running` message.
    fn show(&mut self, event: &ProgressEvent);

    /// Switches to the terminal state and surfaces the final notice.
    fn conclude(&mut self, event: &ProgressEvent);
}

/// Polls `receiver` every `every` until a terminal event arrives.
///
/// Each tick drains whatever is queued, in order. Returns the terminal event,
/// or `None` if every publisher went away without sending one. Never polls
/// again after the terminal event.
pub async fn observe<D>(receiver: &ProgressReceiver, display: &mut D, every: Duration) -> Option<ProgressEvent>
where
    D: ProgressDisplay + ?Sized,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        while let Some(event) = receiver.poll() {
            if event.is_terminal() {
                debug!(state = %event.state(), "observer reached terminal event");
                display.conclude(&event);
                return Some(event);
            }
            display.show(&event);
        }

        if receiver.is_closed() {
            warn!("progress publisher dropped without a terminal event");
            return None;
        }
    }
}
