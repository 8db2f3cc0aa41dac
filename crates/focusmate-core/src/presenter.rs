//! Renders timer events for a user-facing surface.
//!
//! A presenter is purely downstream of the event stream: it never reads
//! the clock or the store, so a slow or lagging presenter cannot affect the
//! countdown itself.

use tokio::sync::broadcast::{self, error::RecvError};

use crate::events::Event;

/// A surface that shows the countdown (a terminal line, a notification).
pub trait NotificationPresenter: Send {
    fn show_remaining(&mut self, remaining_ms: u64);
    fn finished(&mut self);
}

/// Format milliseconds as `MM:SS`, or `H:MM:SS` from one hour up.
/// Partial seconds round up so the display reaches `00:00` only at the end.
pub fn format_remaining(remaining_ms: u64) -> String {
    let total_secs = remaining_ms.div_ceil(1000);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Feed events into `presenter` until the countdown finishes or the timer
/// goes away. Returns the presenter for inspection.
pub async fn run_presenter<P: NotificationPresenter>(
    mut events: broadcast::Receiver<Event>,
    mut presenter: P,
) -> P {
    loop {
        match events.recv().await {
            Ok(Event::Tick { remaining_ms }) => presenter.show_remaining(remaining_ms),
            Ok(Event::Finish) => {
                presenter.finished();
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "presenter lagged behind timer events");
            }
            Err(RecvError::Closed) => break,
        }
    }
    presenter
}
