use serde::{Deserialize, Serialize};

/// Events published by the timer to every subscriber.
///
/// Delivery is best-effort: a subscriber that misses a `Tick` loses nothing,
/// because the next `Tick` (or the final `Finish`) carries the authoritative
/// remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Emitted roughly once per second while a countdown is running.
    Tick { remaining_ms: u64 },
    /// Emitted exactly once per completed countdown.
    Finish,
}
