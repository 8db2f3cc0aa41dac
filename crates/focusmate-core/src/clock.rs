//! Wall-clock abstraction.
//!
//! The timer's correctness is defined by an absolute end time in epoch
//! milliseconds, so every component that needs "now" reads it through a
//! [`ClockSource`]. Tests swap in a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current wall-clock time.
pub trait ClockSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_epoch_ms(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_epoch_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_epoch_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_epoch_ms)),
        }
    }

    pub fn set(&self, epoch_ms: u64) {
        self.now_ms.store(epoch_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now_epoch_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
