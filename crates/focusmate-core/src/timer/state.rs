use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Length of a countdown. Always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerConfig {
    target_duration_ms: u64,
}

impl TimerConfig {
    pub fn new(target_duration_ms: u64) -> Result<Self, EngineError> {
        if target_duration_ms == 0 {
            return Err(EngineError::InvalidDuration);
        }
        Ok(Self { target_duration_ms })
    }

    pub fn from_minutes(minutes: u64) -> Result<Self, EngineError> {
        Self::new(minutes.saturating_mul(60_000))
    }

    pub fn target_duration_ms(&self) -> u64 {
        self.target_duration_ms
    }
}

/// Countdown state.
///
/// ```text
/// Idle -> Running -> Finished -> Idle
///            \-----(stop)-----> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running { end_at_epoch_ms: u64 },
    /// Reached zero; finish side-effects have not completed yet.
    Finished,
}

impl TimerState {
    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running { .. })
    }
}

/// Point-in-time view of the timer for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
    #[serde(flatten)]
    pub state: TimerState,
    pub remaining_ms: u64,
    pub target_ms: u64,
    /// False when the running state could not be written to the durable
    /// store and a restart would lose the countdown.
    pub persisted: bool,
}
