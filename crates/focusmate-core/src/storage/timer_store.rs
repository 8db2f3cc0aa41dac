//! Typed access to the durable timer and badge records.
//!
//! All key names live in [`keys`]; nothing else in the crate reads or writes
//! these keys directly.

use std::sync::Arc;

use crate::error::StoreError;

use super::kv::KvStore;

pub mod keys {
    pub const TIMER_IS_RUNNING: &str = "timer.isRunning";
    pub const TIMER_END_AT_EPOCH_MS: &str = "timer.endAtEpochMs";
    pub const TIMER_TARGET_DURATION_MS: &str = "timer.targetDurationMs";
    pub const BADGES_TOTAL_MINUTES: &str = "badges.totalMinutesFocused";
}

const TIMER_KEYS: [&str; 3] = [
    keys::TIMER_IS_RUNNING,
    keys::TIMER_END_AT_EPOCH_MS,
    keys::TIMER_TARGET_DURATION_MS,
];

/// The persisted shape of a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedTimer {
    pub end_at_epoch_ms: u64,
    /// Absent in records written before the target was persisted.
    pub target_duration_ms: Option<u64>,
}

/// Durable record of the running countdown.
#[derive(Clone)]
pub struct TimerStateStore {
    kv: Arc<dyn KvStore>,
}

impl TimerStateStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Read the persisted countdown. `None` means idle: the running flag is
    /// absent or false, or no end time was stored alongside it.
    pub fn get(&self) -> Result<Option<PersistedTimer>, StoreError> {
        let running = match self.kv.get(keys::TIMER_IS_RUNNING)? {
            Some(raw) => parse::<bool>(keys::TIMER_IS_RUNNING, raw)?,
            None => false,
        };
        if !running {
            return Ok(None);
        }

        let Some(end_raw) = self.kv.get(keys::TIMER_END_AT_EPOCH_MS)? else {
            tracing::warn!("timer marked running without an end time; treating as idle");
            return Ok(None);
        };
        let end_at_epoch_ms = parse::<u64>(keys::TIMER_END_AT_EPOCH_MS, end_raw)?;

        let target_duration_ms = match self.kv.get(keys::TIMER_TARGET_DURATION_MS)? {
            Some(raw) => Some(parse::<u64>(keys::TIMER_TARGET_DURATION_MS, raw)?),
            None => None,
        };

        Ok(Some(PersistedTimer {
            end_at_epoch_ms,
            target_duration_ms,
        }))
    }

    /// Persist a running countdown.
    pub fn set_running(
        &self,
        end_at_epoch_ms: u64,
        target_duration_ms: u64,
    ) -> Result<(), StoreError> {
        self.kv.set_many(&[
            (keys::TIMER_IS_RUNNING, "true".to_string()),
            (keys::TIMER_END_AT_EPOCH_MS, end_at_epoch_ms.to_string()),
            (keys::TIMER_TARGET_DURATION_MS, target_duration_ms.to_string()),
        ])
    }

    /// Forget the countdown. Clearing already-cleared state is a no-op.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.kv.remove_many(&TIMER_KEYS)
    }

    /// Forget the countdown only if it is the one ending at
    /// `end_at_epoch_ms`. Returns false when the store is idle or holds a
    /// different countdown.
    pub fn clear_if(&self, end_at_epoch_ms: u64) -> Result<bool, StoreError> {
        self.kv.remove_many_if(
            keys::TIMER_END_AT_EPOCH_MS,
            &end_at_epoch_ms.to_string(),
            &TIMER_KEYS,
        )
    }
}

/// Locally cached total of focused minutes, the source of truth for badges.
#[derive(Clone)]
pub struct BadgeTotals {
    kv: Arc<dyn KvStore>,
}

impl BadgeTotals {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn total_minutes(&self) -> Result<i64, StoreError> {
        match self.kv.get(keys::BADGES_TOTAL_MINUTES)? {
            Some(raw) => parse::<i64>(keys::BADGES_TOTAL_MINUTES, raw),
            None => Ok(0),
        }
    }

    /// Atomically add minutes and return the new total.
    pub fn add_minutes(&self, minutes: u64) -> Result<i64, StoreError> {
        let delta = i64::try_from(minutes).unwrap_or(i64::MAX);
        self.kv.add_i64(keys::BADGES_TOTAL_MINUTES, delta)
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T, StoreError> {
    raw.trim().parse::<T>().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        value: raw,
    })
}
