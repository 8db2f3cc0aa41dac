//! Turns a finished countdown into a ledger entry.
//!
//! Recording runs once per countdown, after the timer has left `Running`.
//! It credits the local minute counter first so badges stay correct even
//! when the ledger is unreachable.

use std::sync::Arc;

use crate::clock::ClockSource;
use crate::error::RecordError;
use crate::ledger::{FocusSession, SessionLedger};
use crate::storage::BadgeTotals;

pub struct SessionRecorder {
    clock: Arc<dyn ClockSource>,
    ledger: Arc<dyn SessionLedger>,
    cache: Option<Arc<dyn SessionLedger>>,
    totals: BadgeTotals,
    user_id: String,
}

impl SessionRecorder {
    pub fn new(
        clock: Arc<dyn ClockSource>,
        ledger: Arc<dyn SessionLedger>,
        totals: BadgeTotals,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            clock,
            ledger,
            cache: None,
            totals,
            user_id: user_id.into(),
        }
    }

    /// Also append every recorded session to a local cache, so history
    /// survives an unreachable ledger.
    pub fn with_cache(mut self, cache: Arc<dyn SessionLedger>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Record `elapsed_ms` of focus.
    ///
    /// Partial minutes are truncated; anything under one minute is not
    /// recorded and returns `Ok(None)`. A ledger failure does not undo the
    /// counter increment.
    pub fn record(&self, elapsed_ms: u64) -> Result<Option<FocusSession>, RecordError> {
        let minutes = elapsed_ms / 60_000;
        if minutes == 0 {
            tracing::debug!(elapsed_ms, "countdown under one minute, not recorded");
            return Ok(None);
        }

        let session = FocusSession {
            duration_minutes: minutes,
            end_timestamp_epoch_ms: self.clock.now_epoch_ms(),
        };

        let counter = self.totals.add_minutes(minutes);
        if let Ok(total) = &counter {
            tracing::debug!(minutes, total, "local minute total advanced");
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.append(&self.user_id, &session) {
                tracing::warn!("failed to cache session locally: {e}");
            }
        }

        match self.ledger.append(&self.user_id, &session) {
            Ok(key) => tracing::info!(%key, minutes, "focus session recorded"),
            Err(source) => return Err(RecordError::LedgerPushFailed { session, source }),
        }

        counter.map_err(RecordError::CounterWriteFailed)?;
        Ok(Some(session))
    }
}
