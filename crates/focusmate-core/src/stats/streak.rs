//! Consecutive-day focus streak.
//!
//! A streak counts backwards from the most recent focused day. It stays
//! alive through "today" until the day is over, so a user who focused
//! yesterday but not yet today still sees an unbroken streak.

use std::collections::BTreeSet;

use chrono::{Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::ledger::FocusSession;

use super::calendar_day;

/// Length of the current streak in days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakResult {
    pub days: u32,
}

pub struct StreakCalculator<Tz: TimeZone> {
    tz: Tz,
}

impl StreakCalculator<Local> {
    /// Calculator using the system time zone.
    pub fn local() -> Self {
        Self::new(Local)
    }
}

impl<Tz: TimeZone> StreakCalculator<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Unique calendar days holding at least one session.
    pub fn focused_days(&self, sessions: &[FocusSession]) -> BTreeSet<NaiveDate> {
        sessions
            .iter()
            .filter_map(|s| calendar_day(&self.tz, s.end_timestamp_epoch_ms))
            .collect()
    }

    /// Current streak as of `now_epoch_ms`.
    ///
    /// Sessions dated after today (clock skew on another device) are
    /// ignored.
    pub fn calculate(&self, sessions: &[FocusSession], now_epoch_ms: u64) -> StreakResult {
        let Some(today) = calendar_day(&self.tz, now_epoch_ms) else {
            return StreakResult::default();
        };
        let days = self.focused_days(sessions);
        let mut recent_first = days.range(..=today).rev();

        let Some(&latest) = recent_first.next() else {
            return StreakResult::default();
        };
        let Some(yesterday) = today.pred_opt() else {
            return StreakResult::default();
        };
        if latest < yesterday {
            return StreakResult::default();
        }

        let mut streak = 1;
        let mut expected = latest.pred_opt();
        for &day in recent_first {
            if Some(day) != expected {
                break;
            }
            streak += 1;
            expected = day.pred_opt();
        }
        StreakResult { days: streak }
    }
}
