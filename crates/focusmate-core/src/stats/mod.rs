//! Statistics derived from the focus session history.
//!
//! Everything here is a pure function of the session list, the current time
//! and a time zone. Nothing is persisted; reports are recomputed on every
//! query.

mod analytics;
mod badges;
mod streak;

pub use analytics::{
    format_minutes, AggregationBucket, AnalyticsAggregator, AnalyticsReport, Period,
};
pub use badges::{Badge, BadgeCriterion, BadgeDefinition, BadgeEvaluator};
pub use streak::{StreakCalculator, StreakResult};

use chrono::{NaiveDate, TimeZone};

/// Calendar day of an epoch-millisecond timestamp in `tz`.
///
/// Working on dates rather than fixed 24h offsets keeps day arithmetic
/// correct across DST transitions.
pub(crate) fn calendar_day<Tz: TimeZone>(tz: &Tz, epoch_ms: u64) -> Option<NaiveDate> {
    let millis = i64::try_from(epoch_ms).ok()?;
    tz.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.date_naive())
}
