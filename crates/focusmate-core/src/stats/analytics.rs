//! Time breakdown of focused minutes by day, week or month.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, IsoWeek, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::ledger::FocusSession;

use super::calendar_day;

const DAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const WEEKS_SHOWN: i64 = 4;

/// Reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Monday through Sunday of the current week.
    Daily,
    /// The current ISO week and the three before it.
    Weekly,
    /// January through December of the current year.
    Monthly,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(format!("unknown period '{other}' (expected daily, weekly or monthly)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationBucket {
    pub label: String,
    pub total_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub period: Period,
    pub buckets: Vec<AggregationBucket>,
    /// Sum over all buckets.
    pub total_minutes: f64,
    /// Mean over buckets with any focus time; empty buckets do not dilute it.
    pub average_minutes: f64,
    /// Number of buckets with any focus time.
    pub active_periods: usize,
}

impl AnalyticsReport {
    fn from_buckets(period: Period, buckets: Vec<AggregationBucket>) -> Self {
        let total_minutes: f64 = buckets.iter().map(|b| b.total_minutes).sum();
        let active_periods = buckets.iter().filter(|b| b.total_minutes > 0.0).count();
        let average_minutes = if active_periods > 0 {
            total_minutes / active_periods as f64
        } else {
            0.0
        };
        Self {
            period,
            buckets,
            total_minutes,
            average_minutes,
            active_periods,
        }
    }
}

pub struct AnalyticsAggregator<Tz: TimeZone> {
    tz: Tz,
}

impl AnalyticsAggregator<Local> {
    pub fn local() -> Self {
        Self::new(Local)
    }
}

impl<Tz: TimeZone> AnalyticsAggregator<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn aggregate(
        &self,
        sessions: &[FocusSession],
        period: Period,
        now_epoch_ms: u64,
    ) -> AnalyticsReport {
        let Some(today) = calendar_day(&self.tz, now_epoch_ms) else {
            tracing::warn!(now_epoch_ms, "current time out of calendar range");
            return AnalyticsReport::from_buckets(period, Vec::new());
        };

        let dated: Vec<(NaiveDate, f64)> = sessions
            .iter()
            .filter_map(|s| {
                calendar_day(&self.tz, s.end_timestamp_epoch_ms)
                    .map(|day| (day, s.duration_minutes as f64))
            })
            .collect();

        let buckets = match period {
            Period::Daily => daily(&dated, today),
            Period::Weekly => weekly(&dated, today),
            Period::Monthly => monthly(&dated, today),
        };
        AnalyticsReport::from_buckets(period, buckets)
    }
}

fn labeled(labels: impl IntoIterator<Item = String>) -> Vec<AggregationBucket> {
    labels
        .into_iter()
        .map(|label| AggregationBucket {
            label,
            total_minutes: 0.0,
        })
        .collect()
}

fn daily(dated: &[(NaiveDate, f64)], today: NaiveDate) -> Vec<AggregationBucket> {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let next_monday = monday + Duration::days(7);

    let mut buckets = labeled(DAY_LABELS.iter().map(|l| l.to_string()));
    for &(day, minutes) in dated {
        if day >= monday && day < next_monday {
            buckets[day.weekday().num_days_from_monday() as usize].total_minutes += minutes;
        }
    }
    buckets
}

/// Weeks are matched by ISO year and week together, so the window carries
/// over the new year instead of dropping December's weeks.
fn weekly(dated: &[(NaiveDate, f64)], today: NaiveDate) -> Vec<AggregationBucket> {
    let weeks: Vec<IsoWeek> = (0..WEEKS_SHOWN)
        .rev()
        .map(|back| (today - Duration::weeks(back)).iso_week())
        .collect();

    let mut buckets = labeled(weeks.iter().map(|w| format!("Wk {}", w.week())));
    for &(day, minutes) in dated {
        let week = day.iso_week();
        if let Some(idx) = weeks.iter().position(|w| *w == week) {
            buckets[idx].total_minutes += minutes;
        }
    }
    buckets
}

fn monthly(dated: &[(NaiveDate, f64)], today: NaiveDate) -> Vec<AggregationBucket> {
    let mut buckets = labeled(MONTH_LABELS.iter().map(|l| l.to_string()));
    for &(day, minutes) in dated {
        if day.year() == today.year() {
            buckets[day.month0() as usize].total_minutes += minutes;
        }
    }
    buckets
}

/// `"1h 5m"` from an hour up, otherwise `"45m"`.
pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
