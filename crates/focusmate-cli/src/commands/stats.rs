use clap::Subcommand;
use focusmate_core::stats::format_minutes;
use focusmate_core::{
    total_focus_minutes, AnalyticsAggregator, BadgeEvaluator, ClockSource, Period,
    StreakCalculator, SystemClock,
};
use serde_json::json;

use crate::app::App;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Current consecutive-day streak
    Streak,
    /// Focused minutes bucketed by day, week or month
    Analytics {
        /// daily, weekly or monthly
        #[arg(long, default_value = "daily")]
        period: Period,
    },
    /// Badge unlock state
    Badges,
    /// Totals across all recorded sessions
    Summary,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let now = SystemClock.now_epoch_ms();

    match action {
        StatsAction::Streak => {
            let history = app.history()?;
            let streak = StreakCalculator::local().calculate(&history, now);
            println!("{}", serde_json::to_string_pretty(&streak)?);
        }
        StatsAction::Analytics { period } => {
            let history = app.history()?;
            let report = AnalyticsAggregator::local().aggregate(&history, period, now);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        StatsAction::Badges => {
            let history = app.history()?;
            let streak = StreakCalculator::local().calculate(&history, now);
            let total = app.totals().total_minutes()?;
            let badges = BadgeEvaluator::default_set(app.config.badges.streak_badge_days)
                .evaluate_with_streak(total, streak);
            let out: Vec<_> = badges
                .iter()
                .map(|b| {
                    json!({
                        "name": b.name,
                        "minutes_required": b.minutes_required(),
                        "criterion": b.criterion,
                        "unlocked": b.unlocked,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        StatsAction::Summary => {
            let history = app.history()?;
            let total = total_focus_minutes(&history);
            let streak = StreakCalculator::local().calculate(&history, now);
            let out = json!({
                "sessions": history.len(),
                "total_minutes": total,
                "total": format_minutes(total),
                "local_total_minutes": app.totals().total_minutes()?,
                "streak_days": streak.days,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
