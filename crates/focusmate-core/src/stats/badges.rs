//! Achievement badges.
//!
//! Unlock state is derived on every evaluation from the local minute total
//! (and optionally the streak); it is never stored.

use serde::{Deserialize, Serialize};

use super::streak::StreakResult;

/// What a badge requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "threshold", rename_all = "snake_case")]
pub enum BadgeCriterion {
    MinutesAtLeast(u64),
    StreakAtLeast(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub name: String,
    pub criterion: BadgeCriterion,
}

impl BadgeDefinition {
    pub fn minutes(name: &str, minutes: u64) -> Self {
        Self {
            name: name.to_string(),
            criterion: BadgeCriterion::MinutesAtLeast(minutes),
        }
    }

    pub fn streak(name: &str, days: u32) -> Self {
        Self {
            name: name.to_string(),
            criterion: BadgeCriterion::StreakAtLeast(days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub name: String,
    pub criterion: BadgeCriterion,
    pub unlocked: bool,
}

impl Badge {
    /// Minute threshold, or `-1` for badges that are not minute based.
    pub fn minutes_required(&self) -> i64 {
        match self.criterion {
            BadgeCriterion::MinutesAtLeast(minutes) => i64::try_from(minutes).unwrap_or(i64::MAX),
            BadgeCriterion::StreakAtLeast(_) => -1,
        }
    }
}

pub struct BadgeEvaluator {
    definitions: Vec<BadgeDefinition>,
}

impl BadgeEvaluator {
    pub fn new(definitions: Vec<BadgeDefinition>) -> Self {
        Self { definitions }
    }

    /// The standard badge list. `streak_days` sets the streak badge target.
    pub fn default_set(streak_days: u32) -> Self {
        Self::new(vec![
            BadgeDefinition::minutes("Focus Newbie", 25),
            BadgeDefinition::minutes("Focus Pro", 120),
            BadgeDefinition::minutes("Time Keeper", 300),
            BadgeDefinition::minutes("Focus Master", 600),
            BadgeDefinition::streak("Streak Pro", streak_days),
        ])
    }


    /// Minute badges only. Streak badges are always reported locked.
    pub fn evaluate(&self, total_minutes: i64) -> Vec<Badge> {
        self.evaluate_inner(total_minutes, None)
    }

    /// Minute badges plus streak badges against `streak`.
    pub fn evaluate_with_streak(&self, total_minutes: i64, streak: StreakResult) -> Vec<Badge> {
        self.evaluate_inner(total_minutes, Some(streak))
    }

    fn evaluate_inner(&self, total_minutes: i64, streak: Option<StreakResult>) -> Vec<Badge> {
        self.definitions
            .iter()
            .map(|def| {
                let unlocked = match def.criterion {
                    BadgeCriterion::MinutesAtLeast(required) => {
                        i64::try_from(required).is_ok_and(|required| total_minutes >= required)
                    }
                    BadgeCriterion::StreakAtLeast(days) => {
                        streak.is_some_and(|streak| streak.days >= days)
                    }
                };
                Badge {
                    name: def.name.clone(),
                    criterion: def.criterion,
                    unlocked,
                }
            })
            .collect()
    }
}
