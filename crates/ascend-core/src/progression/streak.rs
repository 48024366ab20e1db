//! Daily streak transitions.
//!
//! A streak counts consecutive local calendar days with at least one
//! completed session. Transitions compare calendar dates, never elapsed
//! hours, so two sessions on the same day cannot double-increment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How a completed session moves the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    /// No previous focus date: first ever session
    First,
    /// Previous focus was earlier today
    SameDay,
    /// Previous focus was yesterday
    Continued,
    /// Gap of two or more days
    Broken,
    /// Previous focus date lies in the future (clock moved backwards)
    ClockSkew,
}

impl StreakTransition {
    /// Classify the gap between the last focus date and today.
    pub fn classify(last_focus: Option<NaiveDate>, today: NaiveDate) -> Self {
        let Some(last) = last_focus else {
            return StreakTransition::First;
        };
        match (today - last).num_days() {
            0 => StreakTransition::SameDay,
            1 => StreakTransition::Continued,
            d if d > 1 => StreakTransition::Broken,
            _ => StreakTransition::ClockSkew,
        }
    }

    /// Streak value after this transition.
    pub fn apply(self, current: u32) -> u32 {
        match self {
            StreakTransition::First | StreakTransition::Broken => 1,
            StreakTransition::SameDay | StreakTransition::ClockSkew => current,
            StreakTransition::Continued => current.saturating_add(1),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StreakTransition::First => "First focus session",
            StreakTransition::SameDay => "Already focused today",
            StreakTransition::Continued => "Consecutive day",
            StreakTransition::Broken => "Streak broken",
            StreakTransition::ClockSkew => "Last focus date is in the future",
        }
    }
}

/// Streak after a session completed on `today`.
pub fn next_streak(last_focus: Option<NaiveDate>, today: NaiveDate, current: u32) -> u32 {
    StreakTransition::classify(last_focus, today).apply(current)
}
