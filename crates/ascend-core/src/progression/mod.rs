//! Progression calculator.
//!
//! Pure functions that turn a completed focus session into XP, levels,
//! streak days and badge crossings. Nothing here performs I/O; the
//! completion pipeline feeds in the stored record and persists the result.

mod badges;
mod level;
mod streak;

pub use badges::{crossed_badges, default_badges, BadgeDefinition};
pub use level::{level_from_xp, xp_for_level, xp_to_next_level};
pub use streak::{next_streak, StreakTransition};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::local_date;
use crate::storage::UserProgressionRecord;

/// XP and level constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionRules {
    #[serde(default = "default_xp_per_minute")]
    pub xp_per_minute: u64,
    #[serde(default = "default_completion_bonus")]
    pub completion_bonus: u64,
    #[serde(default = "default_streak_bonus_base")]
    pub streak_bonus_base: u64,
    #[serde(default = "default_streak_bonus_cap")]
    pub streak_bonus_cap: u64,
    /// `c` in `level = floor(c * sqrt(xp))`.
    #[serde(default = "default_level_constant")]
    pub level_constant: f64,
}

fn default_xp_per_minute() -> u64 {
    1
}
fn default_completion_bonus() -> u64 {
    20
}
fn default_streak_bonus_base() -> u64 {
    5
}
fn default_streak_bonus_cap() -> u64 {
    50
}
fn default_level_constant() -> f64 {
    0.1
}

impl Default for ProgressionRules {
    fn default() -> Self {
        Self {
            xp_per_minute: default_xp_per_minute(),
            completion_bonus: default_completion_bonus(),
            streak_bonus_base: default_streak_bonus_base(),
            streak_bonus_cap: default_streak_bonus_cap(),
            level_constant: default_level_constant(),
        }
    }
}

impl ProgressionRules {
    pub fn level_from_xp(&self, xp: u64) -> u32 {
        level_from_xp(xp, self.level_constant)
    }

    pub fn xp_for_level(&self, level: u32) -> u64 {
        xp_for_level(level, self.level_constant)
    }

    /// Streak bonus for a streak of `streak_days`, capped.
    pub fn streak_bonus(&self, streak_days: u32) -> u64 {
        (streak_days as u64)
            .saturating_mul(self.streak_bonus_base)
            .min(self.streak_bonus_cap)
    }
}

/// XP awarded for one completed session. `streak_days` is the streak
/// before this session updates it.
pub fn session_xp(duration_minutes: u32, streak_days: u32, rules: &ProgressionRules) -> u64 {
    (duration_minutes as u64)
        .saturating_mul(rules.xp_per_minute)
        .saturating_add(rules.completion_bonus)
        .saturating_add(rules.streak_bonus(streak_days))
}

/// Result of applying one session to a progression record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub xp_earned: u64,
    pub total_xp: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub streak_days: u32,
    pub streak_transition: StreakTransition,
    pub study_minutes_total: u64,
}

impl SessionProgress {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// Apply a completed session to `record`: add study minutes, award XP using
/// the pre-update streak, recompute the level, then advance the streak and
/// stamp the focus time.
pub fn apply_session(
    record: &mut UserProgressionRecord,
    duration_minutes: u32,
    now: DateTime<Utc>,
    today: NaiveDate,
    rules: &ProgressionRules,
) -> SessionProgress {
    record.study_minutes_total = record
        .study_minutes_total
        .saturating_add(duration_minutes as u64);

    let old_level = rules.level_from_xp(record.xp);
    let xp_earned = session_xp(duration_minutes, record.streak_days, rules);
    record.xp = record.xp.saturating_add(xp_earned);
    record.level = rules.level_from_xp(record.xp);

    let transition = StreakTransition::classify(record.last_focus_at.map(local_date), today);
    record.streak_days = transition.apply(record.streak_days);
    record.last_focus_at = Some(now);

    SessionProgress {
        xp_earned,
        total_xp: record.xp,
        old_level,
        new_level: record.level,
        streak_days: record.streak_days,
        streak_transition: transition,
        study_minutes_total: record.study_minutes_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn session_xp_with_defaults() {
        let rules = ProgressionRules::default();
        assert_eq!(session_xp(25, 3, &rules), 60);
        assert_eq!(session_xp(25, 0, &rules), 45);
    }

    #[test]
    fn streak_bonus_is_capped() {
        let rules = ProgressionRules::default();
        assert_eq!(rules.streak_bonus(10), 50);
        assert_eq!(rules.streak_bonus(400), 50);
        assert_eq!(session_xp(60, 30, &rules), 60 + 20 + 50);
    }

    #[test]
    fn apply_session_uses_pre_update_streak() {
        let rules = ProgressionRules::default();
        let now = Utc::now();
        let mut record = UserProgressionRecord::new("u1", "alice", now);
        record.streak_days = 3;
        record.last_focus_at = Some(now - Duration::days(1));

        let progress = apply_session(&mut record, 25, now, local_date(now), &rules);

        assert_eq!(progress.xp_earned, 60);
        assert_eq!(record.xp, 60);
        assert_eq!(record.streak_days, 4);
        assert_eq!(record.study_minutes_total, 25);
        assert_eq!(record.last_focus_at, Some(now));
        assert_eq!(progress.streak_transition, StreakTransition::Continued);
    }

    #[test]
    fn apply_session_reports_level_up() {
        let rules = ProgressionRules::default();
        let now = Utc::now();
        let mut record = UserProgressionRecord::new("u1", "alice", now);
        record.xp = 90;
        record.level = 0;

        let progress = apply_session(&mut record, 5, now, local_date(now), &rules);

        assert!(progress.leveled_up());
        assert_eq!(progress.old_level, 0);
        assert_eq!(progress.new_level, 1);
        assert_eq!(record.level, 1);
        assert_eq!(record.streak_days, 1);
    }
}
