use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::WeeklyReport;

/// Every user-visible outcome of the engine is a Notification.
/// Sinks decide how to render and deliver them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    SessionStarted {
        user_id: String,
        duration_minutes: u32,
        ends_at: DateTime<Utc>,
    },
    SessionCompleted {
        user_id: String,
        duration_minutes: u32,
        xp_earned: u64,
        streak_days: u32,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        user_id: String,
        at: DateTime<Utc>,
    },
    LevelUp {
        user_id: String,
        new_level: u32,
        total_xp: u64,
        at: DateTime<Utc>,
    },
    BadgeAwarded {
        user_id: String,
        badge: String,
        emoji: String,
        at: DateTime<Utc>,
    },
    WeeklyReport(WeeklyReport),
}

impl Notification {
    /// The user this notification is about, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Notification::SessionStarted { user_id, .. }
            | Notification::SessionCompleted { user_id, .. }
            | Notification::SessionCancelled { user_id, .. }
            | Notification::LevelUp { user_id, .. }
            | Notification::BadgeAwarded { user_id, .. } => Some(user_id),
            Notification::WeeklyReport(_) => None,
        }
    }

    /// Plain-text rendering with platform mention syntax.
    pub fn render(&self) -> String {
        match self {
            Notification::SessionStarted {
                user_id,
                duration_minutes,
                ..
            } => format!("🎯 <@{user_id}> started a **{duration_minutes}-minute** focus session. Stay locked in."),
            Notification::SessionCompleted {
                user_id,
                duration_minutes,
                xp_earned,
                streak_days,
                ..
            } => format!(
                "✅ <@{user_id}> completed a **{duration_minutes}-minute** focus session! +{xp_earned} XP · 🔥 {streak_days} day streak"
            ),
            Notification::SessionCancelled { user_id, .. } => {
                format!("<@{user_id}> cancelled their focus session. No XP awarded.")
            }
            Notification::LevelUp {
                user_id,
                new_level,
                total_xp,
                ..
            } => format!("⬆️ <@{user_id}> reached **Level {new_level}** ({total_xp} XP total)"),
            Notification::BadgeAwarded {
                user_id,
                badge,
                emoji,
                ..
            } => format!("{emoji} <@{user_id}> earned the **{badge}** badge!"),
            Notification::WeeklyReport(report) => report.render(),
        }
    }
}
