//! Persisted progression and session-log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user progression state.
///
/// `level` is derived from `xp` and rewritten together with it by the
/// completion pipeline; `study_minutes_total` and `badges` only grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgressionRecord {
    pub user_id: String,
    pub display_name: String,
    pub xp: u64,
    pub level: u32,
    pub streak_days: u32,
    pub study_minutes_total: u64,
    pub badges: Vec<String>,
    pub last_focus_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl UserProgressionRecord {
    /// Fresh record with zeroed progression.
    pub fn new(user_id: &str, display_name: &str, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            xp: 0,
            level: 0,
            streak_days: 0,
            study_minutes_total: 0,
            badges: Vec::new(),
            last_focus_at: None,
            joined_at,
        }
    }

    pub fn has_badge(&self, name: &str) -> bool {
        self.badges.iter().any(|b| b == name)
    }

    /// Add a badge if not already held. Returns whether it was added.
    pub fn grant_badge(&mut self, name: &str) -> bool {
        if self.has_badge(name) {
            return false;
        }
        self.badges.push(name.to_string());
        true
    }

    pub fn study_hours(&self) -> f64 {
        self.study_minutes_total as f64 / 60.0
    }
}

/// One completed focus session. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSessionRecord {
    pub user_id: String,
    pub guild_id: String,
    pub duration_minutes: u32,
    pub xp_earned: u64,
    pub completed_at: DateTime<Utc>,
}
