//! Milestone badges keyed to cumulative study minutes.

use serde::{Deserialize, Serialize};

/// A badge threshold from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub name: String,
    pub required_minutes: u64,
    /// Platform role granted with the badge. Empty means no role.
    #[serde(default)]
    pub role_id: String,
    #[serde(default)]
    pub emoji: String,
}

impl BadgeDefinition {
    pub fn new(name: &str, required_minutes: u64, emoji: &str) -> Self {
        Self {
            name: name.to_string(),
            required_minutes,
            role_id: String::new(),
            emoji: emoji.to_string(),
        }
    }

    pub fn with_role(mut self, role_id: &str) -> Self {
        self.role_id = role_id.to_string();
        self
    }

    pub fn has_role(&self) -> bool {
        !self.role_id.is_empty()
    }
}

/// The stock 10h / 50h / 100h / 500h ladder.
pub fn default_badges() -> Vec<BadgeDefinition> {
    vec![
        BadgeDefinition::new("10hr Focus", 600, "🔥"),
        BadgeDefinition::new("Scholar", 3_000, "📚"),
        BadgeDefinition::new("Titan", 6_000, "⚡"),
        BadgeDefinition::new("Ascend Elite", 30_000, "👑"),
    ]
}

/// Thresholds reached by `study_minutes_total` that are not yet in
/// `previous`, in definition order.
pub fn crossed_badges<'a>(
    previous: &[String],
    study_minutes_total: u64,
    thresholds: &'a [BadgeDefinition],
) -> Vec<&'a BadgeDefinition> {
    thresholds
        .iter()
        .filter(|badge| badge.required_minutes <= study_minutes_total)
        .filter(|badge| !previous.iter().any(|held| held == &badge.name))
        .collect()
}
