//! TOML-based engine configuration.
//!
//! Stores the tunables of the focus engine:
//! - Session duration bounds and start cooldown
//! - XP rates, streak bonus and level curve constant
//! - Badge ladder
//! - Discord announcement target
//! - Weekly report schedule
//!
//! Configuration is stored at `~/.config/ascend/config.toml`.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::progression::{default_badges, BadgeDefinition, ProgressionRules};

/// Focus session limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusConfig {
    #[serde(default = "default_min_duration")]
    pub min_duration_minutes: u32,
    #[serde(default = "default_max_duration")]
    pub max_duration_minutes: u32,
    /// Delay between two session starts by the same user.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// How often expired cooldown entries are swept from memory.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

/// Discord delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Channel receiving badge announcements and weekly reports.
    #[serde(default)]
    pub announce_channel_id: Option<String>,
}

/// Weekly guild report schedule, evaluated in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Guild summarized by `serve`. No report runs while unset.
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default = "default_report_weekday")]
    pub weekday: Weekday,
    #[serde(default = "default_report_hour")]
    pub hour_utc: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/ascend/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub progression: ProgressionRules,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default = "default_badges")]
    pub badges: Vec<BadgeDefinition>,
}

// Default functions
fn default_min_duration() -> u32 {
    5
}
fn default_max_duration() -> u32 {
    180
}
fn default_cooldown_seconds() -> u64 {
    300
}
fn default_sweep_interval_seconds() -> u64 {
    300
}
fn default_api_base() -> String {
    "https://discord.com/api/v10".into()
}
fn default_report_weekday() -> Weekday {
    Weekday::Sun
}
fn default_report_hour() -> u32 {
    18
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            min_duration_minutes: default_min_duration(),
            max_duration_minutes: default_max_duration(),
            cooldown_seconds: default_cooldown_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            announce_channel_id: None,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            guild_id: None,
            weekday: default_report_weekday(),
            hour_utc: default_report_hour(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            focus: FocusConfig::default(),
            progression: ProgressionRules::default(),
            discord: DiscordConfig::default(),
            report: ReportConfig::default(),
            badges: default_badges(),
        }
    }
}

impl FocusConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `<data_dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("."),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the data directory, writing defaults on first run, then
    /// apply environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::load_from(&Self::path()?)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, or write and return the default config if the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Apply `ASCEND_FOCUS_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
            raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("cannot parse '{raw}'"),
            })
        }

        if let Some(raw) = lookup("ASCEND_FOCUS_MIN_DURATION") {
            self.focus.min_duration_minutes = parse("ASCEND_FOCUS_MIN_DURATION", &raw)?;
        }
        if let Some(raw) = lookup("ASCEND_FOCUS_MAX_DURATION") {
            self.focus.max_duration_minutes = parse("ASCEND_FOCUS_MAX_DURATION", &raw)?;
        }
        if let Some(raw) = lookup("ASCEND_FOCUS_COOLDOWN_SECONDS") {
            self.focus.cooldown_seconds = parse("ASCEND_FOCUS_COOLDOWN_SECONDS", &raw)?;
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        if self.focus.min_duration_minutes == 0 {
            return Err(invalid(
                "focus.min_duration_minutes",
                "must be at least 1".into(),
            ));
        }
        if self.focus.min_duration_minutes > self.focus.max_duration_minutes {
            return Err(invalid(
                "focus.max_duration_minutes",
                format!(
                    "must be >= min_duration_minutes ({})",
                    self.focus.min_duration_minutes
                ),
            ));
        }
        let c = self.progression.level_constant;
        if !c.is_finite() || c <= 0.0 {
            return Err(invalid(
                "progression.level_constant",
                format!("must be a positive number (got {c})"),
            ));
        }
        if self.report.hour_utc > 23 {
            return Err(invalid(
                "report.hour_utc",
                format!("must be an hour of the day (got {})", self.report.hour_utc),
            ));
        }
        for (i, badge) in self.badges.iter().enumerate() {
            if badge.name.trim().is_empty() {
                return Err(invalid("badges", format!("badge #{i} has an empty name")));
            }
            if self.badges[..i].iter().any(|b| b.name == badge.name) {
                return Err(invalid(
                    "badges",
                    format!("duplicate badge name '{}'", badge.name),
                ));
            }
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key and validate the result.
    /// Does not persist; call [`Config::save`] afterwards.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
