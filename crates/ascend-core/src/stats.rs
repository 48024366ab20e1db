//! Read-side views over progression data: per-user stats, the XP leaderboard,
//! and the weekly guild report with its schedule.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::{ReportError, StoreError};
use crate::events::Notification;
use crate::integrations::NotificationSink;
use crate::progression::{xp_to_next_level, ProgressionRules};
use crate::storage::{
    CompletedSessionRecord, ReportArchive, SessionLog, UserProgressionRecord, UserStore,
};

const TOP_MEMBERS: usize = 5;
const MEDALS: [&str; 5] = ["🥇", "🥈", "🥉", "4️⃣", "5️⃣"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub display_name: String,
    pub level: u32,
    pub xp: u64,
    pub xp_to_next_level: u64,
    pub streak_days: u32,
    pub study_hours: f64,
    pub badges: Vec<String>,
    /// 1-based position on the XP leaderboard.
    pub rank: u64,
}

/// Stats for one user, creating an empty record on first lookup.
pub async fn user_stats(
    store: &dyn UserStore,
    user_id: &str,
    display_name: &str,
    rules: &ProgressionRules,
) -> Result<UserStats, StoreError> {
    let record = store.ensure(user_id, display_name).await?;
    let ahead = store.rank(record.xp).await?;
    Ok(UserStats {
        level: rules.level_from_xp(record.xp),
        xp_to_next_level: xp_to_next_level(record.xp, rules.level_constant),
        study_hours: record.study_hours(),
        rank: ahead + 1,
        xp: record.xp,
        streak_days: record.streak_days,
        user_id: record.user_id,
        display_name: record.display_name,
        badges: record.badges,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub display_name: String,
    pub level: u32,
    pub xp: u64,
    pub streak_days: u32,
}

pub async fn leaderboard(
    store: &dyn UserStore,
    limit: usize,
) -> Result<Vec<LeaderboardEntry>, StoreError> {
    let users = store.top_by_xp(limit).await?;
    Ok(users
        .into_iter()
        .enumerate()
        .map(|(i, u)| LeaderboardEntry {
            rank: i + 1,
            level: u.level,
            xp: u.xp,
            streak_days: u.streak_days,
            user_id: u.user_id,
            display_name: u.display_name,
        })
        .collect())
}

/// One member's activity within the report window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyMember {
    pub user_id: String,
    pub display_name: String,
    pub focus_minutes: u64,
    pub xp_gained: u64,
    pub sessions: u32,
}

impl WeeklyMember {
    pub fn focus_hours(&self) -> f64 {
        self.focus_minutes as f64 / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistentMember {
    pub user_id: String,
    pub display_name: String,
    pub streak_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub guild_id: String,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub total_minutes: u64,
    pub session_count: usize,
    pub top_members: Vec<WeeklyMember>,
    pub most_consistent: Option<ConsistentMember>,
    pub biggest_gainer: Option<WeeklyMember>,
}

impl WeeklyReport {
    /// Aggregate `sessions` completed in `[since, until)` for `guild_id`.
    ///
    /// `users` supplies display names and streaks; the most consistent
    /// member is the highest streak among them. Sessions outside the window
    /// or for another guild are ignored. Ties break by user id.
    pub fn build(
        guild_id: &str,
        sessions: &[CompletedSessionRecord],
        users: &[UserProgressionRecord],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Self {
        let names: HashMap<&str, &str> = users
            .iter()
            .map(|u| (u.user_id.as_str(), u.display_name.as_str()))
            .collect();
        let name_of = |id: &str| names.get(id).copied().unwrap_or(id).to_string();

        let mut per_user: HashMap<&str, WeeklyMember> = HashMap::new();
        let mut session_count = 0;
        for s in sessions
            .iter()
            .filter(|s| s.guild_id == guild_id && s.completed_at >= since && s.completed_at < until)
        {
            session_count += 1;
            let member = per_user
                .entry(s.user_id.as_str())
                .or_insert_with(|| WeeklyMember {
                    user_id: s.user_id.clone(),
                    display_name: name_of(&s.user_id),
                    focus_minutes: 0,
                    xp_gained: 0,
                    sessions: 0,
                });
            member.focus_minutes += s.duration_minutes as u64;
            member.xp_gained += s.xp_earned;
            member.sessions += 1;
        }

        let mut members: Vec<WeeklyMember> = per_user.into_values().collect();
        members.sort_by(|a, b| {
            b.focus_minutes
                .cmp(&a.focus_minutes)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let total_minutes = members.iter().map(|m| m.focus_minutes).sum();
        let biggest_gainer = members
            .iter()
            .max_by(|a, b| {
                a.xp_gained
                    .cmp(&b.xp_gained)
                    .then_with(|| b.user_id.cmp(&a.user_id))
            })
            .cloned();
        let most_consistent = users
            .iter()
            .filter(|u| u.streak_days > 0)
            .max_by(|a, b| {
                a.streak_days
                    .cmp(&b.streak_days)
                    .then_with(|| b.user_id.cmp(&a.user_id))
            })
            .map(|u| ConsistentMember {
                user_id: u.user_id.clone(),
                display_name: u.display_name.clone(),
                streak_days: u.streak_days,
            });

        members.truncate(TOP_MEMBERS);
        Self {
            guild_id: guild_id.to_string(),
            week_start: since,
            week_end: until,
            total_minutes,
            session_count,
            top_members: members,
            most_consistent,
            biggest_gainer,
        }
    }

    pub fn total_hours(&self) -> f64 {
        self.total_minutes as f64 / 60.0
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "📊 **Weekly Focus Report**\n**{:.1} total hours** of focused work this week across the server.\n\n**Top Performers:**\n",
            self.total_hours()
        );
        if self.top_members.is_empty() {
            out.push_str("No sessions this week.\n");
        }
        for (i, m) in self.top_members.iter().enumerate() {
            let medal = MEDALS.get(i).map(|s| s.to_string()).unwrap_or_else(|| format!("#{}", i + 1));
            out.push_str(&format!(
                "{medal} **{}** · {:.1}h · +{} XP\n",
                m.display_name,
                m.focus_hours(),
                m.xp_gained
            ));
        }
        if let Some(c) = &self.most_consistent {
            out.push_str(&format!(
                "\n🔥 Most Consistent: **{}** · {} day streak",
                c.display_name, c.streak_days
            ));
        }
        if let Some(g) = &self.biggest_gainer {
            out.push_str(&format!(
                "\n⚡ Biggest XP Gain: **{}** · +{} XP",
                g.display_name, g.xp_gained
            ));
        }
        out
    }
}

/// Build the report for the seven days ending at `until`.
///
/// Streak candidates are the members who completed a session in the window.
pub async fn weekly_report(
    users: &dyn UserStore,
    log: &dyn SessionLog,
    guild_id: &str,
    until: DateTime<Utc>,
) -> Result<WeeklyReport, StoreError> {
    let since = until - Duration::days(7);
    let sessions = log.completed_between(guild_id, since, until).await?;

    let mut ids: Vec<&str> = sessions.iter().map(|s| s.user_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(record) = users.load(id).await? {
            records.push(record);
        }
    }

    Ok(WeeklyReport::build(guild_id, &sessions, &records, since, until))
}

/// First `weekday` at `hour`:00 UTC strictly after `after`.
pub fn next_weekly_run(after: DateTime<Utc>, weekday: Weekday, hour: u32) -> DateTime<Utc> {
    let start = after.date_naive();
    (0..=7)
        .map(|offset| start + Duration::days(offset))
        .filter(|day| day.weekday() == weekday)
        .filter_map(|day| day.and_hms_opt(hour, 0, 0))
        .map(|at| at.and_utc())
        .find(|at| *at > after)
        .unwrap_or(after + Duration::weeks(1))
}

/// Builds, archives and optionally posts the weekly report of one guild.
pub struct WeeklyReporter {
    users: Arc<dyn UserStore>,
    log: Arc<dyn SessionLog>,
    archive: Arc<dyn ReportArchive>,
    sink: Arc<dyn NotificationSink>,
    guild_id: String,
    channel_id: Option<String>,
}

impl WeeklyReporter {
    pub fn new(
        users: Arc<dyn UserStore>,
        log: Arc<dyn SessionLog>,
        archive: Arc<dyn ReportArchive>,
        sink: Arc<dyn NotificationSink>,
        guild_id: impl Into<String>,
    ) -> Self {
        Self {
            users,
            log,
            archive,
            sink,
            guild_id: guild_id.into(),
            channel_id: None,
        }
    }

    /// Post each published report to `channel_id`.
    pub fn post_to(mut self, channel_id: Option<String>) -> Self {
        self.channel_id = channel_id;
        self
    }

    /// Build the report for the week ending at `until`, archive it, then post
    /// it if a channel is set. A delivery failure leaves the snapshot saved.
    pub async fn publish(&self, until: DateTime<Utc>) -> Result<WeeklyReport, ReportError> {
        let report =
            weekly_report(self.users.as_ref(), self.log.as_ref(), &self.guild_id, until).await?;
        self.archive.archive(&report).await?;

        if let Some(channel_id) = &self.channel_id {
            self.sink
                .send_to_channel(channel_id, &Notification::WeeklyReport(report.clone()))
                .await?;
        }
        info!(
            guild_id = %self.guild_id,
            total_minutes = report.total_minutes,
            sessions = report.session_count,
            posted = self.channel_id.is_some(),
            "weekly report published"
        );
        Ok(report)
    }

    /// Publish every `weekday` at `hour`:00 UTC until the task is aborted.
    pub fn spawn(self, weekday: Weekday, hour: u32, clock: Arc<dyn Clock>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last = clock.now();
            loop {
                let next = next_weekly_run(last, weekday, hour);
                let wait = (next - clock.now()).to_std().unwrap_or_default();
                debug!(guild_id = %self.guild_id, %next, "weekly report scheduled");
                tokio::time::sleep(wait).await;

                if let Err(e) = self.publish(next).await {
                    error!(guild_id = %self.guild_id, error = %e, "weekly report job failed");
                }
                last = next;
            }
        })
    }
}
