use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::records::{CompletedSessionRecord, UserProgressionRecord};
use crate::error::StoreError;
use crate::stats::WeeklyReport;

/// Persistent per-user progression storage.
///
/// Writes are whole-record replacements. The completion pipeline performs
/// read-modify-write without a transaction; that is safe against itself
/// because a user has at most one session completing at a time, but an
/// unrelated writer (an admin tool) racing the pipeline can lose an update.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load the record, creating a zeroed one named `display_name` if absent.
    async fn ensure(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<UserProgressionRecord, StoreError>;

    async fn load(&self, user_id: &str) -> Result<Option<UserProgressionRecord>, StoreError>;

    async fn save(&self, record: &UserProgressionRecord) -> Result<(), StoreError>;

    /// Number of users with strictly more XP than `xp`.
    async fn rank(&self, xp: u64) -> Result<u64, StoreError>;

    /// Highest-XP users first.
    async fn top_by_xp(&self, limit: usize) -> Result<Vec<UserProgressionRecord>, StoreError>;
}

/// Append-only log of completed sessions.
#[async_trait]
pub trait SessionLog: Send + Sync {
    async fn append(&self, record: &CompletedSessionRecord) -> Result<(), StoreError>;

    /// Sessions of `guild_id` completed in `[since, until)`, oldest first.
    async fn completed_between(
        &self,
        guild_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CompletedSessionRecord>, StoreError>;
}

/// Saved weekly report snapshots.
#[async_trait]
pub trait ReportArchive: Send + Sync {
    async fn archive(&self, report: &WeeklyReport) -> Result<(), StoreError>;

    /// Snapshot with the latest `week_end` for `guild_id`.
    async fn latest_report(&self, guild_id: &str) -> Result<Option<WeeklyReport>, StoreError>;
}
