//! In-memory store.
//!
//! Implements [`UserStore`], [`SessionLog`] and [`ReportArchive`] over plain
//! maps. Used by
//! `serve --ephemeral` and by tests, which can switch individual operations
//! into failure mode to exercise the pipeline's error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::records::{CompletedSessionRecord, UserProgressionRecord};
use super::traits::{ReportArchive, SessionLog, UserStore};
use crate::error::StoreError;
use crate::stats::WeeklyReport;

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserProgressionRecord>>,
    sessions: Mutex<Vec<CompletedSessionRecord>>,
    reports: Mutex<Vec<WeeklyReport>>,
    fail_ensure: AtomicBool,
    fail_save: AtomicBool,
    fail_append: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record directly, bypassing failure injection.
    pub fn insert(&self, record: UserProgressionRecord) {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.user_id.clone(), record);
    }

    /// Snapshot of a stored record.
    pub fn user(&self, user_id: &str) -> Option<UserProgressionRecord> {
        self.users
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }

    /// Snapshot of the session log.
    pub fn sessions(&self) -> Vec<CompletedSessionRecord> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot of the archived weekly reports, oldest first.
    pub fn reports(&self) -> Vec<WeeklyReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_ensure(&self, fail: bool) {
        self.fail_ensure.store(fail, Ordering::SeqCst);
    }

    pub fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{op} disabled")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ensure(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<UserProgressionRecord, StoreError> {
        Self::check(&self.fail_ensure, "ensure")?;
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let record = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgressionRecord::new(user_id, display_name, Utc::now()));
        Ok(record.clone())
    }

    async fn load(&self, user_id: &str) -> Result<Option<UserProgressionRecord>, StoreError> {
        Ok(self.user(user_id))
    }

    async fn save(&self, record: &UserProgressionRecord) -> Result<(), StoreError> {
        Self::check(&self.fail_save, "save")?;
        self.insert(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rank(&self, xp: u64) -> Result<u64, StoreError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users.values().filter(|u| u.xp > xp).count() as u64)
    }

    async fn top_by_xp(&self, limit: usize) -> Result<Vec<UserProgressionRecord>, StoreError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = users.values().cloned().collect();
        all.sort_by(|a, b| b.xp.cmp(&a.xp).then_with(|| a.user_id.cmp(&b.user_id)));
        all.truncate(limit);
        Ok(all)
    }
}

#[async_trait]
impl SessionLog for MemoryStore {
    async fn append(&self, record: &CompletedSessionRecord) -> Result<(), StoreError> {
        Self::check(&self.fail_append, "append")?;
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn completed_between(
        &self,
        guild_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CompletedSessionRecord>, StoreError> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<_> = sessions
            .iter()
            .filter(|s| s.guild_id == guild_id && s.completed_at >= since && s.completed_at < until)
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.completed_at);
        Ok(matching)
    }
}

#[async_trait]
impl ReportArchive for MemoryStore {
    async fn archive(&self, report: &WeeklyReport) -> Result<(), StoreError> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        Ok(())
    }

    async fn latest_report(&self, guild_id: &str) -> Result<Option<WeeklyReport>, StoreError> {
        let reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        Ok(reports
            .iter()
            .filter(|r| r.guild_id == guild_id)
            .max_by_key(|r| r.week_end)
            .cloned())
    }
}
