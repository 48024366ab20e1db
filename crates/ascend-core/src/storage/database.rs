//! SQLite-based progression storage and session log.
//!
//! Provides persistent storage for:
//! - Per-user progression records (XP, level, streak, minutes, badges)
//! - The append-only log of completed focus sessions
//! - Weekly report snapshots

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use super::migrations;
use super::records::{CompletedSessionRecord, UserProgressionRecord};
use super::traits::{ReportArchive, SessionLog, UserStore};
use crate::error::StoreError;
use crate::stats::WeeklyReport;

const USER_COLUMNS: &str = "user_id, display_name, xp, level, streak_days, \
     study_minutes_total, badges, last_focus_at, joined_at";

/// SQLite database for progression storage.
///
/// A single connection behind a mutex; every statement is short and no
/// lock is held across an await point.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/ascend/ascend.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::open_at(&dir.join("ascend.db"))
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_sync(conn: &Connection, user_id: &str) -> Result<Option<UserProgressionRecord>, StoreError> {
        let raw = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
                RawUser::from_row,
            )
            .optional()?;
        raw.map(RawUser::into_record).transpose()
    }
}

/// Row as stored, before decoding text columns.
struct RawUser {
    user_id: String,
    display_name: String,
    xp: u64,
    level: u32,
    streak_days: u32,
    study_minutes_total: u64,
    badges: String,
    last_focus_at: Option<String>,
    joined_at: String,
}

impl RawUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            display_name: row.get(1)?,
            xp: row.get(2)?,
            level: row.get(3)?,
            streak_days: row.get(4)?,
            study_minutes_total: row.get(5)?,
            badges: row.get(6)?,
            last_focus_at: row.get(7)?,
            joined_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<UserProgressionRecord, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            key: self.user_id.clone(),
            message,
        };
        let badges: Vec<String> =
            serde_json::from_str(&self.badges).map_err(|e| corrupt(format!("badges: {e}")))?;
        let last_focus_at = self
            .last_focus_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| corrupt(format!("last_focus_at: {e}")))?;
        let joined_at =
            parse_timestamp(&self.joined_at).map_err(|e| corrupt(format!("joined_at: {e}")))?;

        Ok(UserProgressionRecord {
            user_id: self.user_id,
            display_name: self.display_name,
            xp: self.xp,
            level: self.level,
            streak_days: self.streak_days,
            study_minutes_total: self.study_minutes_total,
            badges,
            last_focus_at,
            joined_at,
        })
    }
}

/// Fixed-width UTC text so lexical order matches time order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl UserStore for Database {
    async fn ensure(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<UserProgressionRecord, StoreError> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (user_id, display_name, joined_at) VALUES (?1, ?2, ?3)",
            params![user_id, display_name, format_timestamp(Utc::now())],
        )?;
        if inserted > 0 {
            tracing::info!(user_id, display_name, "created user record");
        }
        Self::load_sync(&conn, user_id)?.ok_or_else(|| StoreError::Corrupt {
            key: user_id.to_string(),
            message: "row missing after insert".into(),
        })
    }

    async fn load(&self, user_id: &str) -> Result<Option<UserProgressionRecord>, StoreError> {
        Self::load_sync(&self.conn(), user_id)
    }

    async fn save(&self, record: &UserProgressionRecord) -> Result<(), StoreError> {
        let badges = serde_json::to_string(&record.badges).map_err(|e| StoreError::Corrupt {
            key: record.user_id.clone(),
            message: e.to_string(),
        })?;
        self.conn().execute(
            "INSERT INTO users (user_id, display_name, xp, level, streak_days,
                                study_minutes_total, badges, last_focus_at, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                xp = excluded.xp,
                level = excluded.level,
                streak_days = excluded.streak_days,
                study_minutes_total = excluded.study_minutes_total,
                badges = excluded.badges,
                last_focus_at = excluded.last_focus_at",
            params![
                record.user_id,
                record.display_name,
                record.xp,
                record.level,
                record.streak_days,
                record.study_minutes_total,
                badges,
                record.last_focus_at.map(format_timestamp),
                format_timestamp(record.joined_at),
            ],
        )?;
        Ok(())
    }

    async fn rank(&self, xp: u64) -> Result<u64, StoreError> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE xp > ?1",
            params![xp],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    async fn top_by_xp(&self, limit: usize) -> Result<Vec<UserProgressionRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY xp DESC, user_id ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], RawUser::from_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?.into_record()?);
        }
        Ok(users)
    }
}

#[async_trait]
impl SessionLog for Database {
    async fn append(&self, record: &CompletedSessionRecord) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO focus_sessions (user_id, guild_id, duration_minutes, xp_earned, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.user_id,
                record.guild_id,
                record.duration_minutes,
                record.xp_earned,
                format_timestamp(record.completed_at),
            ],
        )?;
        Ok(())
    }

    async fn completed_between(
        &self,
        guild_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CompletedSessionRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, guild_id, duration_minutes, xp_earned, completed_at
             FROM focus_sessions
             WHERE guild_id = ?1 AND completed_at >= ?2 AND completed_at < ?3
             ORDER BY completed_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![guild_id, format_timestamp(since), format_timestamp(until)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )?;

        let mut sessions = Vec::new();
        for row in rows {
            let (user_id, guild_id, duration_minutes, xp_earned, completed_at) = row?;
            let completed_at = parse_timestamp(&completed_at).map_err(|e| StoreError::Corrupt {
                key: user_id.clone(),
                message: format!("completed_at: {e}"),
            })?;
            sessions.push(CompletedSessionRecord {
                user_id,
                guild_id,
                duration_minutes,
                xp_earned,
                completed_at,
            });
        }
        Ok(sessions)
    }
}

#[async_trait]
impl ReportArchive for Database {
    async fn archive(&self, report: &WeeklyReport) -> Result<(), StoreError> {
        let json = serde_json::to_string(report).map_err(|e| StoreError::Corrupt {
            key: report.guild_id.clone(),
            message: e.to_string(),
        })?;
        self.conn().execute(
            "INSERT INTO weekly_reports (guild_id, week_start, week_end, total_minutes, report)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.guild_id,
                format_timestamp(report.week_start),
                format_timestamp(report.week_end),
                report.total_minutes,
                json,
            ],
        )?;
        Ok(())
    }

    async fn latest_report(&self, guild_id: &str) -> Result<Option<WeeklyReport>, StoreError> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT report FROM weekly_reports WHERE guild_id = ?1
                 ORDER BY week_end DESC, id DESC LIMIT 1",
                params![guild_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                key: guild_id.to_string(),
                message: format!("weekly report: {e}"),
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn ensure_then_save_roundtrip() {
        let db = Database::open_memory().unwrap();
        let mut record = db.ensure("u1", "alice").await.unwrap();
        assert_eq!(record.xp, 0);
        assert!(record.badges.is_empty());

        record.xp = 460;
        record.level = 2;
        record.streak_days = 3;
        record.study_minutes_total = 610;
        record.badges.push("10hr Focus".into());
        record.last_focus_at = Some(Utc::now());
        db.save(&record).await.unwrap();

        let loaded = db.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.xp, 460);
        assert_eq!(loaded.badges, vec!["10hr Focus".to_string()]);
        assert_eq!(loaded.streak_days, 3);
        assert!(loaded.last_focus_at.is_some());

        let again = db.ensure("u1", "other").await.unwrap();
        assert_eq!(again.display_name, "alice");
        assert_eq!(again.xp, 460);
    }

    #[tokio::test]
    async fn load_missing_user() {
        let db = Database::open_memory().unwrap();
        assert!(db.load("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rank_and_leaderboard() {
        let db = Database::open_memory().unwrap();
        for (id, xp) in [("a", 10u64), ("b", 300), ("c", 150)] {
            let mut r = db.ensure(id, id).await.unwrap();
            r.xp = xp;
            db.save(&r).await.unwrap();
        }
        assert_eq!(db.rank(150).await.unwrap(), 1);
        assert_eq!(db.rank(300).await.unwrap(), 0);

        let top = db.top_by_xp(2).await.unwrap();
        let ids: Vec<_> = top.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn session_log_window() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        for days_ago in [0, 3, 8] {
            db.append(&CompletedSessionRecord {
                user_id: "u1".into(),
                guild_id: "g1".into(),
                duration_minutes: 30,
                xp_earned: 50,
                completed_at: now - Duration::days(days_ago) - Duration::minutes(1),
            })
            .await
            .unwrap();
        }
        let week = db
            .completed_between("g1", now - Duration::days(7), now)
            .await
            .unwrap();
        assert_eq!(week.len(), 2);
        assert!(week[0].completed_at < week[1].completed_at);
        assert!(db
            .completed_between("g2", now - Duration::days(7), now)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn latest_report_is_newest_week() {
        let db = Database::open_memory().unwrap();
        assert!(db.latest_report("g1").await.unwrap().is_none());

        let end = Utc::now();
        for weeks_ago in [1, 0, 2] {
            let until = end - Duration::weeks(weeks_ago);
            let report =
                WeeklyReport::build("g1", &[], &[], until - Duration::days(7), until);
            db.archive(&report).await.unwrap();
        }
        db.archive(&WeeklyReport::build("g2", &[], &[], end, end + Duration::days(7)))
            .await
            .unwrap();

        let latest = db.latest_report("g1").await.unwrap().unwrap();
        assert_eq!(latest.guild_id, "g1");
        assert_eq!(format_timestamp(latest.week_end), format_timestamp(end));
    }

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ascend.db");
        Database::open_at(&path).unwrap();
        assert!(path.exists());
    }
}
