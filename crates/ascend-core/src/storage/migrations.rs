//! Database schema migrations for ascend.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// v1: user progression and the completed-session log.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            user_id             TEXT PRIMARY KEY,
            display_name        TEXT NOT NULL,
            xp                  INTEGER NOT NULL DEFAULT 0,
            level               INTEGER NOT NULL DEFAULT 0,
            streak_days         INTEGER NOT NULL DEFAULT 0,
            study_minutes_total INTEGER NOT NULL DEFAULT 0,
            badges              TEXT NOT NULL DEFAULT '[]',
            last_focus_at       TEXT,
            joined_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS focus_sessions (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id          TEXT NOT NULL,
            guild_id         TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL CHECK (duration_minutes >= 1),
            xp_earned        INTEGER NOT NULL CHECK (xp_earned >= 0),
            completed_at     TEXT NOT NULL
        );",
    )?;
    set_schema_version(conn, 1)
}

/// v2: indexes for leaderboard and weekly report queries.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_users_xp ON users(xp DESC);
        CREATE INDEX IF NOT EXISTS idx_users_study_minutes ON users(study_minutes_total DESC);
        CREATE INDEX IF NOT EXISTS idx_focus_sessions_guild_completed
            ON focus_sessions(guild_id, completed_at);
        CREATE INDEX IF NOT EXISTS idx_focus_sessions_user_completed
            ON focus_sessions(user_id, completed_at);",
    )?;
    set_schema_version(conn, 2)
}

/// v3: weekly report snapshots, stored as JSON.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS weekly_reports (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id      TEXT NOT NULL,
            week_start    TEXT NOT NULL,
            week_end      TEXT NOT NULL,
            total_minutes INTEGER NOT NULL,
            report        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_weekly_reports_guild_end
            ON weekly_reports(guild_id, week_end DESC);",
    )?;
    set_schema_version(conn, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn fresh_database_reports_version_zero() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 0);
    }
}
