//! Session registry.
//!
//! Holds at most one active focus session per user and owns the deferred
//! completion task of each one.
//!
//! ## Fire/cancel race
//!
//! Both paths go through the same lock. `cancel` removes the entry and aborts
//! the task; the task, once its sleep elapses, removes the entry only if it
//! still carries the task's own session id. Whichever runs first wins and the
//! other becomes a no-op, so a `cancel` that returned `true` can never be
//! followed by a completion callback.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::CompletionStage;
use crate::clock::{Clock, SystemClock};
use crate::error::AlreadyActive;

/// Session handed to the completion callback after the registry released it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    /// Name for the user's record if the pipeline has to create one.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub user_id: String,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Read-only snapshot of an active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionView {
    pub session_id: Uuid,
    pub user_id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub remaining_ms: u64,
}

impl ActiveSessionView {
    /// Whole minutes left, rounded up.
    pub fn remaining_minutes(&self) -> u64 {
        self.remaining_ms.div_ceil(60_000)
    }
}

struct ActiveSession {
    session_id: Uuid,
    guild_id: String,
    channel_id: String,
    duration_minutes: u32,
    started_at: DateTime<Utc>,
    armed_at: Instant,
    completion: AbortHandle,
}

impl ActiveSession {
    fn duration(&self) -> Duration {
        minutes(self.duration_minutes)
    }

    fn view(&self, user_id: &str) -> ActiveSessionView {
        let total = self.duration();
        let elapsed = self.armed_at.elapsed().min(total);
        ActiveSessionView {
            session_id: self.session_id,
            user_id: user_id.to_string(),
            guild_id: self.guild_id.clone(),
            channel_id: self.channel_id.clone(),
            duration_minutes: self.duration_minutes,
            started_at: self.started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            remaining_ms: (total - elapsed).as_millis() as u64,
        }
    }

    fn into_completed(self, user_id: String) -> CompletedSession {
        CompletedSession {
            session_id: self.session_id,
            user_id,
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            duration_minutes: self.duration_minutes,
            started_at: self.started_at,
            display_name: None,
        }
    }
}

fn minutes(n: u32) -> Duration {
    Duration::from_secs(n as u64 * 60)
}

/// In-memory table of active sessions keyed by user id.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, ActiveSession>>,
    clock: Arc<dyn Clock>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a session and arm its completion task.
    ///
    /// After `duration_minutes` of wall-clock time `on_complete` runs exactly
    /// once, unless the session was cancelled first. The registry entry is
    /// already gone when it runs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(
        self: &Arc<Self>,
        user_id: &str,
        guild_id: &str,
        channel_id: &str,
        duration_minutes: u32,
        on_complete: F,
    ) -> Result<SessionHandle, AlreadyActive>
    where
        F: FnOnce(CompletedSession) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut sessions = self.lock();
        if sessions.contains_key(user_id) {
            return Err(AlreadyActive {
                user_id: user_id.to_string(),
            });
        }

        let session_id = Uuid::new_v4();
        let started_at = self.clock.now();
        let duration = minutes(duration_minutes);
        let registry = Arc::downgrade(self);
        let owner = user_id.to_string();

        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let Some(completed) = registry.take_fired(&owner, session_id) else {
                debug!(user_id = %owner, %session_id, "timer fired for a released session");
                return;
            };
            drop(registry);
            debug!(
                user_id = %owner,
                %session_id,
                stage = %CompletionStage::Firing,
                "focus session fired"
            );
            on_complete(completed).await;
        });

        sessions.insert(
            user_id.to_string(),
            ActiveSession {
                session_id,
                guild_id: guild_id.to_string(),
                channel_id: channel_id.to_string(),
                duration_minutes,
                started_at,
                armed_at: Instant::now(),
                completion: task.abort_handle(),
            },
        );

        info!(
            user_id,
            %session_id,
            duration_minutes,
            stage = %CompletionStage::Armed,
            "focus session armed"
        );

        let ends_at = started_at
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        Ok(SessionHandle {
            session_id,
            user_id: user_id.to_string(),
            duration_minutes,
            started_at,
            ends_at,
        })
    }

    /// Remove the entry for a fired timer, if it is still that timer's session.
    fn take_fired(&self, user_id: &str, session_id: Uuid) -> Option<CompletedSession> {
        let mut sessions = self.lock();
        match sessions.get(user_id) {
            Some(active) if active.session_id == session_id => sessions
                .remove(user_id)
                .map(|active| active.into_completed(user_id.to_string())),
            _ => None,
        }
    }

    /// Disarm and remove a user's session. Returns false if none was active.
    pub fn cancel(&self, user_id: &str) -> bool {
        let mut sessions = self.lock();
        match sessions.remove(user_id) {
            Some(active) => {
                active.completion.abort();
                info!(
                    user_id,
                    session_id = %active.session_id,
                    stage = %CompletionStage::Cancelled,
                    "focus session cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Disarm every session. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut sessions = self.lock();
        let count = sessions.len();
        for (_, active) in sessions.drain() {
            active.completion.abort();
        }
        count
    }

    pub fn get(&self, user_id: &str) -> Option<ActiveSessionView> {
        self.lock().get(user_id).map(|active| active.view(user_id))
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn active_users(&self) -> Vec<String> {
        let mut users: Vec<_> = self.lock().keys().cloned().collect();
        users.sort();
        users
    }
}
