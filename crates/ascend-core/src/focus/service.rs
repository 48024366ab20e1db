//! Focus service: the entry point command handlers talk to.
//!
//! Validates requests, consults the cooldown gate, and arms sessions in the
//! registry with the completion pipeline as their callback.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::cooldown::CooldownGate;
use super::pipeline::CompletionPipeline;
use super::registry::{ActiveSessionView, SessionHandle, SessionRegistry};
use crate::clock::Clock;
use crate::error::StartError;
use crate::integrations::{BadgeHook, NotificationSink};
use crate::storage::{Config, FocusConfig, SessionLog, UserStore};

/// Cooldown action name for starting a focus session.
pub const FOCUS_ACTION: &str = "focus";

pub struct FocusService {
    config: FocusConfig,
    cooldowns: Arc<CooldownGate>,
    registry: Arc<SessionRegistry>,
    pipeline: Arc<CompletionPipeline>,
}

impl FocusService {
    pub fn new(config: FocusConfig, pipeline: CompletionPipeline) -> Self {
        Self {
            config,
            cooldowns: Arc::new(CooldownGate::new()),
            registry: Arc::new(SessionRegistry::default()),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Same as [`FocusService::new`], with `clock` driving both session
    /// timestamps and progression dates.
    pub fn with_clock(
        config: FocusConfig,
        pipeline: CompletionPipeline,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            cooldowns: Arc::new(CooldownGate::new()),
            registry: Arc::new(SessionRegistry::new(clock.clone())),
            pipeline: Arc::new(pipeline.with_clock(clock)),
        }
    }

    /// Wire a service from loaded configuration and the given adapters.
    pub fn from_config(
        config: &Config,
        users: Arc<dyn UserStore>,
        log: Arc<dyn SessionLog>,
        sink: Arc<dyn NotificationSink>,
        badge_hook: Arc<dyn BadgeHook>,
    ) -> Self {
        let pipeline = CompletionPipeline::new(users, log, sink, badge_hook)
            .with_rules(config.progression.clone())
            .with_badges(config.badges.clone());
        Self::new(config.focus.clone(), pipeline)
    }

    /// Start a focus session.
    ///
    /// Checks run in order: duration bounds, an already-active session, then
    /// the cooldown. On success the user's focus cooldown restarts.
    ///
    /// # Errors
    /// Returns the first [`StartError`] that applies; nothing is changed.
    pub fn start_focus_session(
        &self,
        user_id: &str,
        guild_id: &str,
        channel_id: &str,
        duration_minutes: u32,
    ) -> Result<SessionHandle, StartError> {
        self.start(user_id, None, guild_id, channel_id, duration_minutes)
    }

    /// [`FocusService::start_focus_session`] for a user known by
    /// `display_name`. The name is recorded if the user has no progression
    /// record yet when the session completes.
    pub fn start_focus_session_as(
        &self,
        user_id: &str,
        display_name: &str,
        guild_id: &str,
        channel_id: &str,
        duration_minutes: u32,
    ) -> Result<SessionHandle, StartError> {
        self.start(
            user_id,
            Some(display_name),
            guild_id,
            channel_id,
            duration_minutes,
        )
    }

    fn start(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        guild_id: &str,
        channel_id: &str,
        duration_minutes: u32,
    ) -> Result<SessionHandle, StartError> {
        let (min, max) = (
            self.config.min_duration_minutes,
            self.config.max_duration_minutes,
        );
        if !(min..=max).contains(&duration_minutes) {
            return Err(StartError::DurationOutOfRange {
                min,
                max,
                got: duration_minutes,
            });
        }

        if self.registry.get(user_id).is_some() {
            return Err(StartError::AlreadyActive(crate::error::AlreadyActive {
                user_id: user_id.to_string(),
            }));
        }

        let remaining_ms = self.cooldowns.check(user_id, FOCUS_ACTION);
        if remaining_ms > 0 {
            debug!(user_id, remaining_ms, "focus start rejected by cooldown");
            return Err(StartError::OnCooldown { remaining_ms });
        }

        let pipeline = Arc::clone(&self.pipeline);
        let display_name = display_name.map(str::to_string);
        let handle = self.registry.start(
            user_id,
            guild_id,
            channel_id,
            duration_minutes,
            move |mut session| async move {
                session.display_name = display_name;
                pipeline.complete(session).await
            },
        )?;

        self.cooldowns.set(user_id, FOCUS_ACTION, self.config.cooldown());
        info!(user_id, guild_id, duration_minutes, "focus session started");
        Ok(handle)
    }

    /// Cancel the user's session. No XP is granted and the cooldown stays.
    pub fn cancel_focus_session(&self, user_id: &str) -> bool {
        self.registry.cancel(user_id)
    }

    pub fn get_active_session(&self, user_id: &str) -> Option<ActiveSessionView> {
        self.registry.get(user_id)
    }

    pub fn active_session_count(&self) -> usize {
        self.registry.count()
    }

    pub fn active_users(&self) -> Vec<String> {
        self.registry.active_users()
    }

    /// Milliseconds until the user may start another session.
    pub fn cooldown_remaining(&self, user_id: &str) -> u64 {
        self.cooldowns.check(user_id, FOCUS_ACTION)
    }

    /// Periodically drop expired cooldown entries at the configured interval.
    pub fn spawn_cooldown_sweep(&self) -> JoinHandle<()> {
        self.spawn_cooldown_sweep_every(self.config.sweep_interval())
    }

    pub fn spawn_cooldown_sweep_every(&self, period: Duration) -> JoinHandle<()> {
        let gate = Arc::clone(&self.cooldowns);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = gate.sweep();
                if removed > 0 {
                    debug!(removed, remaining = gate.len(), "swept expired cooldowns");
                }
            }
        })
    }

    /// Disarm every active session. Returns how many were cancelled.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "cancelled active focus sessions on shutdown");
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{LogSink, NoopBadgeHook};
    use crate::storage::MemoryStore;

    fn service() -> (FocusService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = CompletionPipeline::new(
            store.clone(),
            store.clone(),
            Arc::new(LogSink::new()),
            Arc::new(NoopBadgeHook),
        );
        (FocusService::new(FocusConfig::default(), pipeline), store)
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_out_of_range_duration() {
        let (svc, _) = service();
        for got in [0, 4, 181] {
            let err = svc.start_focus_session("u1", "g1", "c1", got).unwrap_err();
            assert!(matches!(
                err,
                StartError::DurationOutOfRange { min: 5, max: 180, .. }
            ));
        }
        assert_eq!(svc.cooldown_remaining("u1"), 0, "rejection sets no cooldown");
        assert!(svc.start_focus_session("u1", "g1", "c1", 5).is_ok());
        svc.shutdown();
        assert!(svc.start_focus_session("u2", "g1", "c1", 180).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn active_session_checked_before_cooldown() {
        let (svc, _) = service();
        svc.start_focus_session("u1", "g1", "c1", 25).unwrap();
        let err = svc.start_focus_session("u1", "g1", "c1", 25).unwrap_err();
        assert!(matches!(err, StartError::AlreadyActive(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_cooldown() {
        let (svc, store) = service();
        svc.start_focus_session("u1", "g1", "c1", 25).unwrap();
        assert!(svc.cancel_focus_session("u1"));

        let err = svc.start_focus_session("u1", "g1", "c1", 25).unwrap_err();
        assert!(matches!(err, StartError::OnCooldown { remaining_ms } if remaining_ms <= 300_000));

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert!(store.user("u1").is_none(), "cancelled session granted nothing");
        assert!(svc.start_focus_session("u1", "g1", "c1", 25).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn named_start_records_display_name() {
        let (svc, store) = service();
        svc.start_focus_session_as("u1", "alice", "g1", "c1", 5).unwrap();
        let err = svc
            .start_focus_session_as("u1", "alice", "g1", "c1", 5)
            .unwrap_err();
        assert!(matches!(err, StartError::AlreadyActive(_)));

        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        let record = store.user("u1").unwrap();
        assert_eq!(record.display_name, "alice");
        assert_eq!(record.study_minutes_total, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_drops_expired_entries() {
        let (svc, _) = service();
        svc.start_focus_session("u1", "g1", "c1", 5).unwrap();
        svc.cancel_focus_session("u1");
        let sweeper = svc.spawn_cooldown_sweep_every(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(6 * 60 + 30)).await;
        assert_eq!(svc.cooldowns.len(), 0);
        sweeper.abort();
    }
}
