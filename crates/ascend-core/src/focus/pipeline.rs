//! Completion pipeline.
//!
//! Runs once per fired session, after the registry has released it:
//! persist progression, log the session, fire badge side effects, then
//! notify. Only the persistence step can abort a run; everything after it is
//! best-effort.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::registry::CompletedSession;
use super::CompletionStage;
use crate::clock::{Clock, SystemClock};
use crate::error::{PipelineError, StoreError};
use crate::events::Notification;
use crate::integrations::{BadgeHook, NotificationSink};
use crate::progression::{
    apply_session, crossed_badges, default_badges, BadgeDefinition, ProgressionRules,
};
use crate::storage::{CompletedSessionRecord, SessionLog, UserStore};

/// What one completed session changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub user_id: String,
    pub xp_earned: u64,
    pub total_xp: u64,
    pub streak_days: u32,
    pub old_level: u32,
    pub new_level: u32,
    pub badges_awarded: Vec<String>,
    /// False when the session-log append failed.
    pub logged: bool,
}

impl CompletionOutcome {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

pub struct CompletionPipeline {
    users: Arc<dyn UserStore>,
    log: Arc<dyn SessionLog>,
    sink: Arc<dyn NotificationSink>,
    badge_hook: Arc<dyn BadgeHook>,
    rules: ProgressionRules,
    badges: Vec<BadgeDefinition>,
    clock: Arc<dyn Clock>,
}

impl CompletionPipeline {
    pub fn new(
        users: Arc<dyn UserStore>,
        log: Arc<dyn SessionLog>,
        sink: Arc<dyn NotificationSink>,
        badge_hook: Arc<dyn BadgeHook>,
    ) -> Self {
        Self {
            users,
            log,
            sink,
            badge_hook,
            rules: ProgressionRules::default(),
            badges: default_badges(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_rules(mut self, rules: ProgressionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_badges(mut self, badges: Vec<BadgeDefinition>) -> Self {
        self.badges = badges;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the pipeline for one session and log the result.
    pub async fn complete(&self, session: CompletedSession) {
        match self.run(&session).await {
            Ok(outcome) => info!(
                user_id = %outcome.user_id,
                stage = %CompletionStage::Done,
                duration_minutes = session.duration_minutes,
                xp_earned = outcome.xp_earned,
                streak_days = outcome.streak_days,
                new_level = outcome.new_level,
                badges = outcome.badges_awarded.len(),
                "focus session completed"
            ),
            Err(e) => error!(
                user_id = %e.user_id,
                stage = %e.stage,
                error = %e.source,
                "focus completion aborted; no XP granted"
            ),
        }
    }

    /// Run the pipeline for one session.
    ///
    /// # Errors
    /// Returns [`PipelineError`] if the user record could not be loaded
    /// (stage `Firing`) or written (stage `Persisting`). In that case nothing
    /// was persisted and nothing was sent.
    pub async fn run(&self, session: &CompletedSession) -> Result<CompletionOutcome, PipelineError> {
        let user_id = session.user_id.as_str();
        let abort = |stage: CompletionStage| {
            move |source: StoreError| PipelineError {
                user_id: user_id.to_string(),
                stage,
                source,
            }
        };

        let display_name = session.display_name.as_deref().unwrap_or(user_id);
        let mut record = self
            .users
            .ensure(user_id, display_name)
            .await
            .map_err(abort(CompletionStage::Firing))?;
        let now = self.clock.now();
        let progress = apply_session(
            &mut record,
            session.duration_minutes,
            now,
            self.clock.today(),
            &self.rules,
        );
        debug!(
            user_id,
            stage = %CompletionStage::Persisting,
            streak = progress.streak_transition.description(),
            streak_days = progress.streak_days,
            "progression applied"
        );

        let crossed: Vec<BadgeDefinition> =
            crossed_badges(&record.badges, record.study_minutes_total, &self.badges)
                .into_iter()
                .cloned()
                .collect();
        for badge in &crossed {
            record.grant_badge(&badge.name);
        }

        self.users
            .save(&record)
            .await
            .map_err(abort(CompletionStage::Persisting))?;

        let entry = CompletedSessionRecord {
            user_id: user_id.to_string(),
            guild_id: session.guild_id.clone(),
            duration_minutes: session.duration_minutes,
            xp_earned: progress.xp_earned,
            completed_at: now,
        };
        let logged = match self.log.append(&entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id, error = %e, "failed to append session log; XP already saved");
                false
            }
        };

        for badge in &crossed {
            info!(user_id, badge = %badge.name, "badge awarded");
            if let Err(e) = self
                .badge_hook
                .on_badge_awarded(user_id, &session.guild_id, badge)
                .await
            {
                warn!(user_id, badge = %badge.name, error = %e, "badge side effect failed");
            }
        }

        debug!(user_id, stage = %CompletionStage::Notifying, "sending completion notices");
        let completed = Notification::SessionCompleted {
            user_id: user_id.to_string(),
            duration_minutes: session.duration_minutes,
            xp_earned: progress.xp_earned,
            streak_days: progress.streak_days,
            at: now,
        };
        self.notify(&session.channel_id, &completed).await;

        if progress.leveled_up() {
            let level_up = Notification::LevelUp {
                user_id: user_id.to_string(),
                new_level: progress.new_level,
                total_xp: progress.total_xp,
                at: now,
            };
            self.notify(&session.channel_id, &level_up).await;
        }

        Ok(CompletionOutcome {
            user_id: user_id.to_string(),
            xp_earned: progress.xp_earned,
            total_xp: progress.total_xp,
            streak_days: progress.streak_days,
            old_level: progress.old_level,
            new_level: progress.new_level,
            badges_awarded: crossed.into_iter().map(|b| b.name).collect(),
            logged,
        })
    }

    async fn notify(&self, channel_id: &str, notification: &Notification) {
        if let Err(e) = self.sink.send_to_channel(channel_id, notification).await {
            warn!(
                sink = self.sink.name(),
                channel_id,
                error = %e,
                "notification not delivered"
            );
        }
    }
}
