//! Platform-neutral badge side effects.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::traits::{BadgeHook, NotificationSink};
use crate::error::HookError;
use crate::events::Notification;
use crate::progression::BadgeDefinition;

/// Announces a badge in a configured channel and DMs the winner.
///
/// Without an announcement channel only the DM is attempted. The DM is
/// best-effort and never fails the hook.
pub struct AnnounceBadgeHook {
    sink: Arc<dyn NotificationSink>,
    announce_channel_id: Option<String>,
}

impl AnnounceBadgeHook {
    pub fn new(sink: Arc<dyn NotificationSink>, announce_channel_id: Option<String>) -> Self {
        Self {
            sink,
            announce_channel_id,
        }
    }
}

#[async_trait]
impl BadgeHook for AnnounceBadgeHook {
    async fn on_badge_awarded(
        &self,
        user_id: &str,
        _guild_id: &str,
        badge: &BadgeDefinition,
    ) -> Result<(), HookError> {
        let notification = Notification::BadgeAwarded {
            user_id: user_id.to_string(),
            badge: badge.name.clone(),
            emoji: badge.emoji.clone(),
            at: Utc::now(),
        };

        if let Err(e) = self.sink.send_to_user(user_id, &notification).await {
            debug!(user_id, error = %e, "badge DM not delivered");
        }

        if let Some(channel_id) = &self.announce_channel_id {
            self.sink.send_to_channel(channel_id, &notification).await?;
        }
        Ok(())
    }
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBadgeHook;

#[async_trait]
impl BadgeHook for NoopBadgeHook {
    async fn on_badge_awarded(
        &self,
        _user_id: &str,
        _guild_id: &str,
        _badge: &BadgeDefinition,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{DeliveryTarget, LogSink};

    #[tokio::test]
    async fn announces_in_channel_and_dms() {
        let sink = Arc::new(LogSink::new().with_direct_messages());
        let hook = AnnounceBadgeHook::new(sink.clone(), Some("board".into()));
        let badge = BadgeDefinition::new("Scholar", 3_000, "📚");

        hook.on_badge_awarded("u1", "g1", &badge).await.unwrap();

        let targets: Vec<_> = sink.deliveries().into_iter().map(|d| d.target).collect();
        assert_eq!(
            targets,
            vec![
                DeliveryTarget::User("u1".into()),
                DeliveryTarget::Channel("board".into())
            ]
        );
    }

    #[tokio::test]
    async fn closed_dms_do_not_fail() {
        let sink = Arc::new(LogSink::new());
        let hook = AnnounceBadgeHook::new(sink.clone(), None);
        let badge = BadgeDefinition::new("Scholar", 3_000, "📚");
        hook.on_badge_awarded("u1", "g1", &badge).await.unwrap();
        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test]
    async fn channel_failure_surfaces() {
        let sink = Arc::new(LogSink::new());
        sink.fail_channels(true);
        let hook = AnnounceBadgeHook::new(sink, Some("board".into()));
        let badge = BadgeDefinition::new("Scholar", 3_000, "📚");
        assert!(matches!(
            hook.on_badge_awarded("u1", "g1", &badge).await,
            Err(HookError::Announce(_))
        ));
    }
}
