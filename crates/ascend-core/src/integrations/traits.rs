use async_trait::async_trait;

use crate::error::{HookError, SinkError};
use crate::events::Notification;
use crate::progression::BadgeDefinition;

/// Delivers notifications to the community platform.
///
/// Delivery is best-effort from the engine's point of view: the completion
/// pipeline logs failures and moves on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Unique identifier (e.g. "discord", "log").
    fn name(&self) -> &str;

    /// Post to a channel.
    async fn send_to_channel(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), SinkError>;

    /// Direct message a user. May legitimately fail (DMs closed).
    async fn send_to_user(
        &self,
        _user_id: &str,
        _notification: &Notification,
    ) -> Result<(), SinkError> {
        Err(SinkError::Unavailable(format!(
            "{} cannot deliver direct messages",
            self.name()
        )))
    }
}

/// Side effects of earning a badge (role grant, announcement).
///
/// Runs after the badge is recorded; a failure never revokes it.
#[async_trait]
pub trait BadgeHook: Send + Sync {
    async fn on_badge_awarded(
        &self,
        user_id: &str,
        guild_id: &str,
        badge: &BadgeDefinition,
    ) -> Result<(), HookError>;
}
