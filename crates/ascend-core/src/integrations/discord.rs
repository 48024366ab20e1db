//! Discord integration -- deliver notifications and grant badge roles via the
//! bot REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::badge::AnnounceBadgeHook;
use super::keyring_store;
use super::traits::{BadgeHook, NotificationSink};
use crate::error::{HookError, SinkError};
use crate::events::Notification;
use crate::progression::BadgeDefinition;

const TOKEN_KEY: &str = "discord_bot_token";
const TOKEN_ENV: &str = "ASCEND_DISCORD_TOKEN";

/// Discord REST client authenticated as a bot.
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: String,
}

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

impl DiscordClient {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Build a client from `ASCEND_DISCORD_TOKEN`, falling back to the token
    /// stored in the OS keyring.
    pub fn from_stored_token(api_base: &str) -> Result<Self, SinkError> {
        let token = match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.is_empty() => token,
            _ => keyring_store::get(TOKEN_KEY)
                .map_err(|e| SinkError::NotConfigured(format!("keyring: {e}")))?
                .ok_or_else(|| {
                    SinkError::NotConfigured(format!(
                        "no bot token; set {TOKEN_ENV} or run `ascend-cli auth set-token`"
                    ))
                })?,
        };
        Ok(Self::new(api_base, &token))
    }

    /// Persist a bot token to the OS keyring.
    pub fn store_token(token: &str) -> Result<(), keyring::Error> {
        keyring_store::set(TOKEN_KEY, token)
    }

    /// Whether a bot token is stored in the keyring.
    pub fn has_stored_token() -> Result<bool, keyring::Error> {
        Ok(keyring_store::get(TOKEN_KEY)?.is_some())
    }

    /// Remove the stored bot token.
    pub fn clear_token() -> Result<(), keyring::Error> {
        keyring_store::delete(TOKEN_KEY)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Bot {}", self.token))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, SinkError> {
        let resp = self.authorized(builder).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::FORBIDDEN {
            return Err(SinkError::Unavailable(format!("HTTP 403: {body}")));
        }
        Err(SinkError::Http {
            status: status.as_u16(),
            body,
        })
    }

    /// Post a plain message to a channel.
    pub async fn post_message(&self, channel_id: &str, content: &str) -> Result<(), SinkError> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base);
        let body = json!({
            "content": content,
            "allowed_mentions": { "parse": ["users"] },
        });
        self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    /// Open (or fetch) the DM channel with a user.
    pub async fn open_dm(&self, user_id: &str) -> Result<String, SinkError> {
        let url = format!("{}/users/@me/channels", self.api_base);
        let resp = self
            .send(self.http.post(url).json(&json!({ "recipient_id": user_id })))
            .await?;
        let channel: DmChannel = resp.json().await?;
        Ok(channel.id)
    }

    /// Add a role to a guild member.
    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<(), SinkError> {
        let url = format!(
            "{}/guilds/{guild_id}/members/{user_id}/roles/{role_id}",
            self.api_base
        );
        self.send(self.http.put(url).header("X-Audit-Log-Reason", reason))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send_to_channel(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), SinkError> {
        self.post_message(channel_id, &notification.render()).await
    }

    async fn send_to_user(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> Result<(), SinkError> {
        let channel_id = self.open_dm(user_id).await?;
        self.post_message(&channel_id, &notification.render()).await
    }
}

/// Grants the badge's role, then announces it.
///
/// The announcement is attempted even if the role grant fails; the first
/// failure is returned.
pub struct DiscordBadgeHook {
    client: Arc<DiscordClient>,
    announce: AnnounceBadgeHook,
}

impl DiscordBadgeHook {
    pub fn new(client: Arc<DiscordClient>, announce_channel_id: Option<String>) -> Self {
        let announce = AnnounceBadgeHook::new(client.clone(), announce_channel_id);
        Self { client, announce }
    }
}

#[async_trait]
impl BadgeHook for DiscordBadgeHook {
    async fn on_badge_awarded(
        &self,
        user_id: &str,
        guild_id: &str,
        badge: &BadgeDefinition,
    ) -> Result<(), HookError> {
        let granted = if badge.has_role() {
            let reason = format!("Badge earned: {}", badge.name);
            match self
                .client
                .add_member_role(guild_id, user_id, &badge.role_id, &reason)
                .await
            {
                Ok(()) => {
                    info!(user_id, badge = %badge.name, role_id = %badge.role_id, "assigned badge role");
                    Ok(())
                }
                Err(e) => Err(HookError::RoleGrant {
                    role_id: badge.role_id.clone(),
                    message: e.to_string(),
                }),
            }
        } else {
            debug!(badge = %badge.name, "badge has no role configured");
            Ok(())
        };

        let announced = self.announce.on_badge_awarded(user_id, guild_id, badge).await;
        granted.and(announced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::Matcher;

    fn completed() -> Notification {
        Notification::SessionCompleted {
            user_id: "42".into(),
            duration_minutes: 25,
            xp_earned: 60,
            streak_days: 2,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn posts_channel_message_with_bot_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/c1/messages")
            .match_header("authorization", "Bot secret")
            .match_body(Matcher::Regex("completed a".into()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = DiscordClient::new(&server.url(), "secret");
        client.send_to_channel("c1", &completed()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/channels/c1/messages")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = DiscordClient::new(&server.url(), "secret");
        let err = client.send_to_channel("c1", &completed()).await.unwrap_err();
        assert!(matches!(err, SinkError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn dm_opens_channel_first() {
        let mut server = mockito::Server::new_async().await;
        let open = server
            .mock("POST", "/users/@me/channels")
            .match_body(Matcher::PartialJson(json!({ "recipient_id": "42" })))
            .with_status(200)
            .with_body(r#"{"id":"dm-7"}"#)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/channels/dm-7/messages")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = DiscordClient::new(&server.url(), "secret");
        client.send_to_user("42", &completed()).await.unwrap();
        open.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn closed_dms_are_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/users/@me/channels")
            .with_status(403)
            .with_body(r#"{"code":50007}"#)
            .create_async()
            .await;

        let client = DiscordClient::new(&server.url(), "secret");
        let err = client.send_to_user("42", &completed()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }

    #[tokio::test]
    async fn role_failure_still_announces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/guilds/g1/members/42/roles/r1")
            .with_status(403)
            .create_async()
            .await;
        server
            .mock("POST", "/users/@me/channels")
            .with_status(403)
            .create_async()
            .await;
        let announce = server
            .mock("POST", "/channels/board/messages")
            .match_body(Matcher::Regex("Scholar".into()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = Arc::new(DiscordClient::new(&server.url(), "secret"));
        let hook = DiscordBadgeHook::new(client, Some("board".into()));
        let badge = BadgeDefinition::new("Scholar", 3_000, "📚").with_role("r1");

        let result = hook.on_badge_awarded("42", "g1", &badge).await;
        assert!(matches!(result, Err(HookError::RoleGrant { .. })));
        announce.assert_async().await;
    }

    #[tokio::test]
    async fn role_grant_sends_audit_reason() {
        let mut server = mockito::Server::new_async().await;
        let grant = server
            .mock("PUT", "/guilds/g1/members/42/roles/r1")
            .match_header("x-audit-log-reason", "Badge earned: Titan")
            .with_status(204)
            .create_async()
            .await;

        let client = Arc::new(DiscordClient::new(&server.url(), "secret"));
        let hook = DiscordBadgeHook::new(client, None);
        let badge = BadgeDefinition::new("Titan", 6_000, "⚡").with_role("r1");

        // DM attempt hits an unmocked route and fails silently.
        hook.on_badge_awarded("42", "g1", &badge).await.unwrap();
        grant.assert_async().await;
    }
}
