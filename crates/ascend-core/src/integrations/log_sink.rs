//! Log-only notification sink.
//!
//! Emits every delivery through `tracing` and keeps a bounded history of
//! recent deliveries so a host process (or a test) can inspect them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::traits::NotificationSink;
use crate::error::SinkError;
use crate::events::Notification;

const HISTORY_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DeliveryTarget {
    Channel(String),
    User(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub target: DeliveryTarget,
    pub notification: Notification,
}

#[derive(Debug, Default)]
pub struct LogSink {
    history: Mutex<VecDeque<Delivery>>,
    dm_enabled: bool,
    fail_channels: AtomicBool,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept direct messages instead of reporting them unavailable.
    pub fn with_direct_messages(mut self) -> Self {
        self.dm_enabled = true;
        self
    }

    /// Make channel deliveries fail (for exercising best-effort paths).
    pub fn fail_channels(&self, fail: bool) {
        self.fail_channels.store(fail, Ordering::SeqCst);
    }

    /// Recent deliveries, oldest first.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Drain the history.
    pub fn take_deliveries(&self) -> Vec<Delivery> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    fn record(&self, target: DeliveryTarget, notification: &Notification) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(Delivery {
            target,
            notification: notification.clone(),
        });
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_to_channel(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), SinkError> {
        if self.fail_channels.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable(format!("channel {channel_id}")));
        }
        info!(channel_id, message = %notification.render(), "notification");
        self.record(DeliveryTarget::Channel(channel_id.to_string()), notification);
        Ok(())
    }

    async fn send_to_user(
        &self,
        user_id: &str,
        notification: &Notification,
    ) -> Result<(), SinkError> {
        if !self.dm_enabled {
            return Err(SinkError::Unavailable("direct messages disabled".into()));
        }
        info!(user_id, message = %notification.render(), "direct notification");
        self.record(DeliveryTarget::User(user_id.to_string()), notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cancelled() -> Notification {
        Notification::SessionCancelled {
            user_id: "u1".into(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_channel_deliveries() {
        let sink = LogSink::new();
        sink.send_to_channel("c1", &cancelled()).await.unwrap();
        let deliveries = sink.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].target, DeliveryTarget::Channel("c1".into()));
        assert!(sink.deliveries().is_empty());
    }

    #[tokio::test]
    async fn direct_messages_opt_in() {
        let sink = LogSink::new();
        assert!(sink.send_to_user("u1", &cancelled()).await.is_err());

        let sink = LogSink::new().with_direct_messages();
        sink.send_to_user("u1", &cancelled()).await.unwrap();
        assert_eq!(sink.deliveries()[0].target, DeliveryTarget::User("u1".into()));
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let sink = LogSink::new();
        for _ in 0..HISTORY_LIMIT + 10 {
            sink.send_to_channel("c1", &cancelled()).await.unwrap();
        }
        assert_eq!(sink.deliveries().len(), HISTORY_LIMIT);
    }
}
