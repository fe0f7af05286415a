//! In-memory per-organization event bus for live check-result streams.
//!
//! Channels are bounded broadcast queues; slow subscribers lose the oldest
//! events rather than back-pressuring the publishing executor.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::db::models::CheckStatus;

const CHANNEL_CAPACITY: usize = 100;

/// Live event emitted after every check execution.
#[derive(Debug, Clone, Serialize)]
pub struct CheckEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub check_id: i32,
    pub site_id: i32,
    pub site_name: String,
    pub check_name: String,
    pub status: CheckStatus,
    pub response_time_ms: Option<i32>,
    pub checked_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

/// Conventional channel key for an organization's stream.
pub fn org_channel(organization_id: i32) -> String {
    format!("org:{organization_id}")
}

#[derive(Default)]
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<CheckEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes to all current subscribers of the channel. A channel with
    /// no subscribers is a no-op; publishing never blocks or fails.
    pub fn publish(&self, channel: &str, event: CheckEvent) {
        let mut drop_channel = false;
        if let Some(sender) = self.channels.get(channel) {
            match sender.send(event) {
                Ok(delivered) => {
                    debug!(channel, subscribers = delivered, "published check event")
                }
                // All receivers are gone; reap the channel entry.
                Err(_) => drop_channel = true,
            }
        }
        if drop_channel {
            self.channels
                .remove_if(channel, |_, sender| sender.receiver_count() == 0);
        }
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<CheckEvent> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Dropping the receiver deregisters a subscriber; this additionally
    /// reaps the channel entry once its last subscriber is gone.
    pub fn unsubscribe(&self, channel: &str, receiver: broadcast::Receiver<CheckEvent>) {
        drop(receiver);
        self.channels
            .remove_if(channel, |_, sender| sender.receiver_count() == 0);
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(check_id: i32) -> CheckEvent {
        CheckEvent {
            kind: "check_result",
            check_id,
            site_id: 1,
            site_name: "example".to_string(),
            check_name: "http".to_string(),
            status: CheckStatus::Success,
            response_time_ms: Some(12),
            checked_at: Utc::now(),
            error_message: None,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("org:1");
        bus.publish("org:1", event(7));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.check_id, 7);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("org:1", event(1));
        assert_eq!(bus.subscriber_count("org:1"), 0);
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe("org:1");
        let mut rx2 = bus.subscribe("org:2");
        bus.publish("org:1", event(1));
        assert_eq!(rx1.recv().await.unwrap().check_id, 1);
        assert!(matches!(
            rx2.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn slow_subscribers_lose_oldest_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("org:1");
        for i in 0..(CHANNEL_CAPACITY as i32 + 10) {
            bus.publish("org:1", event(i));
        }
        // The first receive reports the lag, then the stream resumes from
        // the oldest retained event.
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(rx.recv().await.unwrap().check_id, 10);
    }

    #[tokio::test]
    async fn unsubscribe_reaps_empty_channels() {
        let bus = EventBus::new();
        let rx = bus.subscribe("org:1");
        assert_eq!(bus.subscriber_count("org:1"), 1);
        bus.unsubscribe("org:1", rx);
        assert_eq!(bus.subscriber_count("org:1"), 0);
    }

    #[test]
    fn event_serializes_with_type_field() {
        let value = serde_json::to_value(event(3)).unwrap();
        assert_eq!(value["type"], "check_result");
        assert_eq!(value["status"], "success");
    }
}
