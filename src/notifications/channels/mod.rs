//! Notification channel plugins and their registry.
//!
//! A raised `SenderError` from `send` is the only delivery-failure signal;
//! channels must not swallow errors (a webhook answering 4xx/5xx raises).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::payload::NotificationPayload;
use crate::mail::MailError;

pub mod discord;
pub mod email;
pub mod slack;
pub mod webhook;

pub use discord::DiscordChannel;
pub use email::EmailChannel;
pub use slack::SlackChannel;
pub use webhook::WebhookChannel;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("mail protocol error: {0}")]
    Mail(#[from] MailError),
}

/// A delivery medium for notifications.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel_type(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn config_schema(&self) -> Value;

    /// Formats and delivers the payload. Any delivery problem must surface
    /// as an error so the caller can record a failed log entry.
    async fn send(&self, config: &Value, payload: &NotificationPayload)
        -> Result<(), SenderError>;

    /// Verifies the configuration can reach its target without delivering a
    /// real notification (where the medium allows it).
    async fn test_connection(&self, config: &Value) -> Result<(), SenderError>;
}

#[derive(Debug, Error)]
pub enum ChannelRegistryError {
    #[error("channel type '{0}' is already registered")]
    Duplicate(String),
    #[error("unknown channel type '{0}'")]
    Unknown(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelDescriptor {
    #[serde(rename = "type")]
    pub channel_type: &'static str,
    pub display_name: &'static str,
    pub config_schema: Value,
}

#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<&'static str, Arc<dyn NotificationSender>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Result<Self, ChannelRegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailChannel))?;
        registry.register(Arc::new(WebhookChannel))?;
        registry.register(Arc::new(SlackChannel))?;
        registry.register(Arc::new(DiscordChannel))?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<(), ChannelRegistryError> {
        let channel_type = sender.channel_type();
        if self.channels.contains_key(channel_type) {
            return Err(ChannelRegistryError::Duplicate(channel_type.to_string()));
        }
        self.channels.insert(channel_type, sender);
        Ok(())
    }

    pub fn is_registered(&self, channel_type: &str) -> bool {
        self.channels.contains_key(channel_type)
    }

    pub fn get(&self, channel_type: &str) -> Result<Arc<dyn NotificationSender>, ChannelRegistryError> {
        self.channels
            .get(channel_type)
            .cloned()
            .ok_or_else(|| ChannelRegistryError::Unknown(channel_type.to_string()))
    }

    pub fn list(&self) -> Vec<ChannelDescriptor> {
        let mut descriptors: Vec<ChannelDescriptor> = self
            .channels
            .values()
            .map(|sender| ChannelDescriptor {
                channel_type: sender.channel_type(),
                display_name: sender.display_name(),
                config_schema: sender.config_schema(),
            })
            .collect();
        descriptors.sort_by_key(|d| d.channel_type);
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registers_all_channels() {
        let registry = ChannelRegistry::builtin().unwrap();
        for channel_type in ["email", "webhook", "slack", "discord"] {
            assert!(registry.is_registered(channel_type), "{channel_type} missing");
        }
        assert_eq!(registry.list().len(), 4);
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut registry = ChannelRegistry::builtin().unwrap();
        let err = registry.register(Arc::new(SlackChannel)).unwrap_err();
        assert!(matches!(err, ChannelRegistryError::Duplicate(t) if t == "slack"));
    }

    #[test]
    fn unknown_lookup_is_a_client_error() {
        let registry = ChannelRegistry::builtin().unwrap();
        assert!(matches!(
            registry.get("pager"),
            Err(ChannelRegistryError::Unknown(t)) if t == "pager"
        ));
    }
}
