//! Discord webhook channel.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{NotificationSender, SenderError};
use crate::db::models::{CheckStatus, NotificationTrigger};
use crate::notifications::payload::NotificationPayload;

// Discord embed colors are decimal RGB.
fn status_color(status: CheckStatus) -> u32 {
    match status {
        CheckStatus::Success => 3066993,  // #2ecc71
        CheckStatus::Failure => 15158332, // #e74c3c
        CheckStatus::Warning => 15844367, // #f1c40f
    }
}

fn status_emoji(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Success => "\u{2705}",
        CheckStatus::Failure => "\u{274c}",
        CheckStatus::Warning => "\u{26a0}",
    }
}

fn title_for(payload: &NotificationPayload) -> String {
    let emoji = status_emoji(payload.status);
    match payload.trigger {
        NotificationTrigger::CheckFailure => format!("{emoji} Check Failed"),
        NotificationTrigger::CheckRecovery => format!("{emoji} Check Recovered"),
        NotificationTrigger::IncidentOpened => "\u{1f6a8} Incident Opened".to_string(),
        NotificationTrigger::IncidentResolved => "\u{2705} Incident Resolved".to_string(),
    }
}

/// Embed-structured message.
pub(crate) fn format_message(payload: &NotificationPayload, config: &Value) -> Value {
    let mut fields = vec![
        json!({
            "name": "Site",
            "value": format!("[{}]({})", payload.site_name, payload.site_url),
            "inline": true
        }),
        json!({
            "name": "Check",
            "value": format!("{} ({})", payload.check_name, payload.check_type),
            "inline": true
        }),
        json!({
            "name": "Status",
            "value": payload.status.to_string().to_uppercase(),
            "inline": true
        }),
    ];

    if let Some(response_time_ms) = payload.response_time_ms {
        fields.push(json!({
            "name": "Response Time",
            "value": format!("{response_time_ms}ms"),
            "inline": true
        }));
    }

    if let Some(incident_id) = payload.incident_id {
        fields.push(json!({
            "name": "Incident ID",
            "value": incident_id.to_string(),
            "inline": true
        }));
    }

    if let Some(error_message) = &payload.error_message {
        let truncated: String = error_message.chars().take(1000).collect();
        fields.push(json!({
            "name": "Error Message",
            "value": format!("```{truncated}```"),
            "inline": false
        }));
    }

    let mut embed = json!({
        "title": title_for(payload),
        "color": status_color(payload.status),
        "fields": fields,
        "timestamp": payload.checked_at.to_rfc3339(),
        "footer": { "text": "Sitewatch" }
    });

    if let Some(thumbnail) = config.get("thumbnail_url").and_then(Value::as_str) {
        if !thumbnail.is_empty() {
            embed["thumbnail"] = json!({ "url": thumbnail });
        }
    }

    let mut message = json!({ "embeds": [embed] });
    for key in ["username", "avatar_url", "content"] {
        if let Some(value) = config.get(key).and_then(Value::as_str) {
            if !value.is_empty() {
                message[key] = json!(value);
            }
        }
    }

    message
}

fn webhook_url(config: &Value) -> Result<String, SenderError> {
    let base = config
        .get("webhook_url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            SenderError::InvalidConfiguration("Discord webhook URL is required".into())
        })?;

    // Posting into a thread is addressed at the URL level.
    if let Some(thread_id) = config.get("thread_id").and_then(Value::as_str) {
        if !thread_id.is_empty() {
            let separator = if base.contains('?') { '&' } else { '?' };
            return Ok(format!("{base}{separator}thread_id={thread_id}"));
        }
    }
    Ok(base.to_string())
}

pub struct DiscordChannel;

#[async_trait]
impl NotificationSender for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    fn display_name(&self) -> &'static str {
        "Discord"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["webhook_url"],
            "properties": {
                "webhook_url": {
                    "type": "string",
                    "format": "uri",
                    "title": "Webhook URL",
                    "description": "Discord webhook URL (from channel settings)"
                },
                "username": {
                    "type": "string",
                    "title": "Bot Username",
                    "description": "Override the webhook username. Leave empty for default."
                },
                "avatar_url": {
                    "type": "string",
                    "format": "uri",
                    "title": "Avatar URL",
                    "description": "URL to an image to use as the bot avatar"
                },
                "content": {
                    "type": "string",
                    "title": "Message Content",
                    "description": "Plain text shown above the embed (e.g., a role mention)"
                },
                "thumbnail_url": {
                    "type": "string",
                    "format": "uri",
                    "title": "Thumbnail URL",
                    "description": "Image shown in the embed corner"
                },
                "thread_id": {
                    "type": "string",
                    "title": "Thread ID",
                    "description": "Post into a specific thread instead of the channel"
                }
            }
        })
    }

    async fn send(
        &self,
        config: &Value,
        payload: &NotificationPayload,
    ) -> Result<(), SenderError> {
        let url = webhook_url(config)?;
        let message = format_message(payload, config);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let response = client.post(&url).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Discord webhook returned non-success status: {status}. Body: {body}"
            )));
        }
        Ok(())
    }

    async fn test_connection(&self, config: &Value) -> Result<(), SenderError> {
        let url = webhook_url(config)?;
        let mut message = json!({
            "embeds": [{
                "title": "\u{2705} Sitewatch connection test",
                "description": "Connection test successful! This channel is now configured to receive alerts.",
                "color": status_color(CheckStatus::Success),
            }]
        });
        if let Some(username) = config.get("username").and_then(Value::as_str) {
            if !username.is_empty() {
                message["username"] = json!(username);
            }
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let response = client.post(&url).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::SendFailed(format!(
                "Discord webhook returned non-success status: {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn payload(trigger: NotificationTrigger, status: CheckStatus) -> NotificationPayload {
        NotificationPayload {
            trigger,
            site_name: "My Site".to_string(),
            site_url: "https://example.com".to_string(),
            check_name: "homepage".to_string(),
            check_type: "http".to_string(),
            status,
            error_message: None,
            response_time_ms: None,
            checked_at: Utc::now(),
            incident_id: Some(12),
        }
    }

    #[test]
    fn embed_carries_status_color_and_incident() {
        let message = format_message(
            &payload(NotificationTrigger::IncidentOpened, CheckStatus::Failure),
            &json!({}),
        );
        let embed = &message["embeds"][0];
        assert_eq!(embed["color"], 15158332);
        assert!(embed["title"].as_str().unwrap().contains("Incident Opened"));
        let fields = embed["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["name"] == "Incident ID"));
    }

    #[test]
    fn thread_id_is_appended_to_the_url() {
        let url = webhook_url(&json!({
            "webhook_url": "https://discord.com/api/webhooks/x/y",
            "thread_id": "123"
        }))
        .unwrap();
        assert_eq!(url, "https://discord.com/api/webhooks/x/y?thread_id=123");
    }

    #[test]
    fn long_errors_are_truncated() {
        let mut p = payload(NotificationTrigger::CheckFailure, CheckStatus::Failure);
        p.error_message = Some("x".repeat(5000));
        let message = format_message(&p, &json!({}));
        let fields = message["embeds"][0]["fields"].as_array().unwrap();
        let error_field = fields.iter().find(|f| f["name"] == "Error Message").unwrap();
        assert!(error_field["value"].as_str().unwrap().len() < 1100);
    }
}
