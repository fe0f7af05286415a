//! Slack incoming-webhook channel.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{NotificationSender, SenderError};
use crate::db::models::{CheckStatus, NotificationTrigger};
use crate::notifications::payload::NotificationPayload;

fn status_emoji(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Success => ":white_check_mark:",
        CheckStatus::Failure => ":x:",
        CheckStatus::Warning => ":warning:",
    }
}

fn status_color(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Success => "#36a64f",
        CheckStatus::Failure => "#dc3545",
        CheckStatus::Warning => "#ffc107",
    }
}

fn title_for(payload: &NotificationPayload) -> String {
    let emoji = status_emoji(payload.status);
    match payload.trigger {
        NotificationTrigger::CheckFailure => format!("{emoji} Check Failed"),
        NotificationTrigger::CheckRecovery => format!("{emoji} Check Recovered"),
        NotificationTrigger::IncidentOpened => ":rotating_light: Incident Opened".to_string(),
        NotificationTrigger::IncidentResolved => {
            ":white_check_mark: Incident Resolved".to_string()
        }
    }
}

/// Block Kit message with a status-colored attachment.
pub(crate) fn format_message(payload: &NotificationPayload, config: &Value) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": title_for(payload), "emoji": true }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Site:*\n<{}|{}>", payload.site_url, payload.site_name) },
                { "type": "mrkdwn", "text": format!("*Check:*\n{} ({})", payload.check_name, payload.check_type) }
            ]
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Status:*\n{}", payload.status.to_string().to_uppercase()) },
                { "type": "mrkdwn", "text": format!("*Time:*\n{}", payload.checked_at.format("%Y-%m-%d %H:%M:%S UTC")) }
            ]
        }),
    ];

    if let Some(response_time_ms) = payload.response_time_ms {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Response Time:* {response_time_ms}ms") }
        }));
    }

    if let Some(error_message) = &payload.error_message {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Error:*\n```{error_message}```") }
        }));
    }

    blocks.push(json!({ "type": "divider" }));
    blocks.push(json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": "Sent from Sitewatch" }]
    }));

    let mut message = json!({
        "attachments": [{ "color": status_color(payload.status), "blocks": blocks }]
    });

    for key in ["channel", "username", "icon_emoji", "icon_url"] {
        if let Some(value) = config.get(key).and_then(Value::as_str) {
            if !value.is_empty() {
                message[key] = json!(value);
            }
        }
    }

    message
}

fn webhook_url(config: &Value) -> Result<String, SenderError> {
    config
        .get("webhook_url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SenderError::InvalidConfiguration("Slack webhook URL is required".into()))
}

async fn post_json(url: &str, body: &Value, timeout: Duration) -> Result<(), SenderError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        return Err(SenderError::SendFailed(format!(
            "Slack webhook returned non-success status: {status}. Body: {body}"
        )));
    }
    Ok(())
}

pub struct SlackChannel;

#[async_trait]
impl NotificationSender for SlackChannel {
    fn channel_type(&self) -> &'static str {
        "slack"
    }

    fn display_name(&self) -> &'static str {
        "Slack"
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
                    "description": "Slack Incoming Webhook URL (get from Slack App settings)"
                },
                "channel": {
                    "type": "string",
                    "title": "Channel Override",
                    "description": "Override the default channel (e.g., #alerts). Leave empty for default."
                },
                "username": {
                    "type": "string",
                    "title": "Bot Username",
                    "description": "Override the bot username. Leave empty for default."
                },
                "icon_emoji": {
                    "type": "string",
                    "title": "Icon Emoji",
                    "description": "Emoji to use as the bot icon (e.g., :robot_face:)"
                },
                "icon_url": {
                    "type": "string",
                    "format": "uri",
                    "title": "Icon URL",
                    "description": "URL to an image to use as the bot icon"
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
        post_json(&url, &message, Duration::from_secs(30)).await
    }

    async fn test_connection(&self, config: &Value) -> Result<(), SenderError> {
        let url = webhook_url(config)?;
        let mut message = json!({
            "text": ":white_check_mark: Sitewatch connection test successful!",
            "blocks": [{
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": ":white_check_mark: *Sitewatch*\nConnection test successful! This channel is now configured to receive alerts."
                }
            }]
        });
        for key in ["channel", "username"] {
            if let Some(value) = config.get(key).and_then(Value::as_str) {
                if !value.is_empty() {
                    message[key] = json!(value);
                }
            }
        }
        post_json(&url, &message, Duration::from_secs(10)).await
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
            error_message: Some("boom".to_string()),
            response_time_ms: Some(42),
            checked_at: Utc::now(),
            incident_id: None,
        }
    }

    #[test]
    fn failure_message_is_red_with_error_block() {
        let message = format_message(
            &payload(NotificationTrigger::CheckFailure, CheckStatus::Failure),
            &json!({}),
        );
        assert_eq!(message["attachments"][0]["color"], "#dc3545");
        let blocks = message["attachments"][0]["blocks"].as_array().unwrap();
        assert!(blocks[0]["text"]["text"]
            .as_str()
            .unwrap()
            .contains("Check Failed"));
        assert!(blocks
            .iter()
            .any(|b| b["text"]["text"].as_str().is_some_and(|t| t.contains("boom"))));
    }

    #[test]
    fn recovery_message_is_green() {
        let message = format_message(
            &payload(NotificationTrigger::CheckRecovery, CheckStatus::Success),
            &json!({}),
        );
        assert_eq!(message["attachments"][0]["color"], "#36a64f");
    }

    #[test]
    fn overrides_are_applied() {
        let message = format_message(
            &payload(NotificationTrigger::CheckFailure, CheckStatus::Failure),
            &json!({ "channel": "#alerts", "username": "watchbot", "icon_emoji": ":robot_face:" }),
        );
        assert_eq!(message["channel"], "#alerts");
        assert_eq!(message["username"], "watchbot");
        assert_eq!(message["icon_emoji"], ":robot_face:");
    }

    #[test]
    fn missing_webhook_url_is_a_configuration_error() {
        assert!(matches!(
            webhook_url(&json!({})),
            Err(SenderError::InvalidConfiguration(_))
        ));
    }
}
