//! Email channel delivering over SMTP.

use std::time::Duration;

use async_trait::async_trait;
use rand::random;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{NotificationSender, SenderError};
use crate::db::models::CheckStatus;
use crate::mail::SmtpSession;
use crate::notifications::payload::NotificationPayload;

#[derive(Deserialize)]
#[serde(default)]
struct EmailConfig {
    smtp_host: String,
    smtp_port: u16,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    from_address: String,
    to_addresses: Vec<String>,
    use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            from_address: String::new(),
            to_addresses: Vec::new(),
            use_tls: true,
        }
    }
}

fn parse_email_config(config: &Value) -> Result<EmailConfig, SenderError> {
    let cfg: EmailConfig = serde_json::from_value(config.clone())
        .map_err(|e| SenderError::InvalidConfiguration(e.to_string()))?;
    if cfg.smtp_host.is_empty() {
        return Err(SenderError::InvalidConfiguration(
            "smtp_host is required".to_string(),
        ));
    }
    Ok(cfg)
}

fn status_emoji(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Failure => "\u{1f534}",
        CheckStatus::Warning => "\u{1f7e1}",
        CheckStatus::Success => "\u{1f7e2}",
    }
}

fn status_color(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Failure => "#dc2626",
        CheckStatus::Warning => "#f59e0b",
        CheckStatus::Success => "#16a34a",
    }
}

pub(crate) fn build_subject(payload: &NotificationPayload) -> String {
    format!(
        "{} [{}] {} - {}",
        status_emoji(payload.status),
        payload.trigger_label(),
        payload.site_name,
        payload.check_name
    )
}

fn build_text_body(payload: &NotificationPayload) -> String {
    let mut lines = vec![
        format!("Site: {}", payload.site_name),
        format!("URL: {}", payload.site_url),
        format!("Check: {} ({})", payload.check_name, payload.check_type),
        format!("Status: {}", payload.status.to_string().to_uppercase()),
        format!(
            "Time: {}",
            payload.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    ];
    if let Some(response_time_ms) = payload.response_time_ms {
        lines.push(format!("Response Time: {response_time_ms}ms"));
    }
    if let Some(error_message) = &payload.error_message {
        lines.push(String::new());
        lines.push(format!("Error: {error_message}"));
    }
    if let Some(incident_id) = payload.incident_id {
        lines.push(String::new());
        lines.push(format!("Incident ID: {incident_id}"));
    }
    lines.join("\n")
}

fn build_html_body(payload: &NotificationPayload) -> String {
    let color = status_color(payload.status);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<style>\n\
         body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; }}\n\
         .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}\n\
         .header {{ background: {color}; color: white; padding: 20px; border-radius: 8px 8px 0 0; }}\n\
         .content {{ background: #f9fafb; padding: 20px; border-radius: 0 0 8px 8px; }}\n\
         .label {{ color: #6b7280; font-size: 12px; text-transform: uppercase; }}\n\
         .value {{ font-size: 16px; margin-bottom: 16px; }}\n\
         .error {{ background: #fef2f2; border-left: 4px solid #dc2626; padding: 12px; margin-top: 16px; }}\n\
         </style>\n</head>\n<body>\n<div class=\"container\">\n\
         <div class=\"header\">\n<h2 style=\"margin: 0;\">{site}</h2>\n\
         <p style=\"margin: 8px 0 0 0; opacity: 0.9;\">{check} - {status}</p>\n</div>\n\
         <div class=\"content\">\n\
         <div class=\"label\">Site URL</div>\n\
         <div class=\"value\"><a href=\"{url}\">{url}</a></div>\n\
         <div class=\"label\">Check Type</div>\n\
         <div class=\"value\">{check_type}</div>\n\
         <div class=\"label\">Time</div>\n\
         <div class=\"value\">{time}</div>\n",
        color = color,
        site = payload.site_name,
        check = payload.check_name,
        status = payload.status.to_string().to_uppercase(),
        url = payload.site_url,
        check_type = payload.check_type,
        time = payload.checked_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    if let Some(response_time_ms) = payload.response_time_ms {
        html.push_str(&format!(
            "<div class=\"label\">Response Time</div>\n<div class=\"value\">{response_time_ms}ms</div>\n"
        ));
    }
    if let Some(error_message) = &payload.error_message {
        html.push_str(&format!(
            "<div class=\"error\"><strong>Error:</strong> {error_message}</div>\n"
        ));
    }
    html.push_str("</div>\n</div>\n</body>\n</html>\n");
    html
}

/// Assembles a multipart/alternative message with text and HTML parts.
fn build_message(cfg: &EmailConfig, payload: &NotificationPayload) -> String {
    let boundary = format!("sitewatch-{:016x}", random::<u64>());
    let mut message = String::new();
    message.push_str(&format!("From: {}\r\n", cfg.from_address));
    message.push_str(&format!("To: {}\r\n", cfg.to_addresses.join(", ")));
    message.push_str(&format!("Subject: {}\r\n", build_subject(payload)));
    message.push_str(&format!(
        "Date: {}\r\n",
        payload.checked_at.format("%a, %d %b %Y %H:%M:%S +0000")
    ));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str(&format!(
        "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n"
    ));

    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
    message.push_str(&build_text_body(payload).replace('\n', "\r\n"));
    message.push_str("\r\n\r\n");

    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str("Content-Type: text/html; charset=utf-8\r\n\r\n");
    message.push_str(&build_html_body(payload).replace('\n', "\r\n"));
    message.push_str("\r\n");

    message.push_str(&format!("--{boundary}--\r\n"));
    message
}

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

async fn open_session(cfg: &EmailConfig, login: bool) -> Result<SmtpSession, SenderError> {
    // Implicit TLS on the SMTPS port, STARTTLS otherwise.
    let implicit_tls = cfg.smtp_port == 465;
    let (mut session, _banner) =
        SmtpSession::connect(&cfg.smtp_host, cfg.smtp_port, implicit_tls, SMTP_TIMEOUT).await?;
    session.ehlo("sitewatch.local").await?;
    if cfg.use_tls && !implicit_tls {
        session.starttls().await?;
        session.ehlo("sitewatch.local").await?;
    }
    if login {
        if let (Some(user), Some(password)) = (&cfg.smtp_user, &cfg.smtp_password) {
            session.login(user, password).await?;
        }
    }
    Ok(session)
}

pub struct EmailChannel;

#[async_trait]
impl NotificationSender for EmailChannel {
    fn channel_type(&self) -> &'static str {
        "email"
    }

    fn display_name(&self) -> &'static str {
        "Email (SMTP)"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["smtp_host", "from_address", "to_addresses"],
            "properties": {
                "smtp_host": {
                    "type": "string",
                    "title": "SMTP Host",
                    "description": "SMTP server hostname"
                },
                "smtp_port": {
                    "type": "integer",
                    "default": 587,
                    "title": "SMTP Port",
                    "description": "SMTP server port"
                },
                "smtp_user": {
                    "type": "string",
                    "title": "SMTP Username",
                    "description": "Username for SMTP authentication"
                },
                "smtp_password": {
                    "type": "string",
                    "format": "password",
                    "title": "SMTP Password",
                    "description": "Password for SMTP authentication"
                },
                "from_address": {
                    "type": "string",
                    "format": "email",
                    "title": "From Address",
                    "description": "Email address to send from"
                },
                "to_addresses": {
                    "type": "array",
                    "items": { "type": "string", "format": "email" },
                    "title": "Recipients",
                    "description": "Email addresses to send notifications to"
                },
                "use_tls": {
                    "type": "boolean",
                    "default": true,
                    "title": "Use TLS",
                    "description": "Use STARTTLS for secure connection"
                }
            }
        })
    }

    async fn send(
        &self,
        config: &Value,
        payload: &NotificationPayload,
    ) -> Result<(), SenderError> {
        let cfg = parse_email_config(config)?;
        if cfg.from_address.is_empty() || cfg.to_addresses.is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "from_address and to_addresses are required".to_string(),
            ));
        }
        let message = build_message(&cfg, payload);
        let mut session = open_session(&cfg, true).await?;
        session
            .send_message(&cfg.from_address, &cfg.to_addresses, &message)
            .await?;
        session.quit().await?;
        Ok(())
    }

    /// Connect/STARTTLS/login/quit without sending mail.
    async fn test_connection(&self, config: &Value) -> Result<(), SenderError> {
        let cfg = parse_email_config(config)?;
        let mut session = open_session(&cfg, true).await?;
        session.quit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NotificationTrigger;
    use chrono::Utc;

    fn payload(trigger: NotificationTrigger, status: CheckStatus) -> NotificationPayload {
        NotificationPayload {
            trigger,
            site_name: "My Site".to_string(),
            site_url: "https://example.com".to_string(),
            check_name: "homepage".to_string(),
            check_type: "http".to_string(),
            status,
            error_message: Some("connection refused".to_string()),
            response_time_ms: Some(88),
            checked_at: Utc::now(),
            incident_id: None,
        }
    }

    #[test]
    fn subject_encodes_trigger_and_status() {
        let subject = build_subject(&payload(
            NotificationTrigger::CheckFailure,
            CheckStatus::Failure,
        ));
        assert!(subject.contains("[ALERT]"));
        assert!(subject.contains("My Site"));
        assert!(subject.contains("homepage"));

        let subject = build_subject(&payload(
            NotificationTrigger::CheckRecovery,
            CheckStatus::Success,
        ));
        assert!(subject.contains("[RECOVERED]"));
    }

    #[test]
    fn message_is_multipart_alternative() {
        let cfg = EmailConfig {
            smtp_host: "mail.example.com".to_string(),
            from_address: "alerts@example.com".to_string(),
            to_addresses: vec!["ops@example.com".to_string()],
            ..EmailConfig::default()
        };
        let message = build_message(
            &cfg,
            &payload(NotificationTrigger::CheckFailure, CheckStatus::Failure),
        );
        assert!(message.contains("Content-Type: multipart/alternative"));
        assert!(message.contains("Content-Type: text/plain"));
        assert!(message.contains("Content-Type: text/html"));
        assert!(message.contains("From: alerts@example.com"));
        assert!(message.contains("To: ops@example.com"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn text_body_lists_core_fields() {
        let body = build_text_body(&payload(
            NotificationTrigger::CheckFailure,
            CheckStatus::Failure,
        ));
        assert!(body.contains("Site: My Site"));
        assert!(body.contains("Status: FAILURE"));
        assert!(body.contains("Response Time: 88ms"));
        assert!(body.contains("Error: connection refused"));
    }
}
