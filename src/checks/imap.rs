//! IMAP mailbox check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::mail::{parse_status_counts, ImapSession, MailError};
use crate::net::host_of;

#[derive(Deserialize)]
#[serde(default)]
struct ImapCheckConfig {
    imap_host: Option<String>,
    imap_port: u16,
    use_ssl: bool,
    username: Option<String>,
    password: Option<String>,
    mailbox: String,
    check_recent_emails: bool,
    recent_hours: i64,
    timeout_seconds: u64,
}

impl Default for ImapCheckConfig {
    fn default() -> Self {
        Self {
            imap_host: None,
            imap_port: 993,
            use_ssl: true,
            username: None,
            password: None,
            mailbox: "INBOX".to_string(),
            check_recent_emails: false,
            recent_hours: 24,
            timeout_seconds: 30,
        }
    }
}

pub struct ImapCheck;

impl ImapCheck {
    /// Runs the protocol exchange; returns a warning message when the
    /// mailbox has seen no recent mail and that check was requested.
    async fn probe(
        cfg: &ImapCheckConfig,
        host: &str,
        milestones: &mut serde_json::Map<String, Value>,
    ) -> Result<Option<String>, MailError> {
        let timeout = Duration::from_secs(cfg.timeout_seconds.max(1));
        let (mut session, _greeting) =
            ImapSession::connect(host, cfg.imap_port, cfg.use_ssl, timeout).await?;
        milestones.insert("connection_established".into(), json!(true));

        let capabilities = session.capability().await.unwrap_or_default();
        if !capabilities.is_empty() {
            milestones.insert(
                "capabilities".into(),
                json!(capabilities.iter().take(15).collect::<Vec<_>>()),
            );
        }

        let mut warning = None;
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            session.login(username, password).await?;
            milestones.insert("authenticated".into(), json!(true));

            let exists = session.examine(&cfg.mailbox).await?;
            milestones.insert("mailbox_accessible".into(), json!(true));
            milestones.insert("mailbox".into(), json!(cfg.mailbox));
            milestones.insert("total_messages".into(), json!(exists));

            if let Ok(status_line) = session.status(&cfg.mailbox).await {
                milestones.insert("mailbox_status".into(), json!(status_line));
                let (messages, recent, unseen) = parse_status_counts(&status_line);
                if let Some(messages) = messages {
                    milestones.insert("total_messages".into(), json!(messages));
                }
                if let Some(recent) = recent {
                    milestones.insert("recent_messages".into(), json!(recent));
                }
                if let Some(unseen) = unseen {
                    milestones.insert("unseen_messages".into(), json!(unseen));
                }
            }

            if cfg.check_recent_emails && exists > 0 {
                let since = (Utc::now() - ChronoDuration::hours(cfg.recent_hours.max(1)))
                    .format("%d-%b-%Y")
                    .to_string();
                let recent_count = session.search_since(&since).await?;
                milestones.insert("emails_since_check".into(), json!(recent_count));
                milestones.insert("check_period_hours".into(), json!(cfg.recent_hours));
                if recent_count == 0 {
                    warning = Some(format!(
                        "No emails received in the last {} hours",
                        cfg.recent_hours
                    ));
                }
            }
        }

        let _ = session.logout().await;
        Ok(warning)
    }
}

#[async_trait]
impl Check for ImapCheck {
    fn check_type(&self) -> &'static str {
        "imap"
    }

    fn display_name(&self) -> &'static str {
        "IMAP Email Check"
    }

    fn description(&self) -> &'static str {
        "Verifies IMAP server connectivity, authentication, and mailbox access for receiving emails"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "imap_host": {
                    "type": "string",
                    "description": "IMAP server hostname (defaults to site URL hostname)"
                },
                "imap_port": {
                    "type": "integer",
                    "default": 993,
                    "enum": [143, 993],
                    "description": "IMAP port (993=SSL/TLS, 143=plain/STARTTLS)"
                },
                "use_ssl": {
                    "type": "boolean",
                    "default": true,
                    "description": "Use SSL/TLS connection (required for port 993)"
                },
                "username": {
                    "type": "string",
                    "description": "IMAP login username (usually email address)"
                },
                "password": {
                    "type": "string",
                    "format": "password",
                    "description": "IMAP login password"
                },
                "mailbox": {
                    "type": "string",
                    "default": "INBOX",
                    "description": "Mailbox to check (default: INBOX)"
                },
                "check_recent_emails": {
                    "type": "boolean",
                    "default": false,
                    "description": "Check if emails were received recently (warns if none)"
                },
                "recent_hours": {
                    "type": "integer",
                    "default": 24,
                    "minimum": 1,
                    "maximum": 168,
                    "description": "Hours to look back for recent emails"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 30,
                    "minimum": 5,
                    "maximum": 120,
                    "description": "Connection timeout in seconds"
                }
            },
            "required": ["username", "password"]
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: ImapCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };
        let host = cfg
            .imap_host
            .clone()
            .unwrap_or_else(|| host_of(target));

        let mut milestones = serde_json::Map::new();
        milestones.insert("imap_host".into(), json!(host));
        milestones.insert("imap_port".into(), json!(cfg.imap_port));
        milestones.insert("use_ssl".into(), json!(cfg.use_ssl));
        milestones.insert("connection_established".into(), json!(false));
        milestones.insert("authenticated".into(), json!(false));
        milestones.insert("mailbox_accessible".into(), json!(false));

        let start = Instant::now();
        let outcome = Self::probe(&cfg, &host, &mut milestones).await;
        let response_time_ms = elapsed_ms(start);

        match outcome {
            Ok(None) => CheckOutcome::success(Some(response_time_ms), Value::Object(milestones)),
            Ok(Some(warning)) => {
                CheckOutcome::warning(Some(response_time_ms), warning, Value::Object(milestones))
            }
            Err(e) => {
                milestones.insert("error_type".into(), json!(e.category()));
                let message = match &e {
                    MailError::Auth(detail) => format!("IMAP authentication failed: {detail}"),
                    MailError::Timeout => format!(
                        "IMAP operation timed out after {}s",
                        cfg.timeout_seconds
                    ),
                    other => format!("IMAP error: {other}"),
                };
                CheckOutcome::failure(Some(response_time_ms), message, Value::Object(milestones))
            }
        }
    }
}
