//! POP3 mailbox check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::mail::{MailError, Pop3Session};
use crate::net::host_of;

#[derive(Deserialize)]
#[serde(default)]
struct Pop3CheckConfig {
    pop3_host: Option<String>,
    pop3_port: u16,
    use_ssl: bool,
    username: Option<String>,
    password: Option<String>,
    warn_if_empty: bool,
    min_messages: u64,
    timeout_seconds: u64,
}

impl Default for Pop3CheckConfig {
    fn default() -> Self {
        Self {
            pop3_host: None,
            pop3_port: 995,
            use_ssl: true,
            username: None,
            password: None,
            warn_if_empty: false,
            min_messages: 1,
            timeout_seconds: 30,
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}

pub struct Pop3Check;

impl Pop3Check {
    async fn probe(
        cfg: &Pop3CheckConfig,
        host: &str,
        milestones: &mut serde_json::Map<String, Value>,
    ) -> Result<Option<String>, MailError> {
        let timeout = Duration::from_secs(cfg.timeout_seconds.max(1));
        let (mut session, greeting) =
            Pop3Session::connect(host, cfg.pop3_port, cfg.use_ssl, timeout).await?;
        milestones.insert("connection_established".into(), json!(true));
        milestones.insert(
            "server_banner".into(),
            json!(greeting.chars().take(200).collect::<String>()),
        );

        if let Ok(Some(caps)) = session.capabilities().await {
            milestones.insert(
                "capabilities".into(),
                json!(caps.iter().take(10).collect::<Vec<_>>()),
            );
        }

        let mut warning = None;
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            session.login(username, password).await?;
            milestones.insert("authenticated".into(), json!(true));

            let (message_count, mailbox_size) = session.stat().await?;
            milestones.insert("message_count".into(), json!(message_count));
            milestones.insert("mailbox_size_bytes".into(), json!(mailbox_size));
            milestones.insert("mailbox_size_formatted".into(), json!(format_size(mailbox_size)));

            let uidl = session.uidl_supported().await.unwrap_or(false);
            milestones.insert("uidl_supported".into(), json!(uidl));

            if cfg.warn_if_empty && message_count < cfg.min_messages {
                warning = Some(format!(
                    "Mailbox has {message_count} message(s), expected at least {}",
                    cfg.min_messages
                ));
            }
        }

        let _ = session.quit().await;
        Ok(warning)
    }
}

#[async_trait]
impl Check for Pop3Check {
    fn check_type(&self) -> &'static str {
        "pop3"
    }

    fn display_name(&self) -> &'static str {
        "POP3 Email Check"
    }

    fn description(&self) -> &'static str {
        "Verifies POP3 server connectivity, authentication, and mailbox access for receiving emails"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pop3_host": {
                    "type": "string",
                    "description": "POP3 server hostname (defaults to site URL hostname)"
                },
                "pop3_port": {
                    "type": "integer",
                    "default": 995,
                    "enum": [110, 995],
                    "description": "POP3 port (995=SSL/TLS, 110=plain)"
                },
                "use_ssl": {
                    "type": "boolean",
                    "default": true,
                    "description": "Use SSL/TLS connection (required for port 995)"
                },
                "username": {
                    "type": "string",
                    "description": "POP3 login username (usually email address)"
                },
                "password": {
                    "type": "string",
                    "format": "password",
                    "description": "POP3 login password"
                },
                "warn_if_empty": {
                    "type": "boolean",
                    "default": false,
                    "description": "Warn if mailbox has fewer than min_messages"
                },
                "min_messages": {
                    "type": "integer",
                    "default": 1,
                    "minimum": 0,
                    "description": "Minimum expected messages in mailbox"
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
        let cfg: Pop3CheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };
        let host = cfg
            .pop3_host
            .clone()
            .unwrap_or_else(|| host_of(target));

        let mut milestones = serde_json::Map::new();
        milestones.insert("pop3_host".into(), json!(host));
        milestones.insert("pop3_port".into(), json!(cfg.pop3_port));
        milestones.insert("use_ssl".into(), json!(cfg.use_ssl));
        milestones.insert("connection_established".into(), json!(false));
        milestones.insert("authenticated".into(), json!(false));

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
                    MailError::Auth(detail) => format!("POP3 authentication failed: {detail}"),
                    MailError::Timeout => format!(
                        "POP3 operation timed out after {}s",
                        cfg.timeout_seconds
                    ),
                    other => format!("POP3 error: {other}"),
                };
                CheckOutcome::failure(Some(response_time_ms), message, Value::Object(milestones))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_format_human_readable() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
