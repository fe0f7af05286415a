//! SMTP server check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::mail::{MailError, SmtpSession};
use crate::net::host_of;

#[derive(Deserialize)]
#[serde(default)]
struct SmtpCheckConfig {
    smtp_host: Option<String>,
    smtp_port: u16,
    use_tls: bool,
    use_ssl: bool,
    timeout_seconds: u64,
    username: Option<String>,
    password: Option<String>,
    verify_auth: bool,
    send_test_email: bool,
    test_from_address: Option<String>,
    test_to_address: Option<String>,
}

impl Default for SmtpCheckConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            use_tls: true,
            use_ssl: false,
            timeout_seconds: 30,
            username: None,
            password: None,
            verify_auth: false,
            send_test_email: false,
            test_from_address: None,
            test_to_address: None,
        }
    }
}

pub struct SmtpCheck;

impl SmtpCheck {
    async fn probe(
        cfg: &SmtpCheckConfig,
        host: &str,
        milestones: &mut serde_json::Map<String, Value>,
    ) -> Result<(), MailError> {
        let timeout = Duration::from_secs(cfg.timeout_seconds.max(1));
        let (mut session, banner) =
            SmtpSession::connect(host, cfg.smtp_port, cfg.use_ssl, timeout).await?;
        milestones.insert("connection_established".into(), json!(true));
        if cfg.use_ssl {
            milestones.insert("tls_established".into(), json!(true));
        }
        milestones.insert(
            "server_banner".into(),
            json!(banner.chars().take(200).collect::<String>()),
        );

        let extensions = session.ehlo("sitewatch.local").await?;
        milestones.insert(
            "esmtp_features".into(),
            json!(extensions.iter().take(10).collect::<Vec<_>>()),
        );

        if cfg.use_tls && !cfg.use_ssl {
            if !session.supports("STARTTLS") {
                return Err(MailError::Protocol(
                    "server does not support STARTTLS".to_string(),
                ));
            }
            session.starttls().await?;
            session.ehlo("sitewatch.local").await?;
            milestones.insert("tls_established".into(), json!(true));
        }

        let wants_auth = cfg.verify_auth || cfg.send_test_email;
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            if wants_auth {
                session.login(username, password).await?;
                milestones.insert("authenticated".into(), json!(true));
            }
        }

        if cfg.send_test_email {
            if let (Some(from), Some(to)) = (&cfg.test_from_address, &cfg.test_to_address) {
                let now = Utc::now();
                let message = format!(
                    "From: {from}\r\nTo: {to}\r\nSubject: Health Check Test - {}\r\n\r\n\
                     This is an automated health check test email.\r\n\r\n\
                     Timestamp: {}\r\nSMTP Server: {host}:{}\r\n\r\n\
                     If you received this email, SMTP sending is working correctly.\r\n",
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                    cfg.smtp_port
                );
                session
                    .send_message(from, &[to.clone()], &message)
                    .await?;
                milestones.insert("test_email_sent".into(), json!(true));
                milestones.insert("test_email_to".into(), json!(to));
            }
        }

        session.quit().await?;
        Ok(())
    }
}

#[async_trait]
impl Check for SmtpCheck {
    fn check_type(&self) -> &'static str {
        "smtp"
    }

    fn display_name(&self) -> &'static str {
        "SMTP Email Check"
    }

    fn description(&self) -> &'static str {
        "Verifies SMTP server connectivity, authentication, and optionally sends test emails"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "smtp_host": {
                    "type": "string",
                    "description": "SMTP server hostname (defaults to site URL hostname)"
                },
                "smtp_port": {
                    "type": "integer",
                    "default": 587,
                    "enum": [25, 465, 587, 2525],
                    "description": "SMTP port (587=submission/TLS, 465=SSL, 25=standard)"
                },
                "use_tls": {
                    "type": "boolean",
                    "default": true,
                    "description": "Use STARTTLS to upgrade connection to TLS"
                },
                "use_ssl": {
                    "type": "boolean",
                    "default": false,
                    "description": "Use implicit SSL/TLS (for port 465)"
                },
                "username": {
                    "type": "string",
                    "description": "SMTP authentication username (optional)"
                },
                "password": {
                    "type": "string",
                    "format": "password",
                    "description": "SMTP authentication password (optional)"
                },
                "verify_auth": {
                    "type": "boolean",
                    "default": false,
                    "description": "Actually attempt authentication (requires credentials)"
                },
                "send_test_email": {
                    "type": "boolean",
                    "default": false,
                    "description": "Send a test email to verify full delivery"
                },
                "test_from_address": {
                    "type": "string",
                    "format": "email",
                    "description": "From address for test email"
                },
                "test_to_address": {
                    "type": "string",
                    "format": "email",
                    "description": "Recipient address for test email"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 30,
                    "minimum": 5,
                    "maximum": 120,
                    "description": "Connection timeout in seconds"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: SmtpCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };
        let host = cfg
            .smtp_host
            .clone()
            .unwrap_or_else(|| host_of(target));

        let mut milestones = serde_json::Map::new();
        milestones.insert("smtp_host".into(), json!(host));
        milestones.insert("smtp_port".into(), json!(cfg.smtp_port));
        milestones.insert("use_tls".into(), json!(cfg.use_tls));
        milestones.insert("use_ssl".into(), json!(cfg.use_ssl));
        milestones.insert("connection_established".into(), json!(false));
        milestones.insert("tls_established".into(), json!(false));
        milestones.insert("authenticated".into(), json!(false));
        milestones.insert("test_email_sent".into(), json!(false));

        let start = Instant::now();
        let outcome = Self::probe(&cfg, &host, &mut milestones).await;
        let response_time_ms = elapsed_ms(start);

        match outcome {
            Ok(()) => CheckOutcome::success(Some(response_time_ms), Value::Object(milestones)),
            Err(e) => {
                milestones.insert("error_type".into(), json!(e.category()));
                let message = match &e {
                    MailError::Auth(detail) => format!("SMTP authentication failed: {detail}"),
                    MailError::Timeout => format!(
                        "SMTP operation timed out after {}s",
                        cfg.timeout_seconds
                    ),
                    other => format!("SMTP error: {other}"),
                };
                CheckOutcome::failure(Some(response_time_ms), message, Value::Object(milestones))
            }
        }
    }
}
