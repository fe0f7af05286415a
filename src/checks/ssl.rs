//! SSL certificate expiry check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use x509_parser::prelude::FromDer;
use x509_parser::certificate::X509Certificate;

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::db::models::CheckStatus;
use crate::net::{host_and_port, permissive_tls_connector, server_name};

#[derive(Deserialize)]
#[serde(default)]
struct SslCheckConfig {
    warning_days_before_expiry: i64,
    timeout_seconds: u64,
}

impl Default for SslCheckConfig {
    fn default() -> Self {
        Self {
            warning_days_before_expiry: 30,
            timeout_seconds: 10,
        }
    }
}

/// Expiry classification: expired certificates fail, certificates within the
/// warning window warn, everything else passes.
fn classify_expiry(days_until_expiry: i64, warning_days: i64) -> CheckStatus {
    if days_until_expiry <= 0 {
        CheckStatus::Failure
    } else if days_until_expiry <= warning_days {
        CheckStatus::Warning
    } else {
        CheckStatus::Success
    }
}

struct CertificateFacts {
    subject: String,
    issuer: String,
    serial_number: String,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
}

fn certificate_facts(der: &[u8]) -> Result<CertificateFacts, String> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| e.to_string())?;
    Ok(CertificateFacts {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial_number: cert.tbs_certificate.raw_serial_as_string(),
        not_before: DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0),
        not_after: DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0),
    })
}

pub struct SslCheck;

#[async_trait]
impl Check for SslCheck {
    fn check_type(&self) -> &'static str {
        "ssl"
    }

    fn display_name(&self) -> &'static str {
        "SSL Certificate Check"
    }

    fn description(&self) -> &'static str {
        "Verifies SSL certificate validity and warns before expiration"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "warning_days_before_expiry": {
                    "type": "integer",
                    "default": 30,
                    "minimum": 1,
                    "maximum": 365,
                    "description": "Days before expiry to trigger warning"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 60,
                    "description": "Connection timeout in seconds"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: SslCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };

        let (hostname, port) = host_and_port(target, 443);
        let timeout = Duration::from_secs(cfg.timeout_seconds.max(1));
        let start = Instant::now();

        let name = match server_name(&hostname) {
            Ok(name) => name,
            Err(e) => {
                return CheckOutcome::failure(
                    None,
                    e,
                    json!({ "hostname": hostname, "error_type": "configuration" }),
                )
            }
        };

        let tcp = match tokio::time::timeout(timeout, TcpStream::connect((hostname.as_str(), port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return CheckOutcome::failure(
                    Some(elapsed_ms(start)),
                    format!("Connection failed: {e}"),
                    json!({ "hostname": hostname, "port": port, "error_type": "connect" }),
                )
            }
            Err(_) => {
                return CheckOutcome::failure(
                    Some(elapsed_ms(start)),
                    format!("Connection timed out after {}s", cfg.timeout_seconds),
                    json!({ "hostname": hostname, "timeout": cfg.timeout_seconds, "error_type": "timeout" }),
                )
            }
        };

        let connector = permissive_tls_connector();
        let tls = match tokio::time::timeout(timeout, connector.connect(name, tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return CheckOutcome::failure(
                    Some(elapsed_ms(start)),
                    format!("TLS handshake failed: {e}"),
                    json!({ "hostname": hostname, "error_type": "tls_handshake" }),
                )
            }
            Err(_) => {
                return CheckOutcome::failure(
                    Some(elapsed_ms(start)),
                    format!("TLS handshake timed out after {}s", cfg.timeout_seconds),
                    json!({ "hostname": hostname, "timeout": cfg.timeout_seconds, "error_type": "timeout" }),
                )
            }
        };

        let response_time_ms = elapsed_ms(start);
        let (_, connection) = tls.get_ref();
        let leaf = match connection.peer_certificates().and_then(|certs| certs.first()) {
            Some(cert) => cert.clone().into_owned(),
            None => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    "Server presented no certificate".to_string(),
                    json!({ "hostname": hostname, "error_type": "no_certificate" }),
                )
            }
        };

        let facts = match certificate_facts(leaf.as_ref()) {
            Ok(facts) => facts,
            Err(e) => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("Failed to parse server certificate: {e}"),
                    json!({ "hostname": hostname, "error_type": "certificate_parse" }),
                )
            }
        };

        let now = Utc::now();
        let days_until_expiry = match facts.not_after {
            Some(not_after) => (not_after - now).num_days(),
            None => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    "Certificate carries no expiry date".to_string(),
                    json!({ "hostname": hostname, "error_type": "certificate_parse" }),
                )
            }
        };

        let result_data = json!({
            "hostname": hostname,
            "issuer": facts.issuer,
            "subject": facts.subject,
            "not_before": facts.not_before.map(|t| t.to_rfc3339()),
            "not_after": facts.not_after.map(|t| t.to_rfc3339()),
            "days_until_expiry": days_until_expiry,
            "serial_number": facts.serial_number,
        });

        match classify_expiry(days_until_expiry, cfg.warning_days_before_expiry) {
            CheckStatus::Failure => CheckOutcome::failure(
                Some(response_time_ms),
                format!(
                    "SSL certificate has expired ({} days ago)",
                    days_until_expiry.abs()
                ),
                result_data,
            ),
            CheckStatus::Warning => CheckOutcome::warning(
                Some(response_time_ms),
                format!("SSL certificate expires in {days_until_expiry} days"),
                result_data,
            ),
            CheckStatus::Success => CheckOutcome::success(Some(response_time_ms), result_data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundaries() {
        // Expired, even by a day, is a failure.
        assert_eq!(classify_expiry(-1, 30), CheckStatus::Failure);
        assert_eq!(classify_expiry(0, 30), CheckStatus::Failure);
        // Exactly at the warning threshold warns.
        assert_eq!(classify_expiry(30, 30), CheckStatus::Warning);
        assert_eq!(classify_expiry(1, 30), CheckStatus::Warning);
        // Beyond the threshold passes.
        assert_eq!(classify_expiry(31, 30), CheckStatus::Success);
        assert_eq!(classify_expiry(365, 30), CheckStatus::Success);
    }
}
