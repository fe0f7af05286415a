//! TLS protocol version and cipher suite check.
//!
//! rustls only negotiates TLS 1.2 and 1.3; endpoints limited to older
//! versions surface as handshake failures, which is itself a finding. The
//! version ordering still covers the full range so a configured minimum of
//! TLSv1/TLSv1.1 behaves sensibly.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::net::{host_and_port, permissive_tls_connector, server_name};

const TLS_VERSION_ORDER: [&str; 4] = ["TLSv1", "TLSv1.1", "TLSv1.2", "TLSv1.3"];

const WEAK_CIPHER_PATTERNS: [&str; 8] =
    ["NULL", "EXPORT", "DES", "RC4", "MD5", "ANON", "ADH", "AECDH"];

#[derive(Deserialize)]
#[serde(default)]
struct TlsCheckConfig {
    minimum_tls_version: String,
    check_weak_ciphers: bool,
    timeout_seconds: u64,
}

impl Default for TlsCheckConfig {
    fn default() -> Self {
        Self {
            minimum_tls_version: "TLSv1.2".to_string(),
            check_weak_ciphers: true,
            timeout_seconds: 10,
        }
    }
}

fn version_rank(version: &str) -> Option<usize> {
    TLS_VERSION_ORDER.iter().position(|v| *v == version)
}

fn version_label(version: rustls::ProtocolVersion) -> String {
    match version {
        rustls::ProtocolVersion::TLSv1_0 => "TLSv1".to_string(),
        rustls::ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        other => format!("{other:?}"),
    }
}

fn weak_cipher_pattern(cipher_name: &str) -> Option<&'static str> {
    let upper = cipher_name.to_uppercase();
    WEAK_CIPHER_PATTERNS
        .iter()
        .find(|pattern| upper.contains(**pattern))
        .copied()
}

pub struct TlsCheck;

#[async_trait]
impl Check for TlsCheck {
    fn check_type(&self) -> &'static str {
        "tls"
    }

    fn display_name(&self) -> &'static str {
        "TLS Version Check"
    }

    fn description(&self) -> &'static str {
        "Verifies TLS version meets minimum requirements and checks for weak ciphers"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "minimum_tls_version": {
                    "type": "string",
                    "enum": ["TLSv1", "TLSv1.1", "TLSv1.2", "TLSv1.3"],
                    "default": "TLSv1.2",
                    "description": "Minimum acceptable TLS version"
                },
                "check_weak_ciphers": {
                    "type": "boolean",
                    "default": true,
                    "description": "Check for weak cipher suites (NULL, EXPORT, DES, RC4, etc.)"
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
        let cfg: TlsCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };

        let minimum_rank = match version_rank(&cfg.minimum_tls_version) {
            Some(rank) => rank,
            None => {
                return CheckOutcome::failure(
                    None,
                    format!("Unknown minimum TLS version: {}", cfg.minimum_tls_version),
                    json!({ "error_type": "configuration" }),
                )
            }
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
                    format!("SSL/TLS error: {e}"),
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

        let actual_version = match connection.protocol_version() {
            Some(version) => version_label(version),
            None => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    "No TLS protocol version negotiated".to_string(),
                    json!({ "hostname": hostname, "error_type": "tls_handshake" }),
                )
            }
        };
        let cipher_name = connection
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite()))
            .unwrap_or_else(|| "Unknown".to_string());

        let mut result_data = json!({
            "hostname": hostname,
            "port": port,
            "tls_version": actual_version,
            "cipher_name": cipher_name,
            "minimum_required": cfg.minimum_tls_version,
        });

        let actual_rank = match version_rank(&actual_version) {
            Some(rank) => rank,
            None => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("Unknown TLS version: {actual_version}"),
                    result_data,
                )
            }
        };

        if actual_rank < minimum_rank {
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!(
                    "TLS version {actual_version} is below minimum required {}",
                    cfg.minimum_tls_version
                ),
                result_data,
            );
        }

        if cfg.check_weak_ciphers {
            if let Some(pattern) = weak_cipher_pattern(&cipher_name) {
                result_data["weak_cipher_warning"] =
                    json!(format!("Weak cipher pattern detected: {pattern}"));
                return CheckOutcome::warning(
                    Some(response_time_ms),
                    format!("Weak cipher detected: {cipher_name}"),
                    result_data,
                );
            }
        }

        if actual_version == "TLSv1" || actual_version == "TLSv1.1" {
            return CheckOutcome::warning(
                Some(response_time_ms),
                format!("TLS version {actual_version} is deprecated"),
                result_data,
            );
        }

        CheckOutcome::success(Some(response_time_ms), result_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(version_rank("TLSv1").unwrap() < version_rank("TLSv1.1").unwrap());
        assert!(version_rank("TLSv1.1").unwrap() < version_rank("TLSv1.2").unwrap());
        assert!(version_rank("TLSv1.2").unwrap() < version_rank("TLSv1.3").unwrap());
        assert!(version_rank("SSLv3").is_none());
    }

    #[test]
    fn weak_cipher_detection() {
        assert_eq!(weak_cipher_pattern("TLS_RSA_WITH_RC4_128_SHA"), Some("RC4"));
        assert_eq!(
            weak_cipher_pattern("TLS_RSA_EXPORT_WITH_DES40_CBC_SHA"),
            Some("EXPORT")
        );
        assert_eq!(weak_cipher_pattern("TLS_NULL_WITH_NULL_NULL"), Some("NULL"));
        assert_eq!(weak_cipher_pattern("TLS13_AES_256_GCM_SHA384"), None);
        assert_eq!(weak_cipher_pattern("TLS13_CHACHA20_POLY1305_SHA256"), None);
    }
}
