//! DNS resolution check.
//!
//! When `expected_values` is set, the resolved record set must equal it
//! exactly; mismatches report both missing and unexpected values.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};
use crate::net::host_of;

#[derive(Deserialize)]
#[serde(default)]
struct DnsCheckConfig {
    record_type: String,
    expected_values: Vec<String>,
    timeout_seconds: u64,
}

impl Default for DnsCheckConfig {
    fn default() -> Self {
        Self {
            record_type: "A".to_string(),
            expected_values: Vec::new(),
            timeout_seconds: 10,
        }
    }
}

/// Compares resolved values against the expected set. Returns
/// `Some((missing, unexpected))` when the two sets differ.
fn expected_mismatch(
    expected: &[String],
    resolved: &[String],
) -> Option<(Vec<String>, Vec<String>)> {
    let expected_set: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    let resolved_set: BTreeSet<&str> = resolved.iter().map(String::as_str).collect();
    if expected_set == resolved_set {
        return None;
    }
    let missing = expected_set
        .difference(&resolved_set)
        .map(|s| s.to_string())
        .collect();
    let unexpected = resolved_set
        .difference(&expected_set)
        .map(|s| s.to_string())
        .collect();
    Some((missing, unexpected))
}

pub struct DnsCheck;

impl DnsCheck {
    async fn resolve(
        hostname: &str,
        record_type: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, String> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

        match record_type {
            "AAAA" => {
                let lookup = resolver
                    .ipv6_lookup(hostname)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(lookup.iter().map(|r| r.to_string()).collect())
            }
            "CNAME" => {
                let lookup = resolver
                    .lookup(hostname, RecordType::CNAME)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(lookup
                    .iter()
                    .filter_map(|rdata| rdata.as_cname())
                    .map(|name| name.to_string().trim_end_matches('.').to_string())
                    .collect())
            }
            "MX" => {
                let lookup = resolver
                    .mx_lookup(hostname)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(lookup
                    .iter()
                    .map(|mx| mx.exchange().to_string().trim_end_matches('.').to_string())
                    .collect())
            }
            // "A" and anything unrecognized fall back to an IPv4 lookup.
            _ => {
                let lookup = resolver
                    .ipv4_lookup(hostname)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(lookup.iter().map(|r| r.to_string()).collect())
            }
        }
    }
}

#[async_trait]
impl Check for DnsCheck {
    fn check_type(&self) -> &'static str {
        "dns"
    }

    fn display_name(&self) -> &'static str {
        "DNS Resolution Check"
    }

    fn description(&self) -> &'static str {
        "Verifies DNS records resolve correctly and optionally checks expected values"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "record_type": {
                    "type": "string",
                    "enum": ["A", "AAAA", "CNAME", "MX"],
                    "default": "A",
                    "description": "DNS record type to check"
                },
                "expected_values": {
                    "type": "array",
                    "items": { "type": "string" },
                    "default": [],
                    "description": "Expected record values; the resolved set must match exactly (leave empty to just verify resolution)"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 30,
                    "description": "Query timeout in seconds"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: DnsCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };

        let hostname = host_of(target);
        let timeout = Duration::from_secs(cfg.timeout_seconds.max(1));
        let start = Instant::now();

        // The resolver enforces its own timeout per attempt; the outer guard
        // bounds the whole lookup including retries.
        let resolved = tokio::time::timeout(
            timeout + Duration::from_secs(2),
            Self::resolve(&hostname, &cfg.record_type, timeout),
        )
        .await;

        let response_time_ms = elapsed_ms(start);

        let resolved_values = match resolved {
            Ok(Ok(values)) => values,
            Ok(Err(e)) => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("DNS resolution failed: {e}"),
                    json!({
                        "hostname": hostname,
                        "record_type": cfg.record_type,
                        "error_type": "resolution",
                    }),
                )
            }
            Err(_) => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("DNS query timed out after {}s", cfg.timeout_seconds),
                    json!({
                        "hostname": hostname,
                        "timeout": cfg.timeout_seconds,
                        "error_type": "timeout",
                    }),
                )
            }
        };

        if !cfg.expected_values.is_empty() {
            if let Some((missing, unexpected)) =
                expected_mismatch(&cfg.expected_values, &resolved_values)
            {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    "DNS records do not match expected values".to_string(),
                    json!({
                        "hostname": hostname,
                        "record_type": cfg.record_type,
                        "resolved": resolved_values,
                        "expected": cfg.expected_values,
                        "missing": missing,
                        "unexpected": unexpected,
                    }),
                );
            }
        }

        CheckOutcome::success(
            Some(response_time_ms),
            json!({
                "hostname": hostname,
                "record_type": cfg.record_type,
                "resolved_values": resolved_values,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_passes() {
        assert!(expected_mismatch(
            &strings(&["93.184.216.34"]),
            &strings(&["93.184.216.34"])
        )
        .is_none());
    }

    #[test]
    fn order_does_not_matter() {
        assert!(expected_mismatch(
            &strings(&["1.1.1.1", "2.2.2.2"]),
            &strings(&["2.2.2.2", "1.1.1.1"])
        )
        .is_none());
    }

    #[test]
    fn subset_is_a_mismatch() {
        // Exact set equality: a resolved superset of the expected values fails.
        let (missing, unexpected) = expected_mismatch(
            &strings(&["1.1.1.1"]),
            &strings(&["1.1.1.1", "2.2.2.2"]),
        )
        .unwrap();
        assert!(missing.is_empty());
        assert_eq!(unexpected, strings(&["2.2.2.2"]));
    }

    #[test]
    fn mismatch_reports_symmetric_difference() {
        let (missing, unexpected) =
            expected_mismatch(&strings(&["93.184.216.34"]), &strings(&["1.2.3.4"])).unwrap();
        assert_eq!(missing, strings(&["93.184.216.34"]));
        assert_eq!(unexpected, strings(&["1.2.3.4"]));
    }
}
