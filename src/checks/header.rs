//! HTTP response header check.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::http::request_failure;
use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};

const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("Strict-Transport-Security", "HSTS - Enforces HTTPS"),
    ("X-Content-Type-Options", "Prevents MIME-type sniffing"),
    ("X-Frame-Options", "Clickjacking protection"),
    ("X-XSS-Protection", "XSS filter (legacy)"),
    ("Content-Security-Policy", "CSP - Controls resource loading"),
    ("Referrer-Policy", "Controls referrer information"),
];

#[derive(Deserialize)]
#[serde(default)]
struct HeaderCheckConfig {
    required_headers: HashMap<String, String>,
    forbidden_headers: Vec<String>,
    security_headers_check: bool,
    method: String,
    timeout_seconds: u64,
}

impl Default for HeaderCheckConfig {
    fn default() -> Self {
        Self {
            required_headers: HashMap::new(),
            forbidden_headers: Vec::new(),
            security_headers_check: false,
            method: "HEAD".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Whether an observed header value satisfies the expectation. `*` or an
/// empty expectation asserts presence only; `/pattern/` matches as a
/// case-insensitive regex; anything else compares case-insensitively.
fn value_matches(expected: &str, actual: &str) -> bool {
    if expected.is_empty() || expected == "*" {
        return true;
    }
    if expected.len() >= 2 && expected.starts_with('/') && expected.ends_with('/') {
        let pattern = &expected[1..expected.len() - 1];
        return RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(actual))
            .unwrap_or(false);
    }
    expected.eq_ignore_ascii_case(actual)
}

pub struct HeaderCheck;

#[async_trait]
impl Check for HeaderCheck {
    fn check_type(&self) -> &'static str {
        "header"
    }

    fn display_name(&self) -> &'static str {
        "HTTP Header Check"
    }

    fn description(&self) -> &'static str {
        "Verifies that specific HTTP headers are present with expected values (useful for security headers)"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "required_headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "default": {},
                    "description": "Headers that must be present. Use '*' for any value, or '/pattern/' for regex matching."
                },
                "forbidden_headers": {
                    "type": "array",
                    "items": { "type": "string" },
                    "default": [],
                    "description": "Headers that must NOT be present (e.g., 'Server', 'X-Powered-By')"
                },
                "security_headers_check": {
                    "type": "boolean",
                    "default": false,
                    "description": "Check for common security headers (HSTS, CSP, X-Frame-Options, etc.) and warn if missing"
                },
                "method": {
                    "type": "string",
                    "enum": ["HEAD", "GET"],
                    "default": "HEAD",
                    "description": "HTTP method to use (HEAD is faster)"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 60,
                    "description": "Request timeout in seconds"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: HeaderCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                return CheckOutcome::failure(
                    None,
                    format!("failed to build HTTP client: {e}"),
                    json!({ "error_type": "client" }),
                )
            }
        };

        let start = Instant::now();
        let request = if cfg.method.eq_ignore_ascii_case("GET") {
            client.get(target)
        } else {
            client.head(target)
        };
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return request_failure(e, start, cfg.timeout_seconds),
        };
        let response_time_ms = elapsed_ms(start);

        let status_code = response.status().as_u16();
        let response_headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut header_results = Map::new();

        for (header_name, expected_value) in &cfg.required_headers {
            match response_headers.get(&header_name.to_lowercase()) {
                None => {
                    errors.push(format!("Missing required header: {header_name}"));
                    header_results.insert(
                        header_name.clone(),
                        json!({ "status": "missing", "expected": expected_value }),
                    );
                }
                Some(actual) if value_matches(expected_value, actual) => {
                    header_results
                        .insert(header_name.clone(), json!({ "status": "ok", "value": actual }));
                }
                Some(actual) => {
                    errors.push(format!(
                        "Header '{header_name}' value mismatch: expected '{expected_value}', got '{actual}'"
                    ));
                    header_results.insert(
                        header_name.clone(),
                        json!({ "status": "mismatch", "expected": expected_value, "actual": actual }),
                    );
                }
            }
        }

        for header_name in &cfg.forbidden_headers {
            if let Some(value) = response_headers.get(&header_name.to_lowercase()) {
                errors.push(format!("Forbidden header present: {header_name}"));
                header_results.insert(
                    header_name.clone(),
                    json!({ "status": "forbidden", "value": value }),
                );
            }
        }

        if cfg.security_headers_check {
            let mut present = Vec::new();
            let mut missing = Vec::new();
            for (header, description) in SECURITY_HEADERS {
                if response_headers.contains_key(&header.to_lowercase()) {
                    present.push(header);
                } else {
                    missing.push(header);
                    warnings.push(format!("Missing security header: {header} ({description})"));
                }
            }
            header_results.insert(
                "_security_check".to_string(),
                json!({
                    "present": present,
                    "missing": missing,
                    "score": format!("{}/{}", present.len(), SECURITY_HEADERS.len()),
                }),
            );
        }

        let result_data = json!({
            "status_code": status_code,
            "headers_checked": cfg.required_headers.len() + cfg.forbidden_headers.len(),
            "header_results": header_results,
            "total_response_headers": response_headers.len(),
        });

        if !errors.is_empty() {
            return CheckOutcome::failure(Some(response_time_ms), errors.join("; "), result_data);
        }

        if !warnings.is_empty() {
            let summary = warnings
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join("; ");
            return CheckOutcome::warning(Some(response_time_ms), summary, result_data);
        }

        CheckOutcome::success(Some(response_time_ms), result_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_and_empty_assert_presence_only() {
        assert!(value_matches("*", "anything"));
        assert!(value_matches("", "anything"));
    }

    #[test]
    fn literal_comparison_ignores_case() {
        assert!(value_matches("application/json", "Application/JSON"));
        assert!(!value_matches("application/json", "text/html"));
    }

    #[test]
    fn slash_delimited_expectation_matches_as_regex() {
        assert!(value_matches("/max-age=\\d+/", "max-age=31536000; includeSubDomains"));
        assert!(!value_matches("/max-age=\\d+/", "no-cache"));
    }

    #[test]
    fn invalid_regex_never_matches() {
        assert!(!value_matches("/(/", "anything"));
    }
}
