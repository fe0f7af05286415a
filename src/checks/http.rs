//! HTTP status check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};

#[derive(Deserialize)]
#[serde(default)]
struct HttpCheckConfig {
    expected_status_code: u16,
    timeout_seconds: u64,
    follow_redirects: bool,
    method: String,
    max_latency_ms: Option<u64>,
}

impl Default for HttpCheckConfig {
    fn default() -> Self {
        Self {
            expected_status_code: 200,
            timeout_seconds: 10,
            follow_redirects: true,
            method: "GET".to_string(),
            max_latency_ms: None,
        }
    }
}

pub struct HttpCheck;

#[async_trait]
impl Check for HttpCheck {
    fn check_type(&self) -> &'static str {
        "http"
    }

    fn display_name(&self) -> &'static str {
        "HTTP Status Check"
    }

    fn description(&self) -> &'static str {
        "Verifies HTTP status code and measures response time"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expected_status_code": {
                    "type": "integer",
                    "default": 200,
                    "description": "Expected HTTP status code"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 60,
                    "description": "Request timeout in seconds"
                },
                "follow_redirects": {
                    "type": "boolean",
                    "default": true,
                    "description": "Follow HTTP redirects"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "HEAD"],
                    "default": "GET",
                    "description": "HTTP method to use"
                },
                "max_latency_ms": {
                    "type": "integer",
                    "default": null,
                    "description": "Latency ceiling; a correct status slower than this downgrades to warning"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: HttpCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };

        let redirect_policy = if cfg.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .redirect(redirect_policy)
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
        let request = if cfg.method.eq_ignore_ascii_case("HEAD") {
            client.head(target)
        } else {
            client.get(target)
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return request_failure(e, start, cfg.timeout_seconds),
        };

        let status_code = response.status().as_u16();
        let headers: serde_json::Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                )
            })
            .collect();
        let body_len = match response.bytes().await {
            Ok(body) => body.len(),
            Err(_) => 0,
        };
        let response_time_ms = elapsed_ms(start);

        if status_code != cfg.expected_status_code {
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!(
                    "Expected status {}, got {}",
                    cfg.expected_status_code, status_code
                ),
                json!({
                    "status_code": status_code,
                    "expected_status": cfg.expected_status_code,
                }),
            );
        }

        let result_data = json!({
            "status_code": status_code,
            "content_length": body_len,
            "headers": headers,
        });

        if let Some(ceiling) = cfg.max_latency_ms {
            if response_time_ms as u64 > ceiling {
                return CheckOutcome::warning(
                    Some(response_time_ms),
                    format!("Response took {response_time_ms}ms (ceiling: {ceiling}ms)"),
                    result_data,
                );
            }
        }

        CheckOutcome::success(Some(response_time_ms), result_data)
    }
}

pub(crate) fn request_failure(
    err: reqwest::Error,
    start: Instant,
    timeout_seconds: u64,
) -> CheckOutcome {
    let response_time_ms = elapsed_ms(start);
    if err.is_timeout() {
        CheckOutcome::failure(
            Some(response_time_ms),
            format!("Request timed out after {timeout_seconds}s"),
            json!({ "timeout": timeout_seconds, "error_type": "timeout" }),
        )
    } else if err.is_connect() {
        CheckOutcome::failure(
            Some(response_time_ms),
            format!("Connection failed: {err}"),
            json!({ "error_type": "connect" }),
        )
    } else {
        CheckOutcome::failure(
            Some(response_time_ms),
            err.to_string(),
            json!({ "error_type": "request" }),
        )
    }
}
