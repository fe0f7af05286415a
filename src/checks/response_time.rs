//! Response time threshold check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::request_failure;
use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};

#[derive(Deserialize)]
#[serde(default)]
struct ResponseTimeCheckConfig {
    warning_threshold_ms: i32,
    failure_threshold_ms: i32,
    timeout_seconds: u64,
    method: String,
    follow_redirects: bool,
}

impl Default for ResponseTimeCheckConfig {
    fn default() -> Self {
        Self {
            warning_threshold_ms: 1000,
            failure_threshold_ms: 5000,
            timeout_seconds: 30,
            method: "GET".to_string(),
            follow_redirects: true,
        }
    }
}

pub struct ResponseTimeCheck;

#[async_trait]
impl Check for ResponseTimeCheck {
    fn check_type(&self) -> &'static str {
        "response_time"
    }

    fn display_name(&self) -> &'static str {
        "Response Time Check"
    }

    fn description(&self) -> &'static str {
        "Monitors response time with configurable warning and failure thresholds"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "warning_threshold_ms": {
                    "type": "integer",
                    "default": 1000,
                    "minimum": 100,
                    "maximum": 30000,
                    "description": "Response time threshold for warning status (milliseconds)"
                },
                "failure_threshold_ms": {
                    "type": "integer",
                    "default": 5000,
                    "minimum": 500,
                    "maximum": 60000,
                    "description": "Response time threshold for failure status (milliseconds)"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 30,
                    "minimum": 1,
                    "maximum": 120,
                    "description": "Maximum time to wait for response"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "HEAD"],
                    "default": "GET",
                    "description": "HTTP method to use (HEAD is faster but returns no body)"
                },
                "follow_redirects": {
                    "type": "boolean",
                    "default": true,
                    "description": "Follow HTTP redirects"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: ResponseTimeCheckConfig = match parse_config(config) {
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

        let is_head = cfg.method.eq_ignore_ascii_case("HEAD");
        let start = Instant::now();
        let request = if is_head {
            client.head(target)
        } else {
            client.get(target)
        };
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return request_failure(e, start, cfg.timeout_seconds),
        };

        let status_code = response.status().as_u16();
        let content_length = if is_head {
            None
        } else {
            response.bytes().await.ok().map(|b| b.len())
        };
        let response_time_ms = elapsed_ms(start);

        let result_data = json!({
            "response_time_ms": response_time_ms,
            "status_code": status_code,
            "warning_threshold_ms": cfg.warning_threshold_ms,
            "failure_threshold_ms": cfg.failure_threshold_ms,
            "content_length": content_length,
            "method": cfg.method.to_uppercase(),
        });

        // Failure threshold strictly dominates the warning threshold.
        if response_time_ms >= cfg.failure_threshold_ms {
            CheckOutcome::failure(
                Some(response_time_ms),
                format!(
                    "Response time {response_time_ms}ms exceeds failure threshold {}ms",
                    cfg.failure_threshold_ms
                ),
                result_data,
            )
        } else if response_time_ms >= cfg.warning_threshold_ms {
            CheckOutcome::warning(
                Some(response_time_ms),
                format!(
                    "Response time {response_time_ms}ms exceeds warning threshold {}ms",
                    cfg.warning_threshold_ms
                ),
                result_data,
            )
        } else {
            CheckOutcome::success(Some(response_time_ms), result_data)
        }
    }
}
