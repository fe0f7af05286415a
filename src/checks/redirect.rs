//! Redirect chain check.
//!
//! Redirects are followed manually so the chain can be recorded, loops
//! detected by exact-URL revisit, and the final destination validated.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::request_failure;
use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};

#[derive(Deserialize)]
#[serde(default)]
struct RedirectCheckConfig {
    expected_final_url: Option<String>,
    max_redirects: usize,
    require_https: bool,
    warn_on_redirect_count: usize,
    timeout_seconds: u64,
}

impl Default for RedirectCheckConfig {
    fn default() -> Self {
        Self {
            expected_final_url: None,
            max_redirects: 10,
            require_https: false,
            warn_on_redirect_count: 3,
            timeout_seconds: 10,
        }
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Resolves a Location header against the URL that produced it.
fn resolve_location(current_url: &str, location: &str) -> Option<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Some(location.to_string());
    }
    let base = Url::parse(current_url).ok()?;
    base.join(location).ok().map(|u| u.to_string())
}

fn urls_equivalent(expected: &str, actual: &str) -> bool {
    expected.trim_end_matches('/').to_lowercase() == actual.trim_end_matches('/').to_lowercase()
}

pub struct RedirectCheck;

#[async_trait]
impl Check for RedirectCheck {
    fn check_type(&self) -> &'static str {
        "redirect"
    }

    fn display_name(&self) -> &'static str {
        "Redirect Chain Check"
    }

    fn description(&self) -> &'static str {
        "Monitors HTTP redirect chains, verifies final destination, and detects redirect loops"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expected_final_url": {
                    "type": "string",
                    "default": null,
                    "description": "Expected final destination URL after all redirects (optional)"
                },
                "max_redirects": {
                    "type": "integer",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 20,
                    "description": "Maximum number of redirects to follow"
                },
                "require_https": {
                    "type": "boolean",
                    "default": false,
                    "description": "Require final destination to use HTTPS"
                },
                "warn_on_redirect_count": {
                    "type": "integer",
                    "default": 3,
                    "minimum": 1,
                    "maximum": 10,
                    "description": "Number of redirects that triggers a warning"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 60,
                    "description": "Timeout per request in seconds"
                }
            }
        })
    }

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome {
        let cfg: RedirectCheckConfig = match parse_config(config) {
            Ok(cfg) => cfg,
            Err(e) => return invalid_config(e),
        };

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .redirect(reqwest::redirect::Policy::none())
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
        let mut redirect_chain: Vec<Value> = Vec::new();
        let mut visited: Vec<String> = Vec::new();
        let mut current_url = target.to_string();
        let mut final_status: Option<u16> = None;

        for _hop in 0..=cfg.max_redirects {
            let response = match client.get(&current_url).send().await {
                Ok(response) => response,
                Err(e) => {
                    let mut outcome = request_failure(e, start, cfg.timeout_seconds);
                    outcome.result_data["redirect_chain"] = json!(redirect_chain);
                    return outcome;
                }
            };

            let status = response.status().as_u16();
            let location = response
                .headers()
                .get("location")
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
            redirect_chain.push(json!({
                "url": current_url,
                "status_code": status,
                "location": location,
            }));
            visited.push(current_url.clone());

            if !is_redirect(status) {
                final_status = Some(status);
                break;
            }

            let location = match location {
                Some(location) => location,
                None => {
                    return CheckOutcome::failure(
                        Some(elapsed_ms(start)),
                        format!("Redirect response ({status}) missing Location header"),
                        json!({ "redirect_chain": redirect_chain, "failed_at": current_url }),
                    )
                }
            };

            let next_url = match resolve_location(&current_url, &location) {
                Some(url) => url,
                None => {
                    return CheckOutcome::failure(
                        Some(elapsed_ms(start)),
                        format!("Unresolvable Location header: {location}"),
                        json!({ "redirect_chain": redirect_chain, "failed_at": current_url }),
                    )
                }
            };

            if visited.contains(&next_url) {
                return CheckOutcome::failure(
                    Some(elapsed_ms(start)),
                    format!("Redirect loop detected: {next_url}"),
                    json!({ "redirect_chain": redirect_chain, "loop_url": next_url }),
                );
            }

            current_url = next_url;
        }

        let response_time_ms = elapsed_ms(start);

        let final_status = match final_status {
            Some(status) => status,
            None => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("Exceeded maximum redirects ({})", cfg.max_redirects),
                    json!({
                        "redirect_chain": redirect_chain,
                        "max_redirects": cfg.max_redirects,
                    }),
                )
            }
        };

        let final_url = current_url;
        let redirect_count = redirect_chain.len() - 1;
        let result_data = json!({
            "original_url": target,
            "final_url": final_url,
            "final_status_code": final_status,
            "redirect_count": redirect_count,
            "redirect_chain": redirect_chain,
        });

        if let Some(expected) = &cfg.expected_final_url {
            if !urls_equivalent(expected, &final_url) {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("Final URL '{final_url}' does not match expected '{expected}'"),
                    result_data,
                );
            }
        }

        if cfg.require_https && !final_url.starts_with("https://") {
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!("Final URL does not use HTTPS: {final_url}"),
                result_data,
            );
        }

        if final_status >= 400 {
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!("Final destination returned error status: {final_status}"),
                result_data,
            );
        }

        if redirect_count >= cfg.warn_on_redirect_count {
            return CheckOutcome::warning(
                Some(response_time_ms),
                format!("High number of redirects: {redirect_count}"),
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
    fn redirect_statuses() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status));
        }
        assert!(!is_redirect(200));
        assert!(!is_redirect(404));
    }

    #[test]
    fn relative_locations_resolve_against_current_url() {
        assert_eq!(
            resolve_location("https://example.com/a/b", "/c").unwrap(),
            "https://example.com/c"
        );
        assert_eq!(
            resolve_location("https://example.com/a/b", "c").unwrap(),
            "https://example.com/a/c"
        );
        assert_eq!(
            resolve_location("https://example.com/a", "https://other.example/x").unwrap(),
            "https://other.example/x"
        );
    }

    #[test]
    fn final_url_comparison_ignores_trailing_slash_and_case() {
        assert!(urls_equivalent("https://example.com/", "https://EXAMPLE.com"));
        assert!(!urls_equivalent("https://example.com/a", "https://example.com/b"));
    }
}
