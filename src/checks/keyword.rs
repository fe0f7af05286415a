//! Page-content keyword check.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::request_failure;
use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};

#[derive(Deserialize)]
#[serde(default)]
struct KeywordCheckConfig {
    keywords_present: Vec<String>,
    keywords_absent: Vec<String>,
    use_regex: bool,
    case_sensitive: bool,
    timeout_seconds: u64,
}

impl Default for KeywordCheckConfig {
    fn default() -> Self {
        Self {
            keywords_present: Vec::new(),
            keywords_absent: Vec::new(),
            use_regex: false,
            case_sensitive: false,
            timeout_seconds: 10,
        }
    }
}

fn keyword_matches(
    content: &str,
    keyword: &str,
    use_regex: bool,
    case_sensitive: bool,
) -> Result<bool, regex::Error> {
    if use_regex {
        let re = RegexBuilder::new(keyword)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(re.is_match(content))
    } else if case_sensitive {
        Ok(content.contains(keyword))
    } else {
        Ok(content.to_lowercase().contains(&keyword.to_lowercase()))
    }
}

/// Returns the keywords that violate the configuration: required keywords
/// that are missing, and forbidden keywords that are present.
fn find_violations(
    content: &str,
    cfg: &KeywordCheckConfig,
) -> Result<(Vec<String>, Vec<String>), regex::Error> {
    let mut missing = Vec::new();
    for keyword in &cfg.keywords_present {
        if !keyword_matches(content, keyword, cfg.use_regex, cfg.case_sensitive)? {
            missing.push(keyword.clone());
        }
    }
    let mut forbidden = Vec::new();
    for keyword in &cfg.keywords_absent {
        if keyword_matches(content, keyword, cfg.use_regex, cfg.case_sensitive)? {
            forbidden.push(keyword.clone());
        }
    }
    Ok((missing, forbidden))
}

pub struct KeywordCheck;

#[async_trait]
impl Check for KeywordCheck {
    fn check_type(&self) -> &'static str {
        "keyword"
    }

    fn display_name(&self) -> &'static str {
        "Keyword/Content Check"
    }

    fn description(&self) -> &'static str {
        "Verifies that specific keywords or patterns exist (or are absent) in the page content"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keywords_present": {
                    "type": "array",
                    "items": { "type": "string" },
                    "default": [],
                    "description": "Keywords or patterns that MUST be present in the page"
                },
                "keywords_absent": {
                    "type": "array",
                    "items": { "type": "string" },
                    "default": [],
                    "description": "Keywords or patterns that must NOT be present (e.g., error messages)"
                },
                "use_regex": {
                    "type": "boolean",
                    "default": false,
                    "description": "Treat keywords as regular expressions"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "default": false,
                    "description": "Perform case-sensitive matching"
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
        let cfg: KeywordCheckConfig = match parse_config(config) {
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
        let response = match client.get(target).send().await {
            Ok(response) => response,
            Err(e) => return request_failure(e, start, cfg.timeout_seconds),
        };
        let status_code = response.status().as_u16();
        let content = match response.text().await {
            Ok(content) => content,
            Err(e) => return request_failure(e, start, cfg.timeout_seconds),
        };
        let response_time_ms = elapsed_ms(start);

        let (missing, forbidden) = match find_violations(&content, &cfg) {
            Ok(v) => v,
            Err(e) => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("Invalid keyword pattern: {e}"),
                    json!({ "error_type": "pattern" }),
                )
            }
        };

        if !missing.is_empty() || !forbidden.is_empty() {
            let mut errors = Vec::new();
            if !missing.is_empty() {
                errors.push(format!("Missing keywords: {}", missing.join(", ")));
            }
            if !forbidden.is_empty() {
                errors.push(format!("Found forbidden keywords: {}", forbidden.join(", ")));
            }
            return CheckOutcome::failure(
                Some(response_time_ms),
                errors.join("; "),
                json!({
                    "status_code": status_code,
                    "content_length": content.len(),
                    "missing_keywords": missing,
                    "found_forbidden": forbidden,
                    "keywords_checked": cfg.keywords_present.len() + cfg.keywords_absent.len(),
                }),
            );
        }

        CheckOutcome::success(
            Some(response_time_ms),
            json!({
                "status_code": status_code,
                "content_length": content.len(),
                "keywords_present_checked": cfg.keywords_present.len(),
                "keywords_absent_checked": cfg.keywords_absent.len(),
                "all_keywords_validated": true,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(present: &[&str], absent: &[&str], use_regex: bool, case_sensitive: bool) -> KeywordCheckConfig {
        KeywordCheckConfig {
            keywords_present: present.iter().map(|s| s.to_string()).collect(),
            keywords_absent: absent.iter().map(|s| s.to_string()).collect(),
            use_regex,
            case_sensitive,
            timeout_seconds: 10,
        }
    }

    #[test]
    fn literal_matching_is_case_insensitive_by_default() {
        let (missing, forbidden) =
            find_violations("Welcome to EXAMPLE", &cfg(&["example"], &[], false, false)).unwrap();
        assert!(missing.is_empty());
        assert!(forbidden.is_empty());
    }

    #[test]
    fn case_sensitive_matching_misses_wrong_case() {
        let (missing, _) =
            find_violations("Welcome to EXAMPLE", &cfg(&["example"], &[], false, true)).unwrap();
        assert_eq!(missing, vec!["example".to_string()]);
    }

    #[test]
    fn forbidden_keyword_is_reported() {
        let (missing, forbidden) = find_violations(
            "Internal Server Error",
            &cfg(&[], &["server error"], false, false),
        )
        .unwrap();
        assert!(missing.is_empty());
        assert_eq!(forbidden, vec!["server error".to_string()]);
    }

    #[test]
    fn regex_patterns_are_supported() {
        let (missing, forbidden) = find_violations(
            "order #12345 confirmed",
            &cfg(&[r"order #\d+"], &[r"error\s+\d+"], true, false),
        )
        .unwrap();
        assert!(missing.is_empty());
        assert!(forbidden.is_empty());
    }

    #[test]
    fn invalid_regex_is_an_error() {
        assert!(find_violations("x", &cfg(&["("], &[], true, false)).is_err());
    }
}
