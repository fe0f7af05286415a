//! JSON API structure check.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::request_failure;
use super::{elapsed_ms, invalid_config, parse_config, Check, CheckOutcome};

#[derive(Deserialize)]
#[serde(default)]
struct JsonApiCheckConfig {
    expected_status_code: u16,
    method: String,
    required_fields: Vec<String>,
    field_type_checks: HashMap<String, String>,
    headers: HashMap<String, String>,
    request_body: Option<Value>,
    timeout_seconds: u64,
}

impl Default for JsonApiCheckConfig {
    fn default() -> Self {
        Self {
            expected_status_code: 200,
            method: "GET".to_string(),
            required_fields: Vec::new(),
            field_type_checks: HashMap::new(),
            headers: HashMap::new(),
            request_body: None,
            timeout_seconds: 10,
        }
    }
}

/// Walks a dot path into a JSON structure. Path segments index objects by
/// key; numeric segments additionally index arrays.
fn lookup_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => {
                let index: usize = part.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validates one field's type. Returns an error description on mismatch.
fn check_field_type(data: &Value, path: &str, expected: &str) -> Option<String> {
    let value = match lookup_path(data, path) {
        Some(value) => value,
        None => return Some(format!("Field '{path}' not found")),
    };
    let ok = match expected.to_lowercase().as_str() {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        other => return Some(format!("Unknown type '{other}'")),
    };
    if ok {
        None
    } else {
        Some(format!(
            "Field '{path}' expected {expected}, got {}",
            json_type_name(value)
        ))
    }
}

pub struct JsonApiCheck;

#[async_trait]
impl Check for JsonApiCheck {
    fn check_type(&self) -> &'static str {
        "json_api"
    }

    fn display_name(&self) -> &'static str {
        "JSON API Check"
    }

    fn description(&self) -> &'static str {
        "Validates JSON API endpoints return valid JSON and optionally checks for required fields"
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
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "DELETE"],
                    "default": "GET",
                    "description": "HTTP method to use"
                },
                "required_fields": {
                    "type": "array",
                    "items": { "type": "string" },
                    "default": [],
                    "description": "Required fields in the JSON response (dot notation for nested fields, e.g., 'data.user.id')"
                },
                "field_type_checks": {
                    "type": "object",
                    "additionalProperties": {
                        "type": "string",
                        "enum": ["string", "number", "integer", "boolean", "array", "object", "null"]
                    },
                    "default": {},
                    "description": "Field type validations (e.g., {'data.count': 'integer'})"
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "default": {},
                    "description": "Additional headers to send with the request"
                },
                "request_body": {
                    "type": "object",
                    "default": null,
                    "description": "Request body for POST/PUT requests"
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
        let cfg: JsonApiCheckConfig = match parse_config(config) {
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

        let mut request = match cfg.method.to_uppercase().as_str() {
            "POST" => client.post(target),
            "PUT" => client.put(target),
            "DELETE" => client.delete(target),
            _ => client.get(target),
        };
        request = request.header("Accept", "application/json");
        for (name, value) in &cfg.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &cfg.request_body {
            if matches!(cfg.method.to_uppercase().as_str(), "POST" | "PUT") {
                request = request.json(body);
            }
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return request_failure(e, start, cfg.timeout_seconds),
        };

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return request_failure(e, start, cfg.timeout_seconds),
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
                    "expected_status_code": cfg.expected_status_code,
                }),
            );
        }

        if !content_type.to_lowercase().contains("application/json") {
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!("Expected JSON content-type, got: {content_type}"),
                json!({ "status_code": status_code, "content_type": content_type }),
            );
        }

        let json_data: Value = match serde_json::from_str(&body) {
            Ok(data) => data,
            Err(e) => {
                return CheckOutcome::failure(
                    Some(response_time_ms),
                    format!("Invalid JSON response: {e}"),
                    json!({
                        "status_code": status_code,
                        "content_type": content_type,
                        "parse_error": e.to_string(),
                    }),
                )
            }
        };

        let missing_fields: Vec<&String> = cfg
            .required_fields
            .iter()
            .filter(|path| lookup_path(&json_data, path).is_none())
            .collect();
        if !missing_fields.is_empty() {
            let listing = missing_fields
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!("Missing required fields: {listing}"),
                json!({
                    "status_code": status_code,
                    "missing_fields": missing_fields,
                    "required_fields": cfg.required_fields,
                }),
            );
        }

        let type_errors: Vec<String> = cfg
            .field_type_checks
            .iter()
            .filter_map(|(path, expected)| check_field_type(&json_data, path, expected))
            .collect();
        if !type_errors.is_empty() {
            return CheckOutcome::failure(
                Some(response_time_ms),
                format!("Type check failures: {}", type_errors.join("; ")),
                json!({ "status_code": status_code, "type_errors": type_errors }),
            );
        }

        CheckOutcome::success(
            Some(response_time_ms),
            json!({
                "status_code": status_code,
                "content_type": content_type,
                "json_valid": true,
                "response_type": json_type_name(&json_data),
                "fields_validated": cfg.required_fields.len(),
                "types_validated": cfg.field_type_checks.len(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "data": {
                "user": { "id": 7, "name": "ada" },
                "tags": ["a", "b"],
                "count": 2
            },
            "ok": true
        })
    }

    #[test]
    fn dot_paths_walk_objects_and_arrays() {
        let data = sample();
        assert_eq!(lookup_path(&data, "ok"), Some(&json!(true)));
        assert_eq!(lookup_path(&data, "data.user.id"), Some(&json!(7)));
        assert_eq!(lookup_path(&data, "data.tags.1"), Some(&json!("b")));
        assert!(lookup_path(&data, "data.tags.5").is_none());
        assert!(lookup_path(&data, "data.missing").is_none());
    }

    #[test]
    fn type_checks_distinguish_integer_from_number() {
        let data = sample();
        assert!(check_field_type(&data, "data.count", "integer").is_none());
        assert!(check_field_type(&data, "data.count", "number").is_none());
        assert!(check_field_type(&data, "data.user.name", "integer").is_some());
        assert!(check_field_type(&data, "data.tags", "array").is_none());
        assert!(check_field_type(&data, "ok", "boolean").is_none());
    }

    #[test]
    fn unknown_expected_type_is_reported() {
        let data = sample();
        let err = check_field_type(&data, "ok", "tuple").unwrap();
        assert!(err.contains("Unknown type"));
    }
}
