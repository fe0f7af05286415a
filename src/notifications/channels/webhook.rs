//! Generic HTTP webhook channel.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{NotificationSender, SenderError};
use crate::notifications::payload::NotificationPayload;

#[derive(Deserialize)]
#[serde(default)]
struct WebhookConfig {
    url: String,
    method: String,
    headers: HashMap<String, String>,
    auth_type: String,
    auth_token: String,
    auth_username: String,
    auth_password: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "POST".to_string(),
            headers: HashMap::new(),
            auth_type: "none".to_string(),
            auth_token: String::new(),
            auth_username: String::new(),
            auth_password: String::new(),
        }
    }
}

fn parse_webhook_config(config: &Value) -> Result<WebhookConfig, SenderError> {
    let cfg: WebhookConfig = serde_json::from_value(config.clone())
        .map_err(|e| SenderError::InvalidConfiguration(e.to_string()))?;
    if cfg.url.is_empty() {
        return Err(SenderError::InvalidConfiguration(
            "webhook URL is required".to_string(),
        ));
    }
    Ok(cfg)
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, SenderError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn apply_auth(builder: reqwest::RequestBuilder, cfg: &WebhookConfig) -> reqwest::RequestBuilder {
    match cfg.auth_type.as_str() {
        "bearer" => builder.bearer_auth(&cfg.auth_token),
        "basic" => builder.basic_auth(&cfg.auth_username, Some(&cfg.auth_password)),
        _ => builder,
    }
}

pub struct WebhookChannel;

#[async_trait]
impl NotificationSender for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn display_name(&self) -> &'static str {
        "Webhook (HTTP)"
    }

    fn config_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "format": "uri",
                    "title": "Webhook URL",
                    "description": "URL to send notifications to"
                },
                "method": {
                    "type": "string",
                    "enum": ["POST", "PUT"],
                    "default": "POST",
                    "title": "HTTP Method",
                    "description": "HTTP method to use"
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "default": {},
                    "title": "Custom Headers",
                    "description": "Additional HTTP headers to include"
                },
                "auth_type": {
                    "type": "string",
                    "enum": ["none", "bearer", "basic"],
                    "default": "none",
                    "title": "Authentication Type",
                    "description": "Type of authentication to use"
                },
                "auth_token": {
                    "type": "string",
                    "title": "Bearer Token",
                    "description": "Bearer token for authentication (if auth_type is 'bearer')"
                },
                "auth_username": {
                    "type": "string",
                    "title": "Basic Auth Username",
                    "description": "Username for basic authentication (if auth_type is 'basic')"
                },
                "auth_password": {
                    "type": "string",
                    "format": "password",
                    "title": "Basic Auth Password",
                    "description": "Password for basic authentication (if auth_type is 'basic')"
                }
            }
        })
    }

    async fn send(
        &self,
        config: &Value,
        payload: &NotificationPayload,
    ) -> Result<(), SenderError> {
        let cfg = parse_webhook_config(config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let mut request = match cfg.method.to_uppercase().as_str() {
            "PUT" => client.put(&cfg.url),
            "POST" => client.post(&cfg.url),
            other => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "unsupported HTTP method: {other}"
                )))
            }
        };
        request = request.headers(header_map(&cfg.headers)?);
        request = apply_auth(request, &cfg);

        let response = request.json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "webhook returned non-success status: {status}. Body: {body}"
            )));
        }
        Ok(())
    }

    async fn test_connection(&self, config: &Value) -> Result<(), SenderError> {
        let cfg = parse_webhook_config(config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let headers = header_map(&cfg.headers)?;

        // OPTIONS first; some endpoints only answer their POST route, so any
        // status below 500 counts as reachable. Fall back to HEAD on
        // transport errors or server errors.
        let options = apply_auth(
            client
                .request(reqwest::Method::OPTIONS, &cfg.url)
                .headers(headers.clone()),
            &cfg,
        )
        .send()
        .await;
        if let Ok(response) = options {
            if response.status().as_u16() < 500 {
                return Ok(());
            }
        }

        let response = apply_auth(client.head(&cfg.url).headers(headers), &cfg)
            .send()
            .await?;
        if response.status().as_u16() < 500 {
            Ok(())
        } else {
            Err(SenderError::SendFailed(format!(
                "webhook endpoint returned {}",
                response.status()
            )))
        }
    }
}
