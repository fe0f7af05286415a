//! Check plugins: one implementation per probe protocol.
//!
//! Every plugin is a pure probe: `execute` never returns an error across its
//! boundary. Protocol failures, timeouts, and bad configuration all fold into
//! a `failure` outcome carrying a categorized message and diagnostic data.

use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::db::models::CheckStatus;

pub mod dns;
pub mod header;
pub mod http;
pub mod imap;
pub mod json_api;
pub mod keyword;
pub mod ping;
pub mod pop3;
pub mod port;
pub mod redirect;
pub mod registry;
pub mod response_time;
pub mod smtp;
pub mod ssl;
pub mod tls;

pub use registry::{CheckRegistry, RegistryError};

/// Verdict and diagnostics of a single probe execution.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub response_time_ms: Option<i32>,
    pub error_message: Option<String>,
    pub result_data: Value,
}

impl CheckOutcome {
    pub fn success(response_time_ms: Option<i32>, result_data: Value) -> Self {
        Self {
            status: CheckStatus::Success,
            response_time_ms,
            error_message: None,
            result_data,
        }
    }

    pub fn warning(
        response_time_ms: Option<i32>,
        message: impl Into<String>,
        result_data: Value,
    ) -> Self {
        Self {
            status: CheckStatus::Warning,
            response_time_ms,
            error_message: Some(message.into()),
            result_data,
        }
    }

    pub fn failure(
        response_time_ms: Option<i32>,
        message: impl Into<String>,
        result_data: Value,
    ) -> Self {
        Self {
            status: CheckStatus::Failure,
            response_time_ms,
            error_message: Some(message.into()),
            result_data,
        }
    }
}

/// A protocol probe.
///
/// `config` is the opaque key/value map from the check configuration; each
/// plugin deserializes the keys it understands and ignores the rest (the
/// declared schema is advisory, used for UI generation and boundary
/// validation only).
#[async_trait]
pub trait Check: Send + Sync {
    fn check_type(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn config_schema(&self) -> Value;

    async fn execute(&self, target: &str, config: &Value) -> CheckOutcome;
}

/// Deserializes a plugin configuration, tolerating absent or null input.
pub(crate) fn parse_config<T>(config: &Value) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    if config.is_null() {
        Ok(T::default())
    } else {
        serde_json::from_value(config.clone())
    }
}

/// Standard failure outcome for an unparseable configuration map.
pub(crate) fn invalid_config(err: serde_json::Error) -> CheckOutcome {
    CheckOutcome::failure(
        None,
        format!("invalid configuration: {err}"),
        json!({ "error_type": "configuration" }),
    )
}

pub(crate) fn elapsed_ms(start: Instant) -> i32 {
    start.elapsed().as_millis().min(i32::MAX as u128) as i32
}
