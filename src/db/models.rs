//! Core data model shared by the executor, rule engine, and storage layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verdict of a single check execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Success,
    Failure,
    Warning,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Success => "success",
            CheckStatus::Failure => "failure",
            CheckStatus::Warning => "warning",
        };
        f.write_str(s)
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(CheckStatus::Success),
            "failure" => Ok(CheckStatus::Failure),
            "warning" => Ok(CheckStatus::Warning),
            other => Err(format!("unknown check status '{other}'")),
        }
    }
}

/// Events a notification rule can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTrigger {
    CheckFailure,
    CheckRecovery,
    IncidentOpened,
    IncidentResolved,
}

impl fmt::Display for NotificationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationTrigger::CheckFailure => "check_failure",
            NotificationTrigger::CheckRecovery => "check_recovery",
            NotificationTrigger::IncidentOpened => "incident_opened",
            NotificationTrigger::IncidentResolved => "incident_resolved",
        };
        f.write_str(s)
    }
}

impl FromStr for NotificationTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_failure" => Ok(NotificationTrigger::CheckFailure),
            "check_recovery" => Ok(NotificationTrigger::CheckRecovery),
            "incident_opened" => Ok(NotificationTrigger::IncidentOpened),
            "incident_resolved" => Ok(NotificationTrigger::IncidentResolved),
            other => Err(format!("unknown notification trigger '{other}'")),
        }
    }
}

/// Delivery state of a notification log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(IncidentStatus::Open),
            "acknowledged" => Ok(IncidentStatus::Acknowledged),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(format!("unknown incident status '{other}'")),
        }
    }
}

/// An organization-scoped monitoring target.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Site {
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
    pub url: String,
    pub is_active: bool,
}

/// A configured probe attached to a site.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckConfiguration {
    pub id: i32,
    pub site_id: i32,
    pub check_type: String,
    pub name: String,
    pub configuration: Value,
    pub interval_seconds: i32,
    pub is_enabled: bool,
}

/// Immutable record of one check execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: i32,
    pub check_configuration_id: i32,
    pub status: CheckStatus,
    pub response_time_ms: Option<i32>,
    pub error_message: Option<String>,
    pub result_data: Value,
    pub checked_at: DateTime<Utc>,
}

/// Fields of a check result before it has been persisted.
#[derive(Debug, Clone)]
pub struct NewCheckResult {
    pub check_configuration_id: i32,
    pub status: CheckStatus,
    pub response_time_ms: Option<i32>,
    pub error_message: Option<String>,
    pub result_data: Value,
    pub checked_at: DateTime<Utc>,
}

/// A span of continuous failure for one check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i32,
    pub check_configuration_id: i32,
    pub status: IncidentStatus,
    pub failure_count: i32,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// An organization-scoped delivery target (email, webhook, slack, discord).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationChannel {
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
    pub channel_type: String,
    pub configuration: Value,
    pub is_enabled: bool,
}

/// Binds a trigger condition plus filters to a delivery channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: i32,
    pub organization_id: i32,
    pub channel_id: i32,
    pub name: String,
    pub trigger: NotificationTrigger,
    /// None or empty means all sites.
    pub site_ids: Option<Vec<i32>>,
    /// None or empty means all check types.
    pub check_types: Option<Vec<String>>,
    pub consecutive_failures: i32,
    pub is_enabled: bool,
}

/// Append-only delivery audit row; status is updated in place as the
/// delivery completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: i32,
    pub rule_id: i32,
    pub check_result_id: Option<i32>,
    pub incident_id: Option<i32>,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotificationLog {
    pub rule_id: i32,
    pub check_result_id: Option<i32>,
    pub incident_id: Option<i32>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [CheckStatus::Success, CheckStatus::Failure, CheckStatus::Warning] {
            assert_eq!(status.to_string().parse::<CheckStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<CheckStatus>().is_err());
    }

    #[test]
    fn trigger_serializes_snake_case() {
        let json = serde_json::to_string(&NotificationTrigger::CheckFailure).unwrap();
        assert_eq!(json, "\"check_failure\"");
        assert_eq!(
            "incident_resolved".parse::<NotificationTrigger>().unwrap(),
            NotificationTrigger::IncidentResolved
        );
    }
}
