//! Channel-agnostic notification payload.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{
    CheckConfiguration, CheckResult, CheckStatus, NotificationTrigger, Site,
};

/// What every delivery channel receives for a triggered rule.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub trigger: NotificationTrigger,
    pub site_name: String,
    pub site_url: String,
    pub check_name: String,
    pub check_type: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i32>,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<i32>,
}

impl NotificationPayload {
    pub fn from_result(
        trigger: NotificationTrigger,
        site: &Site,
        config: &CheckConfiguration,
        result: &CheckResult,
        incident_id: Option<i32>,
    ) -> Self {
        Self {
            trigger,
            site_name: site.name.clone(),
            site_url: site.url.clone(),
            check_name: config.name.clone(),
            check_type: config.check_type.clone(),
            status: result.status,
            error_message: result.error_message.clone(),
            response_time_ms: result.response_time_ms,
            checked_at: result.checked_at,
            incident_id,
        }
    }

    /// Short label for subject lines and message titles.
    pub fn trigger_label(&self) -> &'static str {
        match self.trigger {
            NotificationTrigger::CheckFailure => "ALERT",
            NotificationTrigger::CheckRecovery => "RECOVERED",
            NotificationTrigger::IncidentOpened => "INCIDENT",
            NotificationTrigger::IncidentResolved => "RESOLVED",
        }
    }
}
