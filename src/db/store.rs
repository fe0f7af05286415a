//! Read/write contract between the check pipeline and the persistence layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::{
    CheckConfiguration, CheckResult, Incident, NewCheckResult, NewNotificationLog,
    NotificationChannel, NotificationLog, NotificationRule, NotificationStatus,
    NotificationTrigger, Site,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored value: {0}")]
    Decode(String),
}

/// Storage operations the executor, rule engine, and scheduler depend on.
///
/// Results for a given configuration are totally ordered by insertion; both
/// `list_recent_results` and `get_result_before` observe that order. Every
/// implementation must uphold it, since recovery detection and
/// consecutive-failure counting are defined in terms of it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_check_configuration(
        &self,
        id: i32,
    ) -> Result<Option<CheckConfiguration>, StoreError>;

    /// All enabled configurations, used by the scheduler resync pass.
    async fn list_enabled_configurations(&self) -> Result<Vec<CheckConfiguration>, StoreError>;

    async fn get_site(&self, id: i32) -> Result<Option<Site>, StoreError>;

    async fn insert_check_result(&self, new: NewCheckResult) -> Result<CheckResult, StoreError>;

    /// Most recent results for a configuration, newest first.
    async fn list_recent_results(
        &self,
        check_configuration_id: i32,
        limit: i64,
    ) -> Result<Vec<CheckResult>, StoreError>;

    /// The result immediately preceding `result_id` for the same configuration.
    async fn get_result_before(
        &self,
        check_configuration_id: i32,
        result_id: i32,
    ) -> Result<Option<CheckResult>, StoreError>;

    /// The currently open (or acknowledged) incident for a configuration.
    async fn get_open_incident(
        &self,
        check_configuration_id: i32,
    ) -> Result<Option<Incident>, StoreError>;

    async fn open_incident(
        &self,
        check_configuration_id: i32,
        started_at: DateTime<Utc>,
    ) -> Result<Incident, StoreError>;

    async fn record_incident_failure(&self, incident_id: i32) -> Result<(), StoreError>;

    async fn resolve_incident(
        &self,
        incident_id: i32,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Enabled rules for an organization matching the given trigger.
    async fn list_rules_for_trigger(
        &self,
        organization_id: i32,
        trigger: NotificationTrigger,
    ) -> Result<Vec<NotificationRule>, StoreError>;

    async fn get_notification_channel(
        &self,
        id: i32,
    ) -> Result<Option<NotificationChannel>, StoreError>;

    async fn insert_notification_log(
        &self,
        new: NewNotificationLog,
    ) -> Result<NotificationLog, StoreError>;

    async fn update_notification_log(
        &self,
        log_id: i32,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError>;
}
