//! Postgres-backed `Store` implementation.
//!
//! Statuses and triggers are stored as text columns; JSON payloads
//! (`configuration`, `result_data`, rule allow-lists) live in JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use super::models::{
    CheckConfiguration, CheckResult, Incident, IncidentStatus, NewCheckResult,
    NewNotificationLog, NotificationChannel, NotificationLog, NotificationRule,
    NotificationStatus, NotificationTrigger, Site,
};
use super::store::{Store, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CheckResultRow {
    id: i32,
    check_configuration_id: i32,
    status: String,
    response_time_ms: Option<i32>,
    error_message: Option<String>,
    result_data: Value,
    checked_at: DateTime<Utc>,
}

impl CheckResultRow {
    fn into_model(self) -> Result<CheckResult, StoreError> {
        Ok(CheckResult {
            id: self.id,
            check_configuration_id: self.check_configuration_id,
            status: self.status.parse().map_err(StoreError::Decode)?,
            response_time_ms: self.response_time_ms,
            error_message: self.error_message,
            result_data: self.result_data,
            checked_at: self.checked_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IncidentRow {
    id: i32,
    check_configuration_id: i32,
    status: String,
    failure_count: i32,
    started_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl IncidentRow {
    fn into_model(self) -> Result<Incident, StoreError> {
        Ok(Incident {
            id: self.id,
            check_configuration_id: self.check_configuration_id,
            status: self.status.parse().map_err(StoreError::Decode)?,
            failure_count: self.failure_count,
            started_at: self.started_at,
            resolved_at: self.resolved_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRuleRow {
    id: i32,
    organization_id: i32,
    channel_id: i32,
    name: String,
    trigger: String,
    site_ids: Option<Value>,
    check_types: Option<Value>,
    consecutive_failures: i32,
    is_enabled: bool,
}

impl NotificationRuleRow {
    fn into_model(self) -> Result<NotificationRule, StoreError> {
        let site_ids = match self.site_ids {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| StoreError::Decode(format!("rule site_ids: {e}")))?,
            ),
            None => None,
        };
        let check_types = match self.check_types {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| StoreError::Decode(format!("rule check_types: {e}")))?,
            ),
            None => None,
        };
        Ok(NotificationRule {
            id: self.id,
            organization_id: self.organization_id,
            channel_id: self.channel_id,
            name: self.name,
            trigger: self.trigger.parse().map_err(StoreError::Decode)?,
            site_ids,
            check_types,
            consecutive_failures: self.consecutive_failures,
            is_enabled: self.is_enabled,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationLogRow {
    id: i32,
    rule_id: i32,
    check_result_id: Option<i32>,
    incident_id: Option<i32>,
    status: String,
    error_message: Option<String>,
    sent_at: DateTime<Utc>,
}

impl NotificationLogRow {
    fn into_model(self) -> Result<NotificationLog, StoreError> {
        Ok(NotificationLog {
            id: self.id,
            rule_id: self.rule_id,
            check_result_id: self.check_result_id,
            incident_id: self.incident_id,
            status: self.status.parse().map_err(StoreError::Decode)?,
            error_message: self.error_message,
            sent_at: self.sent_at,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_check_configuration(
        &self,
        id: i32,
    ) -> Result<Option<CheckConfiguration>, StoreError> {
        let config = sqlx::query_as::<_, CheckConfiguration>(
            "SELECT id, site_id, check_type, name, configuration, interval_seconds, is_enabled \
             FROM check_configurations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(config)
    }

    async fn list_enabled_configurations(&self) -> Result<Vec<CheckConfiguration>, StoreError> {
        let configs = sqlx::query_as::<_, CheckConfiguration>(
            "SELECT id, site_id, check_type, name, configuration, interval_seconds, is_enabled \
             FROM check_configurations WHERE is_enabled ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(configs)
    }

    async fn get_site(&self, id: i32) -> Result<Option<Site>, StoreError> {
        let site = sqlx::query_as::<_, Site>(
            "SELECT id, organization_id, name, url, is_active FROM sites WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    async fn insert_check_result(&self, new: NewCheckResult) -> Result<CheckResult, StoreError> {
        let row = sqlx::query_as::<_, CheckResultRow>(
            "INSERT INTO check_results \
               (check_configuration_id, status, response_time_ms, error_message, result_data, checked_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, check_configuration_id, status, response_time_ms, error_message, result_data, checked_at",
        )
        .bind(new.check_configuration_id)
        .bind(new.status.to_string())
        .bind(new.response_time_ms)
        .bind(new.error_message)
        .bind(new.result_data)
        .bind(new.checked_at)
        .fetch_one(&self.pool)
        .await?;
        row.into_model()
    }

    async fn list_recent_results(
        &self,
        check_configuration_id: i32,
        limit: i64,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let rows = sqlx::query_as::<_, CheckResultRow>(
            "SELECT id, check_configuration_id, status, response_time_ms, error_message, result_data, checked_at \
             FROM check_results WHERE check_configuration_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(check_configuration_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CheckResultRow::into_model).collect()
    }

    async fn get_result_before(
        &self,
        check_configuration_id: i32,
        result_id: i32,
    ) -> Result<Option<CheckResult>, StoreError> {
        let row = sqlx::query_as::<_, CheckResultRow>(
            "SELECT id, check_configuration_id, status, response_time_ms, error_message, result_data, checked_at \
             FROM check_results WHERE check_configuration_id = $1 AND id < $2 \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(check_configuration_id)
        .bind(result_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CheckResultRow::into_model).transpose()
    }

    async fn get_open_incident(
        &self,
        check_configuration_id: i32,
    ) -> Result<Option<Incident>, StoreError> {
        let row = sqlx::query_as::<_, IncidentRow>(
            "SELECT id, check_configuration_id, status, failure_count, started_at, resolved_at \
             FROM incidents WHERE check_configuration_id = $1 AND status <> $2 \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(check_configuration_id)
        .bind(IncidentStatus::Resolved.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(IncidentRow::into_model).transpose()
    }

    async fn open_incident(
        &self,
        check_configuration_id: i32,
        started_at: DateTime<Utc>,
    ) -> Result<Incident, StoreError> {
        let row = sqlx::query_as::<_, IncidentRow>(
            "INSERT INTO incidents (check_configuration_id, status, failure_count, started_at) \
             VALUES ($1, $2, 1, $3) \
             RETURNING id, check_configuration_id, status, failure_count, started_at, resolved_at",
        )
        .bind(check_configuration_id)
        .bind(IncidentStatus::Open.to_string())
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        row.into_model()
    }

    async fn record_incident_failure(&self, incident_id: i32) -> Result<(), StoreError> {
        sqlx::query("UPDATE incidents SET failure_count = failure_count + 1 WHERE id = $1")
            .bind(incident_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_incident(
        &self,
        incident_id: i32,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE incidents SET status = $1, resolved_at = $2 WHERE id = $3")
            .bind(IncidentStatus::Resolved.to_string())
            .bind(resolved_at)
            .bind(incident_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_rules_for_trigger(
        &self,
        organization_id: i32,
        trigger: NotificationTrigger,
    ) -> Result<Vec<NotificationRule>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationRuleRow>(
            "SELECT id, organization_id, channel_id, name, trigger, site_ids, check_types, \
                    consecutive_failures, is_enabled \
             FROM notification_rules \
             WHERE organization_id = $1 AND trigger = $2 AND is_enabled ORDER BY id",
        )
        .bind(organization_id)
        .bind(trigger.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(NotificationRuleRow::into_model)
            .collect()
    }

    async fn get_notification_channel(
        &self,
        id: i32,
    ) -> Result<Option<NotificationChannel>, StoreError> {
        let channel = sqlx::query_as::<_, NotificationChannel>(
            "SELECT id, organization_id, name, channel_type, configuration, is_enabled \
             FROM notification_channels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(channel)
    }

    async fn insert_notification_log(
        &self,
        new: NewNotificationLog,
    ) -> Result<NotificationLog, StoreError> {
        let row = sqlx::query_as::<_, NotificationLogRow>(
            "INSERT INTO notification_logs (rule_id, check_result_id, incident_id, status, sent_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, rule_id, check_result_id, incident_id, status, error_message, sent_at",
        )
        .bind(new.rule_id)
        .bind(new.check_result_id)
        .bind(new.incident_id)
        .bind(NotificationStatus::Pending.to_string())
        .bind(new.sent_at)
        .fetch_one(&self.pool)
        .await?;
        row.into_model()
    }

    async fn update_notification_log(
        &self,
        log_id: i32,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE notification_logs SET status = $1, error_message = $2 WHERE id = $3")
            .bind(status.to_string())
            .bind(error_message)
            .bind(log_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
