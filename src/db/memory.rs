//! In-memory `Store` implementation.
//!
//! Backs the test suite and lets the pipeline run without a database. Insert
//! order doubles as the total order the recovery and streak logic relies on.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::models::{
    CheckConfiguration, CheckResult, Incident, IncidentStatus, NewCheckResult,
    NewNotificationLog, NotificationChannel, NotificationLog, NotificationRule,
    NotificationStatus, NotificationTrigger, Site,
};
use super::store::{Store, StoreError};

#[derive(Default)]
struct Inner {
    next_id: i32,
    sites: Vec<Site>,
    configurations: Vec<CheckConfiguration>,
    results: Vec<CheckResult>,
    incidents: Vec<Incident>,
    channels: Vec<NotificationChannel>,
    rules: Vec<NotificationRule>,
    logs: Vec<NotificationLog>,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_site(&self, organization_id: i32, name: &str, url: &str, is_active: bool) -> Site {
        let mut inner = self.inner.lock().unwrap();
        let site = Site {
            id: inner.next_id(),
            organization_id,
            name: name.to_string(),
            url: url.to_string(),
            is_active,
        };
        inner.sites.push(site.clone());
        site
    }

    pub fn add_configuration(
        &self,
        site_id: i32,
        check_type: &str,
        name: &str,
        configuration: Value,
        interval_seconds: i32,
        is_enabled: bool,
    ) -> CheckConfiguration {
        let mut inner = self.inner.lock().unwrap();
        let config = CheckConfiguration {
            id: inner.next_id(),
            site_id,
            check_type: check_type.to_string(),
            name: name.to_string(),
            configuration,
            interval_seconds,
            is_enabled,
        };
        inner.configurations.push(config.clone());
        config
    }

    pub fn add_channel(
        &self,
        organization_id: i32,
        name: &str,
        channel_type: &str,
        configuration: Value,
        is_enabled: bool,
    ) -> NotificationChannel {
        let mut inner = self.inner.lock().unwrap();
        let channel = NotificationChannel {
            id: inner.next_id(),
            organization_id,
            name: name.to_string(),
            channel_type: channel_type.to_string(),
            configuration,
            is_enabled,
        };
        inner.channels.push(channel.clone());
        channel
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_rule(
        &self,
        organization_id: i32,
        channel_id: i32,
        name: &str,
        trigger: NotificationTrigger,
        site_ids: Option<Vec<i32>>,
        check_types: Option<Vec<String>>,
        consecutive_failures: i32,
        is_enabled: bool,
    ) -> NotificationRule {
        let mut inner = self.inner.lock().unwrap();
        let rule = NotificationRule {
            id: inner.next_id(),
            organization_id,
            channel_id,
            name: name.to_string(),
            trigger,
            site_ids,
            check_types,
            consecutive_failures,
            is_enabled,
        };
        inner.rules.push(rule.clone());
        rule
    }

    pub fn set_configuration_enabled(&self, id: i32, is_enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(config) = inner.configurations.iter_mut().find(|c| c.id == id) {
            config.is_enabled = is_enabled;
        }
    }

    /// Snapshot of all results, in insertion order.
    pub fn results(&self) -> Vec<CheckResult> {
        self.inner.lock().unwrap().results.clone()
    }

    /// Snapshot of all delivery log rows, in insertion order.
    pub fn logs(&self) -> Vec<NotificationLog> {
        self.inner.lock().unwrap().logs.clone()
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.inner.lock().unwrap().incidents.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_check_configuration(
        &self,
        id: i32,
    ) -> Result<Option<CheckConfiguration>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.configurations.iter().find(|c| c.id == id).cloned())
    }

    async fn list_enabled_configurations(&self) -> Result<Vec<CheckConfiguration>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .configurations
            .iter()
            .filter(|c| c.is_enabled)
            .cloned()
            .collect())
    }

    async fn get_site(&self, id: i32) -> Result<Option<Site>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sites.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_check_result(&self, new: NewCheckResult) -> Result<CheckResult, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let result = CheckResult {
            id: inner.next_id(),
            check_configuration_id: new.check_configuration_id,
            status: new.status,
            response_time_ms: new.response_time_ms,
            error_message: new.error_message,
            result_data: new.result_data,
            checked_at: new.checked_at,
        };
        inner.results.push(result.clone());
        Ok(result)
    }

    async fn list_recent_results(
        &self,
        check_configuration_id: i32,
        limit: i64,
    ) -> Result<Vec<CheckResult>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .results
            .iter()
            .rev()
            .filter(|r| r.check_configuration_id == check_configuration_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_result_before(
        &self,
        check_configuration_id: i32,
        result_id: i32,
    ) -> Result<Option<CheckResult>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .results
            .iter()
            .rev()
            .find(|r| r.check_configuration_id == check_configuration_id && r.id < result_id)
            .cloned())
    }

    async fn get_open_incident(
        &self,
        check_configuration_id: i32,
    ) -> Result<Option<Incident>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .incidents
            .iter()
            .find(|i| {
                i.check_configuration_id == check_configuration_id
                    && i.status != IncidentStatus::Resolved
            })
            .cloned())
    }

    async fn open_incident(
        &self,
        check_configuration_id: i32,
        started_at: DateTime<Utc>,
    ) -> Result<Incident, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let incident = Incident {
            id: inner.next_id(),
            check_configuration_id,
            status: IncidentStatus::Open,
            failure_count: 1,
            started_at,
            resolved_at: None,
        };
        inner.incidents.push(incident.clone());
        Ok(incident)
    }

    async fn record_incident_failure(&self, incident_id: i32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(incident) = inner.incidents.iter_mut().find(|i| i.id == incident_id) {
            incident.failure_count += 1;
        }
        Ok(())
    }

    async fn resolve_incident(
        &self,
        incident_id: i32,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(incident) = inner.incidents.iter_mut().find(|i| i.id == incident_id) {
            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(resolved_at);
        }
        Ok(())
    }

    async fn list_rules_for_trigger(
        &self,
        organization_id: i32,
        trigger: NotificationTrigger,
    ) -> Result<Vec<NotificationRule>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rules
            .iter()
            .filter(|r| {
                r.organization_id == organization_id && r.trigger == trigger && r.is_enabled
            })
            .cloned()
            .collect())
    }

    async fn get_notification_channel(
        &self,
        id: i32,
    ) -> Result<Option<NotificationChannel>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.channels.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_notification_log(
        &self,
        new: NewNotificationLog,
    ) -> Result<NotificationLog, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let log = NotificationLog {
            id: inner.next_id(),
            rule_id: new.rule_id,
            check_result_id: new.check_result_id,
            incident_id: new.incident_id,
            status: NotificationStatus::Pending,
            error_message: None,
            sent_at: new.sent_at,
        };
        inner.logs.push(log.clone());
        Ok(log)
    }

    async fn update_notification_log(
        &self,
        log_id: i32,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(log) = inner.logs.iter_mut().find(|l| l.id == log_id) {
            log.status = status;
            log.error_message = error_message;
        }
        Ok(())
    }
}
