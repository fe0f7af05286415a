//! Turns check results into incident transitions and notification
//! deliveries.
//!
//! Trigger derivation: a failure raises `check_failure` (and
//! `incident_opened` when it starts a new failure episode); a success raises
//! `check_recovery` when the immediately preceding result was a failure, and
//! `incident_resolved` when it closes an open episode. Warnings never
//! trigger rule evaluation and leave incident state untouched.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::models::{
    CheckConfiguration, CheckResult, CheckStatus, NewNotificationLog, NotificationChannel,
    NotificationRule, NotificationStatus, NotificationTrigger, Site,
};
use crate::db::store::{Store, StoreError};
use crate::notifications::channels::ChannelRegistry;
use crate::notifications::payload::NotificationPayload;

// Streak scans are bounded; a failure streak longer than this matches every
// threshold anyway.
const STREAK_SCAN_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

pub struct NotificationEngine {
    store: Arc<dyn Store>,
    channels: Arc<ChannelRegistry>,
}

impl NotificationEngine {
    pub fn new(store: Arc<dyn Store>, channels: Arc<ChannelRegistry>) -> Self {
        Self { store, channels }
    }

    pub async fn handle_check_result(
        &self,
        config: &CheckConfiguration,
        result: &CheckResult,
        site: &Site,
    ) -> Result<(), EngineError> {
        let mut triggers: Vec<NotificationTrigger> = Vec::new();
        let mut incident_id: Option<i32> = None;

        match result.status {
            CheckStatus::Failure => {
                triggers.push(NotificationTrigger::CheckFailure);
                match self.store.get_open_incident(config.id).await? {
                    Some(incident) => {
                        self.store.record_incident_failure(incident.id).await?;
                        incident_id = Some(incident.id);
                    }
                    None => {
                        let incident = self
                            .store
                            .open_incident(config.id, result.checked_at)
                            .await?;
                        info!(
                            check_id = config.id,
                            incident_id = incident.id,
                            "opened incident"
                        );
                        incident_id = Some(incident.id);
                        triggers.push(NotificationTrigger::IncidentOpened);
                    }
                }
            }
            CheckStatus::Success => {
                if self.is_recovery(config.id, result.id).await? {
                    triggers.push(NotificationTrigger::CheckRecovery);
                }
                if let Some(incident) = self.store.get_open_incident(config.id).await? {
                    self.store
                        .resolve_incident(incident.id, result.checked_at)
                        .await?;
                    info!(
                        check_id = config.id,
                        incident_id = incident.id,
                        "resolved incident"
                    );
                    incident_id = Some(incident.id);
                    triggers.push(NotificationTrigger::IncidentResolved);
                }
            }
            // Whether warnings should ever notify is an open design
            // question; they are deliberately inert here.
            CheckStatus::Warning => return Ok(()),
        }

        for trigger in triggers {
            self.evaluate_trigger(trigger, config, result, site, incident_id)
                .await?;
        }
        Ok(())
    }

    /// A success is a recovery only when the immediately preceding result
    /// for the same configuration was a failure.
    async fn is_recovery(&self, config_id: i32, result_id: i32) -> Result<bool, EngineError> {
        let previous = self.store.get_result_before(config_id, result_id).await?;
        Ok(matches!(previous, Some(prev) if prev.status == CheckStatus::Failure))
    }

    /// Current consecutive-failure streak, scanning newest-first until the
    /// first non-failure result.
    async fn consecutive_failures(&self, config_id: i32) -> Result<i32, EngineError> {
        let results = self
            .store
            .list_recent_results(config_id, STREAK_SCAN_LIMIT)
            .await?;
        let mut count = 0;
        for result in results {
            if result.status == CheckStatus::Failure {
                count += 1;
            } else {
                break;
            }
        }
        Ok(count)
    }

    async fn evaluate_trigger(
        &self,
        trigger: NotificationTrigger,
        config: &CheckConfiguration,
        result: &CheckResult,
        site: &Site,
        incident_id: Option<i32>,
    ) -> Result<(), EngineError> {
        let rules = self
            .store
            .list_rules_for_trigger(site.organization_id, trigger)
            .await?;
        if rules.is_empty() {
            return Ok(());
        }

        let payload =
            NotificationPayload::from_result(trigger, site, config, result, incident_id);

        let mut streak: Option<i32> = None;
        for rule in rules {
            let channel = match self.store.get_notification_channel(rule.channel_id).await? {
                Some(channel) if channel.is_enabled => channel,
                Some(_) | None => continue,
            };
            // Rule lookup is organization-scoped; a channel from another
            // organization is a broken reference, not a delivery target.
            if channel.organization_id != site.organization_id {
                warn!(
                    rule_id = rule.id,
                    channel_id = channel.id,
                    "rule references channel in another organization, skipping"
                );
                continue;
            }

            if let Some(site_ids) = &rule.site_ids {
                if !site_ids.is_empty() && !site_ids.contains(&site.id) {
                    continue;
                }
            }
            if let Some(check_types) = &rule.check_types {
                if !check_types.is_empty() && !check_types.contains(&config.check_type) {
                    continue;
                }
            }

            if trigger == NotificationTrigger::CheckFailure && rule.consecutive_failures > 1 {
                let current = match streak {
                    Some(current) => current,
                    None => {
                        let computed = self.consecutive_failures(config.id).await?;
                        streak = Some(computed);
                        computed
                    }
                };
                if current < rule.consecutive_failures {
                    continue;
                }
            }

            self.dispatch(&rule, &channel, &payload, result.id, incident_id)
                .await?;
        }
        Ok(())
    }

    /// Delivers one notification for one matching rule. Delivery failures
    /// are recorded in the log and never propagate to sibling rules.
    async fn dispatch(
        &self,
        rule: &NotificationRule,
        channel: &NotificationChannel,
        payload: &NotificationPayload,
        check_result_id: i32,
        incident_id: Option<i32>,
    ) -> Result<(), EngineError> {
        let log = self
            .store
            .insert_notification_log(NewNotificationLog {
                rule_id: rule.id,
                check_result_id: Some(check_result_id),
                incident_id,
                sent_at: Utc::now(),
            })
            .await?;

        let delivery = match self.channels.get(&channel.channel_type) {
            Ok(sender) => sender.send(&channel.configuration, payload).await,
            Err(e) => Err(crate::notifications::channels::SenderError::InvalidConfiguration(
                e.to_string(),
            )),
        };

        match delivery {
            Ok(()) => {
                info!(
                    rule = %rule.name,
                    channel_type = %channel.channel_type,
                    "notification sent"
                );
                self.store
                    .update_notification_log(log.id, NotificationStatus::Sent, None)
                    .await?;
            }
            Err(e) => {
                error!(rule = %rule.name, error = %e, "failed to send notification");
                self.store
                    .update_notification_log(log.id, NotificationStatus::Failed, Some(e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }
}
