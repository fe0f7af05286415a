//! Check executor: loads a configuration, runs its plugin, persists the
//! result, and fans out downstream effects.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::checks::{Check, CheckOutcome, CheckRegistry};
use crate::db::models::NewCheckResult;
use crate::db::store::{Store, StoreError};
use crate::events::{org_channel, CheckEvent, EventBus};
use crate::notifications::engine::NotificationEngine;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

pub struct CheckExecutor {
    store: Arc<dyn Store>,
    registry: Arc<CheckRegistry>,
    events: Arc<EventBus>,
    engine: Arc<NotificationEngine>,
}

impl CheckExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<CheckRegistry>,
        events: Arc<EventBus>,
        engine: Arc<NotificationEngine>,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            engine,
        }
    }

    /// Runs one check execution end to end. A missing or disabled
    /// configuration, or a missing or inactive site, is a benign race with
    /// CRUD and a no-op. Once the plugin is invoked, exactly one result row
    /// is written, whatever the plugin does.
    pub async fn execute_check(&self, check_id: i32) -> Result<(), ExecutorError> {
        let config = match self.store.get_check_configuration(check_id).await? {
            Some(config) if config.is_enabled => config,
            Some(_) => {
                debug!(check_id, "check is disabled, skipping");
                return Ok(());
            }
            None => {
                debug!(check_id, "check configuration not found, skipping");
                return Ok(());
            }
        };

        let site = match self.store.get_site(config.site_id).await? {
            Some(site) if site.is_active => site,
            Some(_) => {
                debug!(check_id, site_id = config.site_id, "site inactive, skipping");
                return Ok(());
            }
            None => {
                warn!(check_id, site_id = config.site_id, "site not found, skipping");
                return Ok(());
            }
        };

        // An unregistered type at execution time is a configuration
        // integrity failure: abort this execution only.
        let plugin = match self.registry.get(&config.check_type) {
            Ok(plugin) => plugin,
            Err(e) => {
                error!(check_id, error = %e, "cannot execute check");
                return Ok(());
            }
        };

        debug!(check_id, check_type = %config.check_type, url = %site.url, "executing check");

        // Plugins promise to never fail across their boundary, but the
        // execution record must survive a buggy one, so the invocation runs
        // in its own task and a panic degrades to a synthetic failure.
        let target = site.url.clone();
        let plugin_config = config.configuration.clone();
        let outcome = match tokio::spawn(async move {
            plugin.execute(&target, &plugin_config).await
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(join_error) => CheckOutcome::failure(
                None,
                format!("Check execution error: {join_error}"),
                json!({ "error_type": "execution" }),
            ),
        };

        let result = self
            .store
            .insert_check_result(NewCheckResult {
                check_configuration_id: config.id,
                status: outcome.status,
                response_time_ms: outcome.response_time_ms,
                error_message: outcome.error_message,
                result_data: outcome.result_data,
                checked_at: Utc::now(),
            })
            .await?;

        info!(
            check_id,
            status = %result.status,
            response_time_ms = result.response_time_ms,
            "check completed"
        );

        // Live-stream fan-out is fire and forget.
        self.events.publish(
            &org_channel(site.organization_id),
            CheckEvent {
                kind: "check_result",
                check_id,
                site_id: site.id,
                site_name: site.name.clone(),
                check_name: config.name.clone(),
                status: result.status,
                response_time_ms: result.response_time_ms,
                checked_at: result.checked_at,
                error_message: result.error_message.clone(),
            },
        );

        // Notification handling must not fail the execution or touch the
        // already-committed result.
        if let Err(e) = self
            .engine
            .handle_check_result(&config, &result, &site)
            .await
        {
            error!(check_id, error = %e, "error handling notifications");
        }

        Ok(())
    }
}
