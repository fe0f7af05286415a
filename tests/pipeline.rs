//! End-to-end pipeline tests over the in-memory store: executor guarantees,
//! trigger derivation, rule matching, delivery accounting, incident
//! lifecycle, and scheduler single-flight behavior.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use sitewatch::checks::{Check, CheckOutcome, CheckRegistry};
use sitewatch::db::models::{
    CheckStatus, IncidentStatus, NotificationStatus, NotificationTrigger,
};
use sitewatch::db::{MemoryStore, Store};
use sitewatch::events::{org_channel, EventBus};
use sitewatch::executor::CheckExecutor;
use sitewatch::notifications::channels::ChannelRegistry;
use sitewatch::notifications::{NotificationEngine, NotificationPayload, NotificationSender, SenderError};
use sitewatch::scheduler::CheckScheduler;

/// Check plugin that plays back a scripted sequence of statuses.
struct ScriptedCheck {
    script: Mutex<VecDeque<CheckStatus>>,
}

impl ScriptedCheck {
    fn new(statuses: &[CheckStatus]) -> Self {
        Self {
            script: Mutex::new(statuses.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl Check for ScriptedCheck {
    fn check_type(&self) -> &'static str {
        "scripted"
    }
    fn display_name(&self) -> &'static str {
        "Scripted Check"
    }
    fn description(&self) -> &'static str {
        "Plays back a fixed status sequence"
    }
    fn config_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _target: &str, _config: &Value) -> CheckOutcome {
        let status = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CheckStatus::Success);
        match status {
            CheckStatus::Success => CheckOutcome::success(Some(5), json!({})),
            CheckStatus::Warning => CheckOutcome::warning(Some(5), "soft breach", json!({})),
            CheckStatus::Failure => CheckOutcome::failure(Some(5), "probe failed", json!({})),
        }
    }
}

struct PanickingCheck;

#[async_trait]
impl Check for PanickingCheck {
    fn check_type(&self) -> &'static str {
        "panicking"
    }
    fn display_name(&self) -> &'static str {
        "Panicking Check"
    }
    fn description(&self) -> &'static str {
        "Panics on every execution"
    }
    fn config_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _target: &str, _config: &Value) -> CheckOutcome {
        panic!("plugin bug");
    }
}

struct SlowCheck;

#[async_trait]
impl Check for SlowCheck {
    fn check_type(&self) -> &'static str {
        "slow"
    }
    fn display_name(&self) -> &'static str {
        "Slow Check"
    }
    fn description(&self) -> &'static str {
        "Takes a while"
    }
    fn config_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _target: &str, _config: &Value) -> CheckOutcome {
        tokio::time::sleep(Duration::from_millis(300)).await;
        CheckOutcome::success(Some(300), json!({}))
    }
}

/// Channel plugin that records every payload it is asked to deliver.
struct RecordingChannel {
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
    fail: bool,
}

#[async_trait]
impl NotificationSender for RecordingChannel {
    fn channel_type(&self) -> &'static str {
        if self.fail {
            "failing"
        } else {
            "recording"
        }
    }
    fn display_name(&self) -> &'static str {
        "Recording Channel"
    }
    fn config_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn send(
        &self,
        _config: &Value,
        payload: &NotificationPayload,
    ) -> Result<(), SenderError> {
        if self.fail {
            return Err(SenderError::SendFailed("delivery exploded".to_string()));
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn test_connection(&self, _config: &Value) -> Result<(), SenderError> {
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    executor: Arc<CheckExecutor>,
    events: Arc<EventBus>,
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
}

fn harness(plugins: Vec<Arc<dyn Check>>) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();
    let store = Arc::new(MemoryStore::new());
    let sent = Arc::new(Mutex::new(Vec::new()));

    let mut check_registry = CheckRegistry::new();
    for plugin in plugins {
        check_registry.register(plugin).unwrap();
    }

    let mut channel_registry = ChannelRegistry::new();
    channel_registry
        .register(Arc::new(RecordingChannel {
            sent: sent.clone(),
            fail: false,
        }))
        .unwrap();
    channel_registry
        .register(Arc::new(RecordingChannel {
            sent: sent.clone(),
            fail: true,
        }))
        .unwrap();

    let dyn_store: Arc<dyn Store> = store.clone();
    let events = Arc::new(EventBus::new());
    let engine = Arc::new(NotificationEngine::new(
        dyn_store.clone(),
        Arc::new(channel_registry),
    ));
    let executor = Arc::new(CheckExecutor::new(
        dyn_store,
        Arc::new(check_registry),
        events.clone(),
        engine,
    ));

    Harness {
        store,
        executor,
        events,
        sent,
    }
}

fn sent_triggers(harness: &Harness) -> Vec<NotificationTrigger> {
    harness.sent.lock().unwrap().iter().map(|p| p.trigger).collect()
}

#[tokio::test]
async fn every_execution_writes_exactly_one_result_row() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[
        CheckStatus::Success,
        CheckStatus::Failure,
    ]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);

    h.executor.execute_check(config.id).await.unwrap();
    h.executor.execute_check(config.id).await.unwrap();

    let results = h.store.results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, CheckStatus::Success);
    assert_eq!(results[1].status, CheckStatus::Failure);
}

#[tokio::test]
async fn panicking_plugin_still_produces_a_failure_row() {
    let h = harness(vec![Arc::new(PanickingCheck)]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "panicking", "probe", json!({}), 60, true);

    h.executor.execute_check(config.id).await.unwrap();

    let results = h.store.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CheckStatus::Failure);
    assert!(results[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("Check execution error"));
}

#[tokio::test]
async fn disabled_configuration_and_inactive_site_are_noops() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[CheckStatus::Success]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let disabled = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, false);
    h.executor.execute_check(disabled.id).await.unwrap();
    h.executor.execute_check(9999).await.unwrap();

    let dark_site = h.store.add_site(1, "dark", "https://dark.example.com", false);
    let config = h
        .store
        .add_configuration(dark_site.id, "scripted", "probe", json!({}), 60, true);
    h.executor.execute_check(config.id).await.unwrap();

    assert!(h.store.results().is_empty());
}

#[tokio::test]
async fn unknown_check_type_aborts_without_a_result_row() {
    let h = harness(vec![]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "gopher", "probe", json!({}), 60, true);
    h.executor.execute_check(config.id).await.unwrap();
    assert!(h.store.results().is_empty());
}

#[tokio::test]
async fn failure_then_success_raises_recovery() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[
        CheckStatus::Failure,
        CheckStatus::Success,
        CheckStatus::Success,
    ]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);
    let channel = h
        .store
        .add_channel(1, "ops", "recording", json!({}), true);
    h.store.add_rule(
        1,
        channel.id,
        "on failure",
        NotificationTrigger::CheckFailure,
        None,
        None,
        1,
        true,
    );
    h.store.add_rule(
        1,
        channel.id,
        "on recovery",
        NotificationTrigger::CheckRecovery,
        None,
        None,
        1,
        true,
    );

    h.executor.execute_check(config.id).await.unwrap();
    h.executor.execute_check(config.id).await.unwrap();
    // A success following a success is routine and must not notify.
    h.executor.execute_check(config.id).await.unwrap();

    assert_eq!(
        sent_triggers(&h),
        vec![
            NotificationTrigger::CheckFailure,
            NotificationTrigger::CheckRecovery
        ]
    );
}

#[tokio::test]
async fn consecutive_failure_threshold_gates_delivery() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[
        CheckStatus::Failure,
        CheckStatus::Failure,
        CheckStatus::Failure,
        CheckStatus::Failure,
    ]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);
    let channel = h
        .store
        .add_channel(1, "ops", "recording", json!({}), true);
    h.store.add_rule(
        1,
        channel.id,
        "three strikes",
        NotificationTrigger::CheckFailure,
        None,
        None,
        3,
        true,
    );

    for _ in 0..4 {
        h.executor.execute_check(config.id).await.unwrap();
    }

    // Fires on the 3rd and 4th consecutive failures, not the 1st or 2nd.
    assert_eq!(h.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn warnings_never_trigger_rules() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[
        CheckStatus::Warning,
        CheckStatus::Warning,
    ]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);
    let channel = h
        .store
        .add_channel(1, "ops", "recording", json!({}), true);
    for trigger in [
        NotificationTrigger::CheckFailure,
        NotificationTrigger::CheckRecovery,
    ] {
        h.store
            .add_rule(1, channel.id, "any", trigger, None, None, 1, true);
    }

    h.executor.execute_check(config.id).await.unwrap();
    h.executor.execute_check(config.id).await.unwrap();

    assert!(h.sent.lock().unwrap().is_empty());
    assert!(h.store.incidents().is_empty());
}

#[tokio::test]
async fn failed_delivery_is_logged_and_does_not_block_siblings() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[CheckStatus::Failure]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);
    let bad = h.store.add_channel(1, "bad", "failing", json!({}), true);
    let good = h.store.add_channel(1, "good", "recording", json!({}), true);
    h.store.add_rule(
        1,
        bad.id,
        "broken first",
        NotificationTrigger::CheckFailure,
        None,
        None,
        1,
        true,
    );
    h.store.add_rule(
        1,
        good.id,
        "working second",
        NotificationTrigger::CheckFailure,
        None,
        None,
        1,
        true,
    );

    h.executor.execute_check(config.id).await.unwrap();

    let logs = h.store.logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, NotificationStatus::Failed);
    assert!(logs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("delivery exploded"));
    assert_eq!(logs[1].status, NotificationStatus::Sent);
    assert_eq!(h.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rule_filters_scope_sites_and_check_types() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[
        CheckStatus::Failure,
        CheckStatus::Failure,
    ]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let other_site = h.store.add_site(1, "other", "https://other.example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);
    let other_config = h
        .store
        .add_configuration(other_site.id, "scripted", "probe", json!({}), 60, true);
    let channel = h
        .store
        .add_channel(1, "ops", "recording", json!({}), true);
    // Only fires for `site` and only for the ping check type mismatch test
    // below uses check_types.
    h.store.add_rule(
        1,
        channel.id,
        "scoped to site",
        NotificationTrigger::CheckFailure,
        Some(vec![site.id]),
        None,
        1,
        true,
    );
    h.store.add_rule(
        1,
        channel.id,
        "scoped to ping",
        NotificationTrigger::CheckFailure,
        None,
        Some(vec!["ping".to_string()]),
        1,
        true,
    );

    h.executor.execute_check(config.id).await.unwrap();
    h.executor.execute_check(other_config.id).await.unwrap();

    // Site-scoped rule fired once (for `site`); type-scoped rule never did.
    let payloads = h.sent.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].site_name, "example");
}

#[tokio::test]
async fn disabled_rules_and_channels_are_skipped() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[CheckStatus::Failure]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);
    let dead_channel = h.store.add_channel(1, "dead", "recording", json!({}), false);
    let live_channel = h.store.add_channel(1, "live", "recording", json!({}), true);
    h.store.add_rule(
        1,
        dead_channel.id,
        "channel disabled",
        NotificationTrigger::CheckFailure,
        None,
        None,
        1,
        true,
    );
    h.store.add_rule(
        1,
        live_channel.id,
        "rule disabled",
        NotificationTrigger::CheckFailure,
        None,
        None,
        1,
        false,
    );

    h.executor.execute_check(config.id).await.unwrap();

    assert!(h.sent.lock().unwrap().is_empty());
    assert!(h.store.logs().is_empty());
}

#[tokio::test]
async fn incident_lifecycle_tracks_failure_episodes() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[
        CheckStatus::Failure,
        CheckStatus::Failure,
        CheckStatus::Success,
    ]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);
    let channel = h
        .store
        .add_channel(1, "ops", "recording", json!({}), true);
    h.store.add_rule(
        1,
        channel.id,
        "incident opened",
        NotificationTrigger::IncidentOpened,
        None,
        None,
        1,
        true,
    );
    h.store.add_rule(
        1,
        channel.id,
        "incident resolved",
        NotificationTrigger::IncidentResolved,
        None,
        None,
        1,
        true,
    );

    for _ in 0..3 {
        h.executor.execute_check(config.id).await.unwrap();
    }

    let incidents = h.store.incidents();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].status, IncidentStatus::Resolved);
    assert_eq!(incidents[0].failure_count, 2);
    assert!(incidents[0].resolved_at.is_some());

    let triggers = sent_triggers(&h);
    assert_eq!(
        triggers,
        vec![
            NotificationTrigger::IncidentOpened,
            NotificationTrigger::IncidentResolved
        ]
    );
    let payloads = h.sent.lock().unwrap();
    assert_eq!(payloads[0].incident_id, Some(incidents[0].id));
}

#[tokio::test]
async fn executions_publish_live_events() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[CheckStatus::Failure]))]);
    let site = h.store.add_site(42, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 60, true);

    let mut rx = h.events.subscribe(&org_channel(42));
    h.executor.execute_check(config.id).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, "check_result");
    assert_eq!(event.check_id, config.id);
    assert_eq!(event.status, CheckStatus::Failure);
    assert_eq!(event.site_name, "example");
}

#[tokio::test]
async fn overlapping_runs_for_one_check_are_suppressed() {
    let h = harness(vec![Arc::new(SlowCheck)]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "slow", "probe", json!({}), 60, true);
    let scheduler = CheckScheduler::new(h.executor.clone());

    let (first, second) = tokio::join!(
        scheduler.run_once(config.id),
        scheduler.run_once(config.id)
    );

    assert!(first != second, "exactly one of the runs must be skipped");
    assert_eq!(h.store.results().len(), 1);

    // Independent configurations are not serialized against each other.
    let other = h
        .store
        .add_configuration(site.id, "slow", "probe-2", json!({}), 60, true);
    let (a, b) = tokio::join!(scheduler.run_once(config.id), scheduler.run_once(other.id));
    assert!(a && b);
}

#[tokio::test]
async fn resync_schedules_enabled_configurations_and_drops_stale_jobs() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let enabled = h
        .store
        .add_configuration(site.id, "scripted", "on", json!({}), 300, true);
    let disabled = h
        .store
        .add_configuration(site.id, "scripted", "off", json!({}), 300, false);

    let scheduler = CheckScheduler::new(h.executor.clone());
    let scheduled = scheduler.resync(h.store.as_ref()).await.unwrap();
    assert_eq!(scheduled, 1);
    assert!(scheduler.is_scheduled(enabled.id));
    assert!(!scheduler.is_scheduled(disabled.id));
    assert_eq!(scheduler.interval_of(enabled.id), Some(300));

    // Disabling the configuration removes its job on the next resync.
    h.store.set_configuration_enabled(enabled.id, false);
    let scheduled = scheduler.resync(h.store.as_ref()).await.unwrap();
    assert_eq!(scheduled, 0);
    assert!(!scheduler.is_scheduled(enabled.id));

    scheduler.shutdown();
}

#[tokio::test]
async fn pause_and_resume_toggle_without_losing_the_job() {
    let h = harness(vec![Arc::new(ScriptedCheck::new(&[]))]);
    let site = h.store.add_site(1, "example", "https://example.com", true);
    let config = h
        .store
        .add_configuration(site.id, "scripted", "probe", json!({}), 600, true);

    let scheduler = CheckScheduler::new(h.executor.clone());
    scheduler.schedule(config.id, 600);
    scheduler.pause(config.id);
    assert!(scheduler.is_scheduled(config.id));
    scheduler.resume(config.id);
    assert!(scheduler.is_scheduled(config.id));
    scheduler.unschedule(config.id);
    assert!(!scheduler.is_scheduled(config.id));
}
