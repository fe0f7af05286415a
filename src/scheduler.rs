//! Interval scheduling for check executions.
//!
//! Each scheduled configuration owns one tokio task ticking at its interval.
//! A per-configuration single-flight guard enforces the central concurrency
//! invariant: at most one in-flight execution per check identifier — a tick
//! (or manual run) that finds the previous execution still running skips
//! instead of overlapping it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::store::{Store, StoreError};
use crate::executor::CheckExecutor;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

struct Job {
    handle: JoinHandle<()>,
    interval_seconds: u64,
    paused: Arc<AtomicBool>,
}

pub struct CheckScheduler {
    executor: Arc<CheckExecutor>,
    jobs: DashMap<i32, Job>,
    in_flight: Arc<DashMap<i32, Arc<Mutex<()>>>>,
}

impl CheckScheduler {
    pub fn new(executor: Arc<CheckExecutor>) -> Self {
        Self {
            executor,
            jobs: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Starts (or replaces) the interval job for a configuration.
    pub fn schedule(&self, check_id: i32, interval_seconds: u64) {
        let interval_seconds = interval_seconds.max(1);
        self.unschedule(check_id);

        let paused = Arc::new(AtomicBool::new(false));
        let executor = self.executor.clone();
        let in_flight = self.in_flight.clone();
        let paused_flag = paused.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the job waits a full
            // interval before its first execution.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if paused_flag.load(Ordering::Relaxed) {
                    continue;
                }
                run_guarded(&executor, &in_flight, check_id).await;
            }
        });

        self.jobs.insert(
            check_id,
            Job {
                handle,
                interval_seconds,
                paused,
            },
        );
        info!(check_id, interval_seconds, "scheduled check");
    }

    pub fn unschedule(&self, check_id: i32) {
        if let Some((_, job)) = self.jobs.remove(&check_id) {
            job.handle.abort();
            info!(check_id, "unscheduled check");
        }
    }

    pub fn pause(&self, check_id: i32) {
        if let Some(job) = self.jobs.get(&check_id) {
            job.paused.store(true, Ordering::Relaxed);
            info!(check_id, "paused check");
        }
    }

    pub fn resume(&self, check_id: i32) {
        if let Some(job) = self.jobs.get(&check_id) {
            job.paused.store(false, Ordering::Relaxed);
            info!(check_id, "resumed check");
        }
    }

    pub fn is_scheduled(&self, check_id: i32) -> bool {
        self.jobs.contains_key(&check_id)
    }

    pub fn interval_of(&self, check_id: i32) -> Option<u64> {
        self.jobs.get(&check_id).map(|job| job.interval_seconds)
    }

    /// Fires one execution now, subject to the same single-flight guard as
    /// scheduled ticks. Returns false when a run was already in flight.
    pub async fn run_once(&self, check_id: i32) -> bool {
        run_guarded(&self.executor, &self.in_flight, check_id).await
    }

    /// Re-registers every enabled configuration; schedule definitions live
    /// in the configuration store, so this restores all jobs after a process
    /// restart and drops jobs whose configuration disappeared.
    pub async fn resync(&self, store: &dyn Store) -> Result<usize, SchedulerError> {
        let configs = store.list_enabled_configurations().await?;
        let desired: std::collections::HashSet<i32> = configs.iter().map(|c| c.id).collect();

        let stale: Vec<i32> = self
            .jobs
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| !desired.contains(id))
            .collect();
        for check_id in stale {
            self.unschedule(check_id);
        }

        let mut scheduled = 0;
        for config in configs {
            self.schedule(config.id, config.interval_seconds.max(1) as u64);
            scheduled += 1;
        }
        info!(scheduled, "synced check schedules");
        Ok(scheduled)
    }

    /// Aborts every job. Used at shutdown.
    pub fn shutdown(&self) {
        let ids: Vec<i32> = self.jobs.iter().map(|entry| *entry.key()).collect();
        for check_id in ids {
            self.unschedule(check_id);
        }
    }
}

impl Drop for CheckScheduler {
    fn drop(&mut self) {
        for entry in self.jobs.iter() {
            entry.value().handle.abort();
        }
    }
}

async fn run_guarded(
    executor: &Arc<CheckExecutor>,
    in_flight: &Arc<DashMap<i32, Arc<Mutex<()>>>>,
    check_id: i32,
) -> bool {
    let guard = in_flight
        .entry(check_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let result = match guard.try_lock() {
        Ok(_held) => {
            if let Err(e) = executor.execute_check(check_id).await {
                error!(check_id, error = %e, "check execution failed");
            }
            true
        }
        Err(_) => {
            warn!(check_id, "previous execution still in flight, skipping");
            false
        }
    };
    result
}
