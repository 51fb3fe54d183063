//! Cron-driven scheduler with distributed leasing.
//!
//! A single ticker loop wakes every `tick_interval`, sweeps expired leases,
//! finds due checks, and dispatches one worker task per check it manages to
//! lease. The lease guarantees at most one scheduled execution per check
//! across all replicas; a semaphore bounds concurrency within this replica.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sysinfo::System;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::db::checks::CheckStore;
use crate::db::leases::LeaseStore;
use crate::executor::Executor;
use crate::schedule;
use crate::shutdown::ShutdownController;
use crate::types::check::CheckConfig;

/// Replica identity used for lease ownership: the hostname, or a generated
/// id when the hostname is unavailable.
pub fn replica_identity() -> String {
    match System::host_name() {
        Some(hostname) if !hostname.is_empty() => hostname,
        _ => {
            let fallback = Uuid::new_v4().to_string();
            warn!(replica_id = %fallback, "Hostname unavailable, using generated replica id");
            fallback
        }
    }
}

/// The scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    executor: Arc<Executor>,
    leases: LeaseStore,
    checks: Arc<CheckStore>,
    replica_id: String,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: ShutdownController,
}

impl Scheduler {
    /// Assemble a scheduler owned by `replica_id`.
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<Executor>,
        leases: LeaseStore,
        checks: Arc<CheckStore>,
        replica_id: String,
        shutdown: ShutdownController,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        Self {
            config,
            executor,
            leases,
            checks,
            replica_id,
            semaphore,
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Spawn the ticker loop. Returns immediately; the loop runs until
    /// shutdown is requested.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        info!(
            replica_id = %self.replica_id,
            tick_interval_secs = self.config.tick_interval.as_secs(),
            lock_ttl_secs = self.config.lock_ttl.as_secs(),
            concurrency = self.config.concurrency,
            "Starting scheduler"
        );

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.config.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => scheduler.tick().await,
                    _ = scheduler.shutdown.wait() => {
                        info!(replica_id = %scheduler.replica_id, "Scheduler loop stopped");
                        break;
                    }
                }
            }
        })
    }

    /// One scheduling pass: sweep expired leases, find due checks, and
    /// dispatch each one we manage to lease.
    pub async fn tick(&self) {
        let now = Utc::now();
        debug!(replica_id = %self.replica_id, "Scheduler tick");

        match self.leases.sweep().await {
            Ok(0) => {}
            Ok(reclaimed) => info!(count = reclaimed, "Reclaimed expired leases"),
            Err(e) => error!(error = %e, "Failed to sweep expired leases"),
        }

        let due = match self.checks.find_due(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to find due checks");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        info!(
            replica_id = %self.replica_id,
            count = due.len(),
            "Found due scheduled checks"
        );

        for config in due {
            let acquired = match self
                .leases
                .acquire(config.id, &self.replica_id, self.config.lock_ttl)
                .await
            {
                Ok(acquired) => acquired,
                Err(e) => {
                    error!(
                        config_id = %config.id,
                        config_name = %config.name,
                        error = %e,
                        "Failed to acquire lease"
                    );
                    continue;
                }
            };
            if !acquired {
                debug!(
                    config_id = %config.id,
                    config_name = %config.name,
                    "Lease held by another replica"
                );
                continue;
            }

            info!(
                config_id = %config.id,
                config_name = %config.name,
                replica_id = %self.replica_id,
                "Lease acquired for scheduled execution"
            );

            let scheduler = SchedulerWorker {
                executor: self.executor.clone(),
                leases: self.leases.clone(),
                checks: self.checks.clone(),
                replica_id: self.replica_id.clone(),
                semaphore: self.semaphore.clone(),
                shutdown: self.shutdown.clone(),
            };
            self.tracker
                .spawn(async move { scheduler.run(config).await });
        }
    }

    /// Stop dispatching, wait for in-flight executions up to `grace`, then
    /// release every lease this replica still holds.
    pub async fn stop(&self, grace: Duration) {
        info!(replica_id = %self.replica_id, "Stopping scheduler");

        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(replica_id = %self.replica_id, "Timed out waiting for scheduled executions");
        }

        if let Err(e) = self.leases.release_all(&self.replica_id).await {
            error!(error = %e, "Failed to release leases during shutdown");
        }

        info!(replica_id = %self.replica_id, "Scheduler stopped");
    }
}

/// Per-execution state captured when a lease is won.
struct SchedulerWorker {
    executor: Arc<Executor>,
    leases: LeaseStore,
    checks: Arc<CheckStore>,
    replica_id: String,
    semaphore: Arc<Semaphore>,
    shutdown: ShutdownController,
}

impl SchedulerWorker {
    async fn run(self, config: CheckConfig) {
        // Reserve a concurrency slot; if shutdown wins the race, hand the
        // lease back untouched so another replica can pick the check up.
        let _permit = tokio::select! {
            permit = self.semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.release_lease(config.id).await;
                    return;
                }
            },
            _ = self.shutdown.wait() => {
                self.release_lease(config.id).await;
                return;
            }
        };

        let correlation_id = Uuid::new_v4();
        info!(
            config_id = %config.id,
            config_name = %config.name,
            correlation_id = %correlation_id,
            replica_id = %self.replica_id,
            "Executing scheduled check"
        );

        let started = std::time::Instant::now();
        match self.executor.execute(config.id, correlation_id).await {
            Ok(history) => info!(
                config_id = %config.id,
                config_name = %config.name,
                correlation_id = %correlation_id,
                status = %history.status,
                duration_ms = started.elapsed().as_millis() as u64,
                "Scheduled execution completed"
            ),
            Err(e) => error!(
                config_id = %config.id,
                config_name = %config.name,
                correlation_id = %correlation_id,
                error = %e,
                "Scheduled execution failed"
            ),
        }

        if let Err(e) = self.advance_schedule(&config).await {
            error!(
                config_id = %config.id,
                error = %e,
                "Failed to advance schedule"
            );
        }

        self.release_lease(config.id).await;
    }

    /// Write back `last_scheduled_run = now` and the cron's next firing.
    async fn advance_schedule(
        &self,
        config: &CheckConfig,
    ) -> crate::common::error::VigilResult<()> {
        let now = Utc::now();
        let expr = config.schedule.as_deref().unwrap_or_default();
        let parsed = schedule::parse(expr)?;
        let next = schedule::next_run(&parsed, now);
        self.checks.update_scheduled_run(config.id, now, next).await
    }

    async fn release_lease(&self, config_id: Uuid) {
        if let Err(e) = self.leases.release(config_id, &self.replica_id).await {
            error!(
                config_id = %config_id,
                replica_id = %self.replica_id,
                error = %e,
                "Failed to release lease"
            );
        }
    }
}
