//! Bounded worker pool for execution requests.
//!
//! A fixed number of workers consume a bounded job channel. Synchronous jobs
//! carry a reply channel; asynchronous jobs report through the job registry
//! instead. Submissions are refused once shutdown is requested, and workers
//! exit after their current job when the signal arrives.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::common::error::{VigilError, VigilResult};
use crate::executor::jobs::JobRegistry;
use crate::executor::Executor;
use crate::shutdown::ShutdownController;
use crate::types::execution::ExecutionHistory;

/// How a job reports its outcome.
pub enum JobKind {
    /// Reply to a waiting submitter.
    Sync(oneshot::Sender<VigilResult<ExecutionHistory>>),
    /// Update the async job registry under this job id.
    Async(Uuid),
}

/// A unit of work for the pool.
pub struct WorkerJob {
    /// Check to execute.
    pub config_id: Uuid,
    /// Correlation id for the execution.
    pub correlation_id: Uuid,
    /// Outcome channel.
    pub kind: JobKind,
}

/// Cheap handle for submitting jobs; held by the API layer.
#[derive(Clone)]
pub struct PoolHandle {
    jobs_tx: mpsc::Sender<WorkerJob>,
    shutdown: ShutdownController,
}

impl PoolHandle {
    /// Enqueue a job. Blocks while the queue is full; errors once shutdown
    /// has been requested.
    pub async fn submit(&self, job: WorkerJob) -> VigilResult<()> {
        if self.shutdown.is_shutdown() {
            return Err(VigilError::Cancelled);
        }
        debug!(
            config_id = %job.config_id,
            correlation_id = %job.correlation_id,
            "Submitting job to worker pool"
        );
        self.jobs_tx
            .send(job)
            .await
            .map_err(|_| VigilError::Cancelled)
    }

    /// Execute a check synchronously through the pool and wait for its
    /// history.
    pub async fn execute_sync(&self, config_id: Uuid) -> VigilResult<ExecutionHistory> {
        let correlation_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(WorkerJob {
            config_id,
            correlation_id,
            kind: JobKind::Sync(reply_tx),
        })
        .await?;
        reply_rx.await.map_err(|_| VigilError::Cancelled)?
    }
}

/// The pool itself; owned by the process lifecycle for shutdown.
pub struct WorkerPool {
    jobs_tx: mpsc::Sender<WorkerJob>,
    handles: Vec<JoinHandle<()>>,
    shutdown: ShutdownController,
}

impl WorkerPool {
    /// Spawn `workers` workers over a queue of `queue_size` jobs.
    pub fn new(
        workers: usize,
        queue_size: usize,
        executor: Arc<Executor>,
        registry: JobRegistry,
        shutdown: ShutdownController,
    ) -> Self {
        info!(workers, queue_size, "Starting worker pool");

        let (jobs_tx, jobs_rx) = mpsc::channel::<WorkerJob>(queue_size);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let handles = (0..workers)
            .map(|worker_id| {
                let jobs_rx = jobs_rx.clone();
                let executor = executor.clone();
                let registry = registry.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, jobs_rx, executor, registry, shutdown).await;
                })
            })
            .collect();

        Self {
            jobs_tx,
            handles,
            shutdown,
        }
    }

    /// Submission handle for the API layer.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            jobs_tx: self.jobs_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Stop the pool: close the queue and wait for workers to finish their
    /// current jobs. Call after shutdown has been signalled.
    pub async fn stop(self) {
        info!("Stopping worker pool");
        drop(self.jobs_tx);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    jobs_rx: Arc<Mutex<mpsc::Receiver<WorkerJob>>>,
    executor: Arc<Executor>,
    registry: JobRegistry,
    shutdown: ShutdownController,
) {
    debug!(worker_id, "Worker started");

    loop {
        let job = {
            let mut rx = jobs_rx.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = shutdown.wait() => None,
            }
        };
        let Some(job) = job else { break };

        debug!(
            worker_id,
            config_id = %job.config_id,
            correlation_id = %job.correlation_id,
            "Worker processing job"
        );

        match job.kind {
            JobKind::Sync(reply) => {
                let result = executor.execute(job.config_id, job.correlation_id).await;
                // A dropped receiver just means the submitter went away.
                let _ = reply.send(result);
            }
            JobKind::Async(job_id) => {
                registry.mark_processing(job_id);
                match executor.execute(job.config_id, job.correlation_id).await {
                    Ok(history) => registry.mark_completed(job_id, history),
                    Err(e) => registry.mark_failed(job_id, e.to_string()),
                }
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::alerts::AlertStore;
    use crate::db::checks::CheckStore;
    use crate::db::executions::ExecutionStore;
    use crate::db::test_utils::test_pool;
    use crate::types::check::{
        AuthSpec, RetryPolicy, Rule, RuleOperator, Target, WebhookSpec,
    };
    use crate::types::check::CheckConfig;
    use crate::webhook::{CircuitBreaker, WebhookDispatcher};
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        pool: WorkerPool,
        registry: JobRegistry,
        checks: Arc<CheckStore>,
        shutdown: ShutdownController,
    }

    async fn fixture(workers: usize) -> Fixture {
        let db = test_pool().await;
        let checks = Arc::new(CheckStore::new(db.clone()));
        let executions = Arc::new(ExecutionStore::new(db.clone()));
        let alerts = Arc::new(AlertStore::new(db));
        let client = reqwest::Client::new();
        let shutdown = ShutdownController::new();
        let dispatcher = WebhookDispatcher::new(
            client.clone(),
            Arc::new(CircuitBreaker::default()),
            Duration::from_secs(5),
            shutdown.clone(),
        );
        let executor = Arc::new(Executor::new(
            client,
            dispatcher,
            checks.clone(),
            executions,
            alerts,
        ));
        let registry = JobRegistry::new();
        let pool = WorkerPool::new(workers, 16, executor, registry.clone(), shutdown.clone());
        Fixture {
            pool,
            registry,
            checks,
            shutdown,
        }
    }

    async fn insert_check(checks: &CheckStore, target_url: String) -> CheckConfig {
        let now = Utc::now();
        let config = CheckConfig {
            id: Uuid::new_v4(),
            name: format!("check-{}", Uuid::new_v4()),
            description: None,
            enabled: true,
            target: Target {
                url: target_url,
                method: "GET".into(),
                headers: Default::default(),
                body: None,
                auth: AuthSpec::None,
                timeout_secs: 5,
            },
            rules: vec![Rule {
                name: "ok".into(),
                description: None,
                expression: "$.ok".into(),
                operator: RuleOperator::Eq,
                expected_value: json!(true),
                alert_on_match: false,
            }],
            webhook: WebhookSpec {
                url: "http://127.0.0.1:1/hook".into(),
                method: "POST".into(),
                headers: Default::default(),
                retry: RetryPolicy::default(),
            },
            tags: vec![],
            schedule: None,
            schedule_enabled: false,
            last_scheduled_run: None,
            next_scheduled_run: None,
            created_at: now,
            updated_at: now,
        };
        checks.create(&config).await.unwrap();
        config
    }

    #[tokio::test]
    async fn sync_job_returns_execution() {
        let target = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&target)
            .await;

        let fixture = fixture(2).await;
        let config = insert_check(&fixture.checks, target.uri()).await;

        let history = fixture.pool.handle().execute_sync(config.id).await.unwrap();
        assert_eq!(history.config_id, config.id);
        assert!(history.rules_evaluation[0].matched);

        fixture.shutdown.request_shutdown();
        fixture.pool.stop().await;
    }

    #[tokio::test]
    async fn sync_job_propagates_executor_errors() {
        let fixture = fixture(1).await;
        let err = fixture
            .pool
            .handle()
            .execute_sync(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, VigilError::NotFound(_)));

        fixture.shutdown.request_shutdown();
        fixture.pool.stop().await;
    }

    #[tokio::test]
    async fn concurrent_sync_jobs_complete() {
        let target = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&target)
            .await;

        let fixture = fixture(4).await;
        let config = insert_check(&fixture.checks, target.uri()).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let handle = fixture.pool.handle();
            let config_id = config.id;
            handles.push(tokio::spawn(
                async move { handle.execute_sync(config_id).await },
            ));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        fixture.shutdown.request_shutdown();
        fixture.pool.stop().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_refused() {
        let fixture = fixture(1).await;
        fixture.shutdown.request_shutdown();

        let (reply_tx, _reply_rx) = oneshot::channel();
        let err = fixture
            .pool
            .handle()
            .submit(WorkerJob {
                config_id: Uuid::new_v4(),
                correlation_id: Uuid::new_v4(),
                kind: JobKind::Sync(reply_tx),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VigilError::Cancelled));

        fixture.pool.stop().await;
    }

    #[tokio::test]
    async fn async_job_flows_through_registry() {
        let target = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&target)
            .await;

        let fixture = fixture(2).await;
        let config = insert_check(&fixture.checks, target.uri()).await;

        let job_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        fixture.registry.insert_queued(job_id, correlation_id);
        fixture
            .pool
            .handle()
            .submit(WorkerJob {
                config_id: config.id,
                correlation_id,
                kind: JobKind::Async(job_id),
            })
            .await
            .unwrap();

        // Poll until the worker finishes.
        let mut status = fixture.registry.get(job_id).unwrap();
        for _ in 0..100 {
            if matches!(
                status.state,
                crate::types::job::JobState::Completed | crate::types::job::JobState::Failed
            ) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = fixture.registry.get(job_id).unwrap();
        }

        assert_eq!(status.state, crate::types::job::JobState::Completed);
        assert_eq!(status.result.unwrap().config_id, config.id);

        fixture.shutdown.request_shutdown();
        fixture.pool.stop().await;
    }
}
