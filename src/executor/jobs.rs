//! Async job registry for fire-and-forget executions.
//!
//! Status lives in a process-local map guarded by a reader/writer lock; it is
//! intentionally not durable. Jobs run on pool workers detached from the
//! submitting request, so a client disconnect does not abort them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;
use uuid::Uuid;

use crate::common::error::VigilResult;
use crate::executor::pool::{JobKind, PoolHandle, WorkerJob};
use crate::types::execution::ExecutionHistory;
use crate::types::job::{JobState, JobStatus};

/// Shared map of job id to status.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a check for async execution; returns the job id immediately.
    pub async fn submit(&self, pool: &PoolHandle, config_id: Uuid) -> VigilResult<Uuid> {
        let job_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        self.insert_queued(job_id, correlation_id);

        info!(
            job_id = %job_id,
            correlation_id = %correlation_id,
            config_id = %config_id,
            "Submitting async execution"
        );

        if let Err(e) = pool
            .submit(WorkerJob {
                config_id,
                correlation_id,
                kind: JobKind::Async(job_id),
            })
            .await
        {
            self.mark_failed(job_id, e.to_string());
            return Err(e);
        }
        Ok(job_id)
    }

    /// Snapshot of a job's status.
    pub fn get(&self, job_id: Uuid) -> Option<JobStatus> {
        self.inner
            .read()
            .expect("job registry lock poisoned")
            .get(&job_id)
            .cloned()
    }

    /// Record a freshly queued job.
    pub fn insert_queued(&self, job_id: Uuid, correlation_id: Uuid) {
        self.inner
            .write()
            .expect("job registry lock poisoned")
            .insert(job_id, JobStatus::queued(job_id, correlation_id));
    }

    /// Transition a job to `processing`.
    pub fn mark_processing(&self, job_id: Uuid) {
        if let Some(status) = self
            .inner
            .write()
            .expect("job registry lock poisoned")
            .get_mut(&job_id)
        {
            status.state = JobState::Processing;
        }
    }

    /// Transition a job to `completed` with its resulting history.
    pub fn mark_completed(&self, job_id: Uuid, history: ExecutionHistory) {
        if let Some(status) = self
            .inner
            .write()
            .expect("job registry lock poisoned")
            .get_mut(&job_id)
        {
            status.state = JobState::Completed;
            status.result = Some(history);
        }
    }

    /// Transition a job to `failed`.
    pub fn mark_failed(&self, job_id: Uuid, error: String) {
        if let Some(status) = self
            .inner
            .write()
            .expect("job registry lock poisoned")
            .get_mut(&job_id)
        {
            status.state = JobState::Failed;
            status.error = Some(error);
        }
    }
}
