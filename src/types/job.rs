//! In-memory status for fire-and-forget executions.
//!
//! Process-local only; not durable across restarts.

use serde::Serialize;
use uuid::Uuid;

use crate::types::execution::ExecutionHistory;

/// Lifecycle state of an async job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, waiting for a worker.
    Queued,
    /// A worker is executing the check.
    Processing,
    /// Execution finished and produced a history record.
    Completed,
    /// Execution failed before producing a history record.
    Failed,
}

impl JobState {
    /// Stable wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Snapshot of an async job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    /// Job identifier returned to the submitter.
    pub job_id: Uuid,
    /// Current lifecycle state.
    pub state: JobState,
    /// Correlation id of the underlying execution.
    pub correlation_id: Uuid,
    /// Failure message, set when `state` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The resulting execution, set when `state` is `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionHistory>,
}

impl JobStatus {
    /// A freshly queued job.
    pub fn queued(job_id: Uuid, correlation_id: Uuid) -> Self {
        JobStatus {
            job_id,
            state: JobState::Queued,
            correlation_id,
            error: None,
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_job_has_no_outcome() {
        let status = JobStatus::queued(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(status.state, JobState::Queued);
        assert!(status.error.is_none());
        assert!(status.result.is_none());
    }

    #[test]
    fn state_serializes_lowercase() {
        let value = serde_json::to_value(JobState::Processing).unwrap();
        assert_eq!(value, serde_json::json!("processing"));
    }
}
