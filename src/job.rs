//! Job and result definitions for the pool.
//!
//! This module defines the core value types moving through the pipeline:
//!
//! - `Job`: a unit of work submitted to the pool
//! - `JobResult`: the outcome of executing one job
//! - `JobStatus`: terminal status of a completed job
//! - `JobError`: failure raised by the processing function

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A job representing one unit of work to be executed.
///
/// Jobs are immutable once enqueued. The payload is opaque to the pool;
/// it is handed as-is to the caller-supplied handler. The serde derives
/// allow external submitters (e.g. a message-broker consumer) to decode
/// inbound messages straight into jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<T> {
    /// Unique identifier for this job.
    pub id: Uuid,
    /// The payload to process.
    pub payload: T,
    /// When this job was created.
    pub created_at: DateTime<Utc>,
}

impl<T> Job<T> {
    /// Creates a new job with a fresh UUID and the current timestamp.
    pub fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Creates a job with a caller-assigned identifier.
    ///
    /// Useful when the submitter already tracks its own ids (e.g. ids
    /// carried in broker messages).
    pub fn with_id(id: Uuid, payload: T) -> Self {
        Self {
            id,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Returns how long ago the job was created.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// Failure raised by a job's processing function.
///
/// Captured in the corresponding `JobResult`; never propagated as a
/// pool-level fault and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct JobError(pub String);

impl JobError {
    /// Creates a new job error from any displayable message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<String> for JobError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<&str> for JobError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

/// Terminal status of a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job completed successfully.
    Completed,
    /// Job's processing function returned an error.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a job execution.
///
/// Exactly one result is produced per job, by the worker that dequeued
/// it. Processing failures are data here, not pool faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult<O> {
    /// ID of the job that was executed.
    pub job_id: Uuid,
    /// Final status of the job.
    pub status: JobStatus,
    /// Output value if the job succeeded.
    pub value: Option<O>,
    /// Error message if the job failed.
    pub error: Option<String>,
    /// ID of the worker that processed this job.
    pub worker_id: String,
    /// Duration of the execution in milliseconds.
    pub duration_ms: u64,
    /// When the job was completed.
    pub completed_at: DateTime<Utc>,
}

impl<O> JobResult<O> {
    /// Creates a successful job result.
    pub fn success(job_id: Uuid, worker_id: impl Into<String>, value: O, duration_ms: u64) -> Self {
        Self {
            job_id,
            status: JobStatus::Completed,
            value: Some(value),
            error: None,
            worker_id: worker_id.into(),
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    /// Creates a failed job result.
    pub fn failure(
        job_id: Uuid,
        worker_id: impl Into<String>,
        error: JobError,
        duration_ms: u64,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            value: None,
            error: Some(error.0),
            worker_id: worker_id.into(),
            duration_ms,
            completed_at: Utc::now(),
        }
    }

    /// Returns whether the job completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_new() {
        let job = Job::new("image-1.png".to_string());

        assert!(!job.id.is_nil());
        assert_eq!(job.payload, "image-1.png");
    }

    #[test]
    fn test_job_with_id() {
        let id = Uuid::new_v4();
        let job = Job::with_id(id, 42u32);

        assert_eq!(job.id, id);
        assert_eq!(job.payload, 42);
    }

    #[test]
    fn test_job_serialization_roundtrip() {
        let job = Job::new("image-7.png".to_string());

        let json = serde_json::to_string(&job).expect("serialization should work");
        let parsed: Job<String> = serde_json::from_str(&json).expect("deserialization should work");

        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.payload, job.payload);
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(format!("{}", JobStatus::Completed), "completed");
        assert_eq!(format!("{}", JobStatus::Failed), "failed");
    }

    #[test]
    fn test_job_result_success() {
        let job_id = Uuid::new_v4();
        let result = JobResult::success(job_id, "worker-1", "done".to_string(), 50);

        assert_eq!(result.job_id, job_id);
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.value, Some("done".to_string()));
        assert!(result.error.is_none());
        assert!(result.is_success());
    }

    #[test]
    fn test_job_result_failure() {
        let job_id = Uuid::new_v4();
        let result: JobResult<String> =
            JobResult::failure(job_id, "worker-2", JobError::new("corrupt input"), 12);

        assert_eq!(result.job_id, job_id);
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.value.is_none());
        assert_eq!(result.error, Some("corrupt input".to_string()));
        assert!(!result.is_success());
    }

    #[test]
    fn test_job_error_from() {
        let err: JobError = "boom".into();
        assert_eq!(err.to_string(), "boom");

        let err: JobError = String::from("bang").into();
        assert_eq!(err, JobError::new("bang"));
    }
}
