//! Job, Lease, and DownloadJob entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default retry budget before a job moves to the dead-letter list.
pub const DEFAULT_MAX_RETRIES: u32 = 30;

/// Where a job currently lives in the Job Queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Leased,
    Dead,
}

/// A unit of work in the Job Queue. `payload` is opaque bytes — this crate's
/// job consumers (the Runtime State Engine's download-job producer, the
/// Download Manager's consumer) agree on the encoding out of band per
/// `task_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub task_type: String,
    pub operation: String,
    pub subject: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub status: JobStatus,
}

impl Job {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>, operation: impl Into<String>, subject: impl Into<String>, payload: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            task_type: task_type.into(),
            operation: operation.into(),
            subject: subject.into(),
            payload,
            created_at: now,
            scheduled_for: now,
            valid_until: None,
            retry_count: 0,
            status: JobStatus::Pending,
        }
    }

    /// Invariant: `retry_count <= MaxRetries` or the job is dead.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }
}

/// A time-bounded exclusive claim on a job by a leaser. A lease expiring
/// (without `DeleteLeasedJob`) returns the job to pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub job_id: String,
    pub leaser_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lifecycle of a model pull, emitted by the Runtime State Engine when
/// observed state diverges from desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Queued,
    Pulling,
    Verifying,
    Done,
    Error,
    Cancelled,
}

/// A queued or in-flight model pull against one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: String,
    pub model: String,
    pub backend_url: String,
    pub state: DownloadState,
    pub progress: DownloadProgress,
}

impl DownloadJob {
    pub fn new(id: impl Into<String>, model: impl Into<String>, backend_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            backend_url: backend_url.into(),
            state: DownloadState::Queued,
            progress: DownloadProgress::default(),
        }
    }
}

/// `{completed, total, digest}` — a download's progress counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub completed: u64,
    pub total: u64,
    pub digest: Option<String>,
}
