//! Job Queue: leased job dispatch over the Store, with retry accounting and
//! dead-letter semantics.
//!
//! The retry/DLQ bookkeeping counts failures and gates the next attempt, the
//! same shape as [`crate::runtime_state::RuntimeStateEngine`]'s — a
//! component that owns a piece of state behind an async lock and drives a
//! background loop guarded by a [`crate::circuit_breaker::CircuitBreaker`] —
//! for the lease sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::domain::{Job, JobStatus, Lease};
use crate::error::CoreError;
use crate::store::Store;

/// Default lease duration handed out by `pop_and_lease` when the caller
/// doesn't specify one.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

/// Default sweep interval for [`JobQueue::sweep_expired_leases`] when run as
/// a background loop.
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(5);

/// Dead-letter entry: a job that exhausted its retry budget, kept queryable
/// rather than silently dropped. A job at `retry_count >= MaxRetries` must
/// never resurface as pending.
#[derive(Debug, Clone)]
pub struct DeadJob {
    pub job: Job,
    pub died_at: chrono::DateTime<Utc>,
}

/// Leased job dispatch with retries and DLQ semantics.
///
/// Lease bookkeeping — `(job_id, leaser_id, expires_at)` — lives in this
/// component, not the Store, because the Store's `pop_job_for_type` only
/// flips a job's status to `Leased`; it has no notion of a lease's owner or
/// expiry. `JobQueue` is the layer that adds both, plus the sweep-expired-
/// leases loop and the failure → retry-or-dead decision.
pub struct JobQueue {
    store: Arc<dyn Store>,
    leases: RwLock<HashMap<String, Lease>>,
    dead: RwLock<Vec<DeadJob>>,
    breaker: CircuitBreaker,
    max_retries: u32,
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_max_retries(store, crate::domain::DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(store: Arc<dyn Store>, max_retries: u32) -> Self {
        Self {
            store,
            leases: RwLock::new(HashMap::new()),
            dead: RwLock::new(Vec::new()),
            breaker: CircuitBreaker::new(Duration::from_secs(5)),
            max_retries,
        }
    }

    /// `AppendJob`: enqueues in FIFO-by-`created_at` order within `job.task_type`.
    pub async fn append_job(&self, job: Job) -> Result<(), CoreError> {
        self.store.append_job(job).await.map_err(CoreError::from)
    }

    /// `AppendJobs`: enqueues a batch, preserving each job's own `created_at`.
    pub async fn append_jobs(&self, jobs: Vec<Job>) -> Result<(), CoreError> {
        for job in jobs {
            self.append_job(job).await?;
        }
        Ok(())
    }

    /// `PopJobForType` + `AppendLeasedJob`, combined: dequeues the oldest
    /// pending job of `task_type` and immediately records an active lease for
    /// it under `leaser_id`. Pop-and-lease is serializable at the Store layer:
    /// multiple leasers may race on pop, exactly one wins.
    pub async fn pop_and_lease(&self, task_type: &str, leaser_id: &str, duration: Duration) -> Result<Option<Job>, CoreError> {
        let Some(job) = self.store.pop_job_for_type(task_type).await.map_err(CoreError::from)? else {
            return Ok(None);
        };
        let expires_at = Utc::now() + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::seconds(30));
        let lease = Lease { job_id: job.id.clone(), leaser_id: leaser_id.to_string(), expires_at };
        self.leases.write().await.insert(job.id.clone(), lease);
        debug!(job_id = %job.id, task_type, leaser_id, "job queue: leased job");
        Ok(Some(job))
    }

    /// `DeleteLeasedJob`: acknowledges completion — removes the lease and
    /// deletes the job from the Store.
    pub async fn delete_leased_job(&self, job_id: &str) -> Result<(), CoreError> {
        self.leases.write().await.remove(job_id);
        self.store.delete_job(job_id).await.map_err(CoreError::from)
    }

    /// On failure: increments `retry_count`, deletes the lease, and
    /// re-appends the job — unless `retry_count >= MaxRetries`, in which case
    /// it moves to the dead-letter list instead.
    pub async fn fail_leased_job(&self, job_id: &str) -> Result<(), CoreError> {
        self.leases.write().await.remove(job_id);
        let mut job = self.store.get_job(job_id).await.map_err(CoreError::from)?;
        job.retry_count += 1;

        if job.is_exhausted(self.max_retries) {
            job.status = JobStatus::Dead;
            warn!(job_id = %job.id, retry_count = job.retry_count, "job queue: job exhausted retries, moving to dead letter");
            self.store.delete_job(job_id).await.map_err(CoreError::from)?;
            self.dead.write().await.push(DeadJob { job, died_at: Utc::now() });
            return Ok(());
        }

        job.status = JobStatus::Pending;
        self.store.update_job(job).await.map_err(CoreError::from)
    }

    /// Dead-letter jobs accumulated so far.
    pub async fn dead_jobs(&self) -> Vec<DeadJob> {
        self.dead.read().await.clone()
    }

    /// Returns every lease that has expired as of now, without mutating
    /// anything — used by [`Self::sweep_expired_leases`] and exposed
    /// separately so a caller can inspect sweep candidates in tests.
    async fn expired_lease_ids(&self) -> Vec<String> {
        let now = Utc::now();
        self.leases.read().await.values().filter(|lease| lease.is_expired(now)).map(|lease| lease.job_id.clone()).collect()
    }

    /// Background sweeper: returns expired leases to pending. A lease
    /// expiring without `delete_leased_job` means its leaser died or
    /// hung; the job goes back to `Pending` without incrementing
    /// `retry_count` — it was never actually attempted and failed, its
    /// claim just lapsed.
    pub async fn sweep_expired_leases(&self) -> Result<usize, CoreError> {
        let expired = self.expired_lease_ids().await;
        let mut swept = 0;
        for job_id in expired {
            self.leases.write().await.remove(&job_id);
            let Ok(mut job) = self.store.get_job(&job_id).await else {
                // Already deleted by a completing leaser racing this sweep; nothing to do.
                continue;
            };
            if job.status != JobStatus::Leased {
                continue;
            }
            job.status = JobStatus::Pending;
            self.store.update_job(job).await.map_err(CoreError::from)?;
            swept += 1;
        }
        Ok(swept)
    }

    /// Runs [`Self::sweep_expired_leases`] once, guarded by the circuit
    /// breaker shared with the other background loops. A caller
    /// wraps this in its own `loop { sleep(period); ... }` — this crate does
    /// not spawn tasks on its own.
    pub async fn sweep_once(&self) -> Result<usize, CoreError> {
        if !self.breaker.before_attempt() {
            debug!("job queue: circuit breaker open, skipping sweep");
            return Ok(0);
        }
        match self.sweep_expired_leases().await {
            Ok(n) => {
                self.breaker.record_success();
                if n > 0 {
                    info!(swept = n, "job queue: returned expired leases to pending");
                }
                Ok(n)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn queue(max_retries: u32) -> JobQueue {
        JobQueue::with_max_retries(Arc::new(InMemoryStore::new()), max_retries)
    }

    #[tokio::test]
    async fn append_then_pop_and_lease_returns_the_job() {
        let q = queue(30);
        q.append_job(Job::new("j1", "model_download", "pull", "llama3", vec![])).await.unwrap();
        let job = q.pop_and_lease("model_download", "worker-1", DEFAULT_LEASE_DURATION).await.unwrap().unwrap();
        assert_eq!(job.id, "j1");
    }

    #[tokio::test]
    async fn delete_leased_job_removes_lease_and_job() {
        let q = queue(30);
        q.append_job(Job::new("j1", "t", "op", "s", vec![])).await.unwrap();
        q.pop_and_lease("t", "worker-1", DEFAULT_LEASE_DURATION).await.unwrap();
        q.delete_leased_job("j1").await.unwrap();
        assert!(q.expired_lease_ids().await.is_empty());
    }

    #[tokio::test]
    async fn fail_leased_job_re_appends_with_incremented_retry_count() {
        let q = queue(30);
        q.append_job(Job::new("j1", "t", "op", "s", vec![])).await.unwrap();
        q.pop_and_lease("t", "worker-1", DEFAULT_LEASE_DURATION).await.unwrap();
        q.fail_leased_job("j1").await.unwrap();

        let popped = q.pop_and_lease("t", "worker-2", DEFAULT_LEASE_DURATION).await.unwrap().unwrap();
        assert_eq!(popped.retry_count, 1);
        assert_eq!(popped.status, JobStatus::Leased);
    }

    #[tokio::test]
    async fn job_exhausting_retries_moves_to_dead_letter_and_never_resurfaces() {
        let q = queue(1);
        q.append_job(Job::new("j1", "t", "op", "s", vec![])).await.unwrap();
        q.pop_and_lease("t", "worker-1", DEFAULT_LEASE_DURATION).await.unwrap();
        q.fail_leased_job("j1").await.unwrap(); // retry_count -> 1, == max_retries, dies

        let dead = q.dead_jobs().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.id, "j1");

        let popped = q.pop_and_lease("t", "worker-2", DEFAULT_LEASE_DURATION).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn expired_lease_is_returned_to_pending_by_sweep() {
        let q = queue(30);
        q.append_job(Job::new("j1", "t", "op", "s", vec![])).await.unwrap();
        q.pop_and_lease("t", "worker-1", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let swept = q.sweep_expired_leases().await.unwrap();
        assert_eq!(swept, 1);

        let job = q.pop_and_lease("t", "worker-2", DEFAULT_LEASE_DURATION).await.unwrap().unwrap();
        assert_eq!(job.retry_count, 0);
    }

    #[tokio::test]
    async fn sweep_with_no_expired_leases_is_a_no_op() {
        let q = queue(30);
        q.append_job(Job::new("j1", "t", "op", "s", vec![])).await.unwrap();
        q.pop_and_lease("t", "worker-1", DEFAULT_LEASE_DURATION).await.unwrap();
        assert_eq!(q.sweep_expired_leases().await.unwrap(), 0);
    }
}
