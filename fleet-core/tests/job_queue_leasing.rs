//! End-to-end Job Queue test: append, lease, fail past the retry budget, and
//! confirm the job never resurfaces as pending once it's dead.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::{Job, JobQueue};
use fleet_core::store::InMemoryStore;

#[tokio::test]
async fn job_exhausting_retries_stops_being_leasable() {
    let store = Arc::new(InMemoryStore::new());
    let queue = JobQueue::with_max_retries(store, 2);

    queue.append_job(Job::new("pull-1", "model_download", "pull", "llama3", vec![])).await.unwrap();

    for attempt in 0..2 {
        let job = queue.pop_and_lease("model_download", "worker-a", Duration::from_secs(30)).await.unwrap();
        assert!(job.is_some(), "attempt {attempt}: job should still be leasable");
        queue.fail_leased_job("pull-1").await.unwrap();
    }

    assert!(queue.pop_and_lease("model_download", "worker-a", Duration::from_secs(30)).await.unwrap().is_none());
    let dead = queue.dead_jobs().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job.id, "pull-1");
}

#[tokio::test]
async fn successful_completion_before_exhaustion_removes_the_job() {
    let store = Arc::new(InMemoryStore::new());
    let queue = JobQueue::with_max_retries(store, 5);

    queue.append_job(Job::new("pull-2", "model_download", "pull", "mistral", vec![])).await.unwrap();
    queue.pop_and_lease("model_download", "worker-a", Duration::from_secs(30)).await.unwrap();
    queue.fail_leased_job("pull-2").await.unwrap();

    let job = queue.pop_and_lease("model_download", "worker-b", Duration::from_secs(30)).await.unwrap().unwrap();
    assert_eq!(job.retry_count, 1);
    queue.delete_leased_job("pull-2").await.unwrap();

    assert!(queue.pop_and_lease("model_download", "worker-c", Duration::from_secs(30)).await.unwrap().is_none());
    assert!(queue.dead_jobs().await.is_empty());
}
