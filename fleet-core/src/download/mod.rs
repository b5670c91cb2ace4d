//! Download Manager: the model-pull queue, progress streaming,
//! deduplication, and cooperative cancellation.
//!
//! Mirrors [`crate::runtime_state::RuntimeStateEngine`]'s "own a piece of
//! state, drive a background operation, publish a summary on the Messenger"
//! shape. The progress broadcast is non-blocking send with slow subscribers
//! dropped — best-effort, latest-wins.

mod puller;

pub use puller::{MockPuller, ModelPuller, PullError, PullStatus, PullUpdate};

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{DownloadJob, DownloadProgress, DownloadState, Job};
use crate::error::CoreError;
use crate::messenger::{subjects, Messenger};
use crate::store::Store;

/// `{status, digest, total, completed, model, baseUrl}` — bit-exact wire
/// shape for `downloads.progress`.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgressEvent {
    pub status: DownloadState,
    pub digest: Option<String>,
    pub total: u64,
    pub completed: u64,
    pub model: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
}

/// Key identifying one in-flight pull: at most one pull is in-flight for a
/// given `(backend_url, model)` pair at any instant.
type PullKey = (String, String);

struct InFlight {
    cancel: CancellationToken,
    progress_tx: broadcast::Sender<DownloadProgressEvent>,
    job: std::sync::Mutex<DownloadJob>,
}

/// Model-pull queue, progress stream, and cancellation.
pub struct DownloadManager {
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    puller: Arc<dyn ModelPuller>,
    in_flight: DashMap<PullKey, Arc<InFlight>>,
}

impl DownloadManager {
    pub fn new(store: Arc<dyn Store>, messenger: Arc<dyn Messenger>, puller: Arc<dyn ModelPuller>) -> Arc<Self> {
        Arc::new(Self { store, messenger, puller, in_flight: DashMap::new() })
    }

    /// Enqueues `(backend_url, model)` as a `model_download` job and starts
    /// pulling it. If a pull for the same pair is already in flight, this
    /// short-circuits and the caller joins the existing progress stream
    /// instead of starting a second one.
    pub async fn enqueue(self: &Arc<Self>, backend_url: &str, model: &str) -> Result<(), CoreError> {
        let key = (backend_url.to_string(), model.to_string());
        if self.in_flight.contains_key(&key) {
            debug!(backend_url, model, "download manager: pull already in flight, joining");
            return Ok(());
        }

        let job = Job::new(
            uuid::Uuid::new_v4().to_string(),
            subjects::MODEL_DOWNLOAD,
            "pull",
            model.to_string(),
            serde_json::to_vec(&DownloadJob::new(uuid::Uuid::new_v4().to_string(), model, backend_url)).map_err(|e| CoreError::Other(e.into()))?,
        );
        self.store.append_job(job).await.map_err(CoreError::from)?;

        let (progress_tx, _) = broadcast::channel(32);
        let in_flight = Arc::new(InFlight {
            cancel: CancellationToken::new(),
            progress_tx,
            job: std::sync::Mutex::new(DownloadJob::new(uuid::Uuid::new_v4().to_string(), model, backend_url)),
        });
        self.in_flight.insert(key.clone(), in_flight);

        let manager = Arc::clone(self);
        let backend_url = backend_url.to_string();
        let model = model.to_string();
        tokio::spawn(async move {
            manager.run_pull(key, backend_url, model).await;
        });
        Ok(())
    }

    async fn run_pull(self: Arc<Self>, key: PullKey, backend_url: String, model: String) {
        let Some(entry) = self.in_flight.get(&key).map(|e| Arc::clone(&e)) else {
            return;
        };
        self.set_state(&entry, DownloadState::Pulling, &backend_url, &model, None);

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = entry.cancel.clone();
        let puller = self.puller.clone();
        let pull_backend_url = backend_url.clone();
        let pull_model = model.clone();
        let pull_task = tokio::spawn(async move { puller.pull(&pull_backend_url, &pull_model, tx, cancel).await });

        while let Some(update) = rx.recv().await {
            let state = match update.status {
                PullStatus::Pulling => DownloadState::Pulling,
                PullStatus::Verifying => DownloadState::Verifying,
                PullStatus::Done => DownloadState::Done,
            };
            self.set_state(&entry, state, &backend_url, &model, Some(update.progress));
        }

        let outcome = pull_task.await;
        let final_state = if entry.cancel.is_cancelled() {
            DownloadState::Cancelled
        } else {
            match outcome {
                Ok(Ok(())) => DownloadState::Done,
                Ok(Err(e)) => {
                    warn!(backend_url, model, error = %e, "download manager: pull failed");
                    DownloadState::Error
                }
                Err(e) => {
                    warn!(backend_url, model, error = %e, "download manager: pull task panicked");
                    DownloadState::Error
                }
            }
        };
        self.set_state(&entry, final_state, &backend_url, &model, None);
        self.in_flight.remove(&key);
    }

    fn set_state(&self, entry: &InFlight, state: DownloadState, backend_url: &str, model: &str, progress: Option<DownloadProgress>) {
        let mut job = entry.job.lock().expect("download job mutex poisoned");
        job.state = state;
        if let Some(p) = progress {
            job.progress = p;
        }
        let event = DownloadProgressEvent {
            status: state,
            digest: job.progress.digest.clone(),
            total: job.progress.total,
            completed: job.progress.completed,
            model: model.to_string(),
            base_url: backend_url.to_string(),
        };
        drop(job);

        // Non-blocking: a lagging or absent subscriber never stalls the pull.
        let _ = entry.progress_tx.send(event.clone());
        let messenger = self.messenger.clone();
        if let Ok(payload) = serde_json::to_vec(&event) {
            tokio::spawn(async move {
                messenger.publish(subjects::DOWNLOADS_PROGRESS, payload).await;
            });
        }
    }

    /// Subscribes to progress for an in-flight `(backend_url, model)` pull.
    /// Returns `None` if nothing is in flight for that pair.
    pub fn progress_stream(&self, backend_url: &str, model: &str) -> Option<broadcast::Receiver<DownloadProgressEvent>> {
        self.in_flight.get(&(backend_url.to_string(), model.to_string())).map(|e| e.progress_tx.subscribe())
    }

    /// Current state snapshot for an in-flight pull, if any.
    pub fn status(&self, backend_url: &str, model: &str) -> Option<DownloadJob> {
        self.in_flight.get(&(backend_url.to_string(), model.to_string())).map(|e| e.job.lock().expect("download job mutex poisoned").clone())
    }

    /// `cancel(url)`: cancels every in-flight pull against that backend.
    pub async fn cancel_by_url(&self, backend_url: &str) {
        self.cancel_matching(|k| k.0 == backend_url).await;
    }

    /// `cancel(model)`: cancels every in-flight pull of that model,
    /// regardless of backend.
    pub async fn cancel_by_model(&self, model: &str) {
        self.cancel_matching(|k| k.1 == model).await;
    }

    async fn cancel_matching(&self, predicate: impl Fn(&PullKey) -> bool) {
        let matched: Vec<PullKey> = self.in_flight.iter().filter(|entry| predicate(entry.key())).map(|entry| entry.key().clone()).collect();
        for key in &matched {
            if let Some(entry) = self.in_flight.get(key) {
                entry.cancel.cancel();
            }
        }
        if !matched.is_empty() {
            info!(cancelled = matched.len(), "download manager: cancellation requested");
            self.messenger.publish(subjects::QUEUE_CANCEL, b"cancel".to_vec()).await;
        }
    }

    /// `remove(model)`: pops every queued `model_download` job for `model`
    /// and leaves the rest in place, via the Store's atomic
    /// `delete_pending_jobs_where`.
    pub async fn remove(&self, model: &str) -> Result<usize, CoreError> {
        let model = model.to_string();
        self.store.delete_pending_jobs_where(subjects::MODEL_DOWNLOAD, &move |job| job.subject == model).await.map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::InMemoryMessenger;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn manager_with(puller: Arc<dyn ModelPuller>) -> Arc<DownloadManager> {
        DownloadManager::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryMessenger::new()), puller)
    }

    #[tokio::test]
    async fn enqueue_runs_through_pulling_then_done() {
        let manager = manager_with(Arc::new(MockPuller::succeeding(100)));
        let mut sub = {
            manager.enqueue("http://b1", "llama3").await.unwrap();
            manager.progress_stream("http://b1", "llama3").expect("pull just enqueued")
        };

        let mut saw_pulling = false;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.expect("no timeout").expect("channel open");
            if event.status == DownloadState::Pulling {
                saw_pulling = true;
            }
            if event.status == DownloadState::Done {
                break;
            }
        }
        assert!(saw_pulling, "download must pass through pulling before done (spec round-trip law)");
    }

    #[tokio::test]
    async fn second_enqueue_for_same_pair_joins_instead_of_duplicating() {
        let manager = manager_with(Arc::new(MockPuller::succeeding(100)));
        manager.enqueue("http://b1", "llama3").await.unwrap();
        manager.enqueue("http://b1", "llama3").await.unwrap();
        // Only one in-flight entry should exist for the pair.
        assert!(manager.status("http://b1", "llama3").is_some());
        assert_eq!(manager.in_flight.len(), 1);
    }

    #[tokio::test]
    async fn failing_pull_reaches_error_state() {
        let manager = manager_with(Arc::new(MockPuller::failing("boom")));
        let mut sub = {
            manager.enqueue("http://b1", "llama3").await.unwrap();
            manager.progress_stream("http://b1", "llama3").expect("pull just enqueued")
        };
        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
        assert_eq!(event.status, DownloadState::Error);
    }

    #[tokio::test]
    async fn remove_drops_only_matching_queued_jobs() {
        let manager = manager_with(Arc::new(MockPuller::succeeding(10)));
        manager.store.append_job(Job::new("j1", subjects::MODEL_DOWNLOAD, "pull", "llama3", vec![])).await.unwrap();
        manager.store.append_job(Job::new("j2", subjects::MODEL_DOWNLOAD, "pull", "mistral", vec![])).await.unwrap();

        let removed = manager.remove("llama3").await.unwrap();
        assert_eq!(removed, 1);
        let remaining = manager.store.pending_jobs_of_type(subjects::MODEL_DOWNLOAD).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].subject, "mistral");
    }

    #[tokio::test]
    async fn cancel_by_url_stops_the_in_flight_pull() {
        // A puller that never finishes on its own unless cancelled.
        struct Hangs;
        #[async_trait::async_trait]
        impl ModelPuller for Hangs {
            async fn pull(&self, _b: &str, _m: &str, tx: mpsc::Sender<PullUpdate>, cancel: CancellationToken) -> Result<(), PullError> {
                let _ = tx
                    .send(PullUpdate { status: PullStatus::Pulling, progress: DownloadProgress { completed: 1, total: 100, digest: None } })
                    .await;
                cancel.cancelled().await;
                Ok(())
            }
        }

        let manager = manager_with(Arc::new(Hangs));
        let mut sub = {
            manager.enqueue("http://b1", "llama3").await.unwrap();
            manager.progress_stream("http://b1", "llama3").expect("pull just enqueued")
        };
        // Drain the pulling event before cancelling.
        let _ = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();

        manager.cancel_by_url("http://b1").await;
        let final_event = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
        assert_eq!(final_event.status, DownloadState::Cancelled);
    }
}
