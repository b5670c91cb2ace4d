//! Runtime State Engine: reconciles desired backends/models/pools against
//! what each remote server actually reports, driving model-pull jobs and a
//! queryable, generationally-ordered snapshot.
//!
//! One owner, many readers: the snapshot is replaced as a whole via a
//! copy-on-write swap instead of a `RwLock` over mutable state, so readers
//! never block the writer.

mod observer;

pub use observer::{BackendObserver, HttpBackendObserver, MockBackendObserver, Observation, ObserverError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::domain::{Backend, DownloadJob};
use crate::error::CoreError;
use crate::messenger::{subjects, Messenger};
use crate::store::Store;

pub const DEFAULT_RECONCILE_PERIOD: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONCILE_CONCURRENCY: usize = 8;
pub const DEFAULT_CIRCUIT_COOLDOWN: Duration = Duration::from_secs(5);

/// Per-backend view rebuilt on every reconciliation cycle. Not
/// persisted — lives only in the current [`Snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct LlmState {
    pub backend: Backend,
    pub pulled_models: Vec<String>,
    pub models_desired: Vec<String>,
    pub error: Option<String>,
}

/// An immutable, generationally-ordered view of runtime state. `generation`
/// only ever increases across swaps on one engine, so a reader that takes two
/// snapshots over time always sees `s2.generation >= s1.generation`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub generation: u64,
    pub states: HashMap<String, LlmState>,
}

impl Snapshot {
    pub fn get(&self, backend_id: &str) -> Option<&LlmState> {
        self.states.get(backend_id)
    }
}

#[derive(Debug, Serialize)]
struct StateUpdatedSummary {
    generation: u64,
    backend_count: usize,
    error_count: usize,
}

/// Whether a pool's models no longer desired on a backend should be evicted
/// there — left as a policy choice. Default is `Keep`: the Runtime Engine
/// only ever adds download jobs, never destructive ones, unless a caller
/// opts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    #[default]
    Keep,
    EvictUnused,
}

/// Owns the current [`Snapshot`] and runs the reconciliation cycle.
/// `ArcSwap` gives readers a lock-free, wait-free path to the
/// latest published value; the writer (this engine's own cycle) is the only
/// mutator, so there is never writer-writer contention to resolve.
pub struct RuntimeStateEngine {
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    observer: Arc<dyn BackendObserver>,
    snapshot: ArcSwap<Snapshot>,
    generation: AtomicU64,
    breaker: CircuitBreaker,
    eviction_policy: EvictionPolicy,
    concurrency: usize,
}

impl RuntimeStateEngine {
    pub fn new(store: Arc<dyn Store>, messenger: Arc<dyn Messenger>, observer: Arc<dyn BackendObserver>) -> Self {
        Self {
            store,
            messenger,
            observer,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            generation: AtomicU64::new(0),
            breaker: CircuitBreaker::new(DEFAULT_CIRCUIT_COOLDOWN),
            eviction_policy: EvictionPolicy::default(),
            concurrency: DEFAULT_RECONCILE_CONCURRENCY,
        }
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// A cheap, lock-free read of the current snapshot. Readers never block
    /// the writer and always see a consistent value for the instant they
    /// loaded it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Runs one reconciliation cycle, guarded by the circuit breaker. When
    /// the breaker is open this returns immediately without touching the
    /// Store or any backend.
    pub async fn reconcile_once(&self) -> Result<(), CoreError> {
        if !self.breaker.before_attempt() {
            debug!("runtime state engine: circuit breaker open, skipping cycle");
            return Ok(());
        }
        match self.run_cycle().await {
            Ok(()) => {
                self.breaker.record_success();
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }

    async fn run_cycle(&self) -> Result<(), CoreError> {
        let backends = self.store.list_backends(crate::store::Cursor::new(None, i64::MAX)?).await.map_err(CoreError::from)?.items;
        let previous = self.snapshot.load_full();

        let desired_per_backend = self.desired_models(&backends).await?;

        let observed = stream::iter(backends.iter().cloned())
            .map(|backend| {
                let observer = self.observer.clone();
                let desired = desired_per_backend.get(&backend.id).cloned().unwrap_or_default();
                async move {
                    let result = observer.observe(&backend).await;
                    (backend, desired, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut states = HashMap::with_capacity(observed.len());
        let mut error_count = 0usize;

        for (backend, desired, result) in observed {
            let state = match result {
                Ok(Observation { pulled_models }) => {
                    self.emit_download_jobs(&backend, &desired, &pulled_models).await?;
                    LlmState { backend: backend.clone(), pulled_models, models_desired: desired, error: None }
                }
                Err(e) => {
                    error_count += 1;
                    warn!(backend_id = %backend.id, error = %e, "runtime state engine: backend observation failed");
                    let carried_forward = previous.get(&backend.id).map(|s| s.pulled_models.clone()).unwrap_or_default();
                    LlmState { backend: backend.clone(), pulled_models: carried_forward, models_desired: desired, error: Some(e.to_string()) }
                }
            };
            states.insert(backend.id.clone(), state);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Snapshot { generation, states };
        self.snapshot.store(Arc::new(snapshot));

        let summary = StateUpdatedSummary { generation, backend_count: backends.len(), error_count };
        info!(generation, backend_count = backends.len(), error_count, "runtime state engine: cycle complete");
        if let Ok(payload) = serde_json::to_vec(&summary) {
            self.messenger.publish(subjects::STATE_UPDATED, payload).await;
        }
        Ok(())
    }

    /// Desired model set per backend: the union of every pool's models, over
    /// the pools that backend belongs to. A backend participates in request
    /// routing only if it belongs to at least one pool.
    async fn desired_models(&self, backends: &[Backend]) -> Result<HashMap<String, Vec<String>>, CoreError> {
        let mut desired = HashMap::with_capacity(backends.len());
        for backend in backends {
            let pool_ids = self.store.pools_for_backend(&backend.id).await.map_err(CoreError::from)?;
            let mut models = Vec::new();
            for pool_id in pool_ids {
                models.extend(self.store.models_in_pool(&pool_id).await.map_err(CoreError::from)?);
            }
            models.sort();
            models.dedup();
            desired.insert(backend.id.clone(), models);
        }
        Ok(desired)
    }

    /// Diffs desired vs observed for one backend and appends `model_download`
    /// jobs for whatever is missing. Eviction of observed-but-undesired
    /// models only happens under [`EvictionPolicy::EvictUnused`] — left
    /// unimplemented here since the actual removal call is an external,
    /// backend-specific operation this crate does not define.
    async fn emit_download_jobs(&self, backend: &Backend, desired: &[String], pulled: &[String]) -> Result<(), CoreError> {
        for model in desired {
            if !pulled.contains(model) {
                let job = crate::domain::Job::new(
                    uuid::Uuid::new_v4().to_string(),
                    subjects::MODEL_DOWNLOAD,
                    "pull",
                    model.clone(),
                    serde_json::to_vec(&DownloadJob::new(uuid::Uuid::new_v4().to_string(), model.clone(), backend.base_url.clone()))
                        .map_err(|e| CoreError::Other(e.into()))?,
                );
                self.store.append_job(job).await.map_err(CoreError::from)?;
            }
        }
        if self.eviction_policy == EvictionPolicy::EvictUnused {
            debug!(backend_id = %backend.id, "runtime state engine: eviction policy enabled but no evict action is defined by this crate");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pool, PurposeType};
    use crate::messenger::InMemoryMessenger;
    use crate::store::InMemoryStore;

    async fn backend_in_pool(store: &InMemoryStore, backend_id: &str, pool_id: &str, model_ids: &[&str]) {
        store.put_backend(Backend::new(backend_id, backend_id, "http://localhost:11434", "ollama")).await.unwrap();
        store.put_pool(Pool::new(pool_id, pool_id, PurposeType::General)).await.unwrap();
        store.add_backend_to_pool(pool_id, backend_id).await.unwrap();
        for model_id in model_ids {
            store.put_model(crate::domain::Model::new(*model_id, *model_id, 4096, true, true, false, false).unwrap()).await.unwrap();
            store.add_model_to_pool(pool_id, model_id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn reconcile_emits_download_job_for_missing_model() {
        let store = Arc::new(InMemoryStore::new());
        backend_in_pool(&store, "b1", "p1", &["llama3"]).await;
        let messenger = Arc::new(InMemoryMessenger::new());
        let observer = Arc::new(MockBackendObserver::always_reporting(vec![]));
        let engine = RuntimeStateEngine::new(store.clone(), messenger, observer);

        engine.reconcile_once().await.unwrap();

        let jobs = store.pending_jobs_of_type(subjects::MODEL_DOWNLOAD).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].subject, "llama3");
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_with_unchanged_inputs() {
        let store = Arc::new(InMemoryStore::new());
        backend_in_pool(&store, "b1", "p1", &["llama3"]).await;
        let messenger = Arc::new(InMemoryMessenger::new());
        let observer = Arc::new(MockBackendObserver::always_reporting(vec!["llama3".into()]));
        let engine = RuntimeStateEngine::new(store, messenger, observer);

        engine.reconcile_once().await.unwrap();
        let first = engine.snapshot();
        engine.reconcile_once().await.unwrap();
        let second = engine.snapshot();

        assert!(second.generation > first.generation);
        assert_eq!(first.get("b1").unwrap().pulled_models, second.get("b1").unwrap().pulled_models);
    }

    #[tokio::test]
    async fn backend_observation_failure_carries_forward_last_pulled_list() {
        let store = Arc::new(InMemoryStore::new());
        backend_in_pool(&store, "b1", "p1", &["llama3"]).await;
        let messenger = Arc::new(InMemoryMessenger::new());
        let observer = Arc::new(MockBackendObserver::always_reporting(vec!["llama3".into()]));
        let engine = RuntimeStateEngine::new(store, messenger, observer.clone());
        engine.reconcile_once().await.unwrap();

        observer.fail_next();
        engine.reconcile_once().await.unwrap();
        let snapshot = engine.snapshot();
        let state = snapshot.get("b1").unwrap();
        assert!(state.error.is_some());
        assert_eq!(state.pulled_models, vec!["llama3".to_string()]);
    }

    #[tokio::test]
    async fn snapshot_generation_is_monotonic_across_reads() {
        let store = Arc::new(InMemoryStore::new());
        backend_in_pool(&store, "b1", "p1", &[]).await;
        let messenger = Arc::new(InMemoryMessenger::new());
        let observer = Arc::new(MockBackendObserver::always_reporting(vec![]));
        let engine = RuntimeStateEngine::new(store, messenger, observer);

        engine.reconcile_once().await.unwrap();
        let s1 = engine.snapshot();
        engine.reconcile_once().await.unwrap();
        let s2 = engine.snapshot();
        assert!(s2.generation >= s1.generation);
    }
}
