//! In-memory `Store`. Not persistent; used by tests and as a development
//! default: one `RwLock`-guarded map per entity kind, keyed by id.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Backend, ChainDefinition, Job, JobStatus, Model, Pool};

use super::{Cursor, Page, Store, StoreError};

#[derive(Default)]
struct State {
    backends: HashMap<String, Backend>,
    models: HashMap<String, Model>,
    pools: HashMap<String, Pool>,
    pool_backends: HashMap<String, HashSet<String>>,
    pool_models: HashMap<String, HashSet<String>>,
    jobs: HashMap<String, Job>,
    chains: HashMap<String, ChainDefinition>,
}

/// In-memory `Store`. All state lives behind one lock so the atomic
/// operations the contract promises (`pop_job_for_type`,
/// `delete_pending_jobs_where`) are trivially serializable: only one task
/// holds the write guard at a time.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn paginate<T: Clone>(items: &HashMap<String, T>, created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>, cursor: Cursor) -> Page<T> {
        let mut sorted: Vec<&T> = items.values().collect();
        sorted.sort_by_key(|v| created_at(v));
        let mut filtered: Vec<&T> = match cursor.after {
            Some(after) => sorted.into_iter().filter(|v| created_at(v) > after).collect(),
            None => sorted,
        };
        let limit = cursor.limit as usize;
        let next = if filtered.len() > limit {
            let cut_at = created_at(filtered[limit - 1]);
            Some(Cursor { after: Some(cut_at), limit: cursor.limit })
        } else {
            None
        };
        filtered.truncate(limit);
        Page {
            items: filtered.into_iter().cloned().collect(),
            next,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put_backend(&self, backend: Backend) -> Result<(), StoreError> {
        self.state.write().await.backends.insert(backend.id.clone(), backend);
        Ok(())
    }

    async fn get_backend(&self, id: &str) -> Result<Backend, StoreError> {
        self.state
            .read()
            .await
            .backends
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("backend {id}")))
    }

    async fn list_backends(&self, cursor: Cursor) -> Result<Page<Backend>, StoreError> {
        let state = self.state.read().await;
        Ok(Self::paginate(&state.backends, |b| b.created_at, cursor))
    }

    async fn delete_backend(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.backends.remove(id).ok_or_else(|| StoreError::NotFound(format!("backend {id}")))?;
        for members in state.pool_backends.values_mut() {
            members.remove(id);
        }
        Ok(())
    }

    async fn put_model(&self, model: Model) -> Result<(), StoreError> {
        self.state.write().await.models.insert(model.id.clone(), model);
        Ok(())
    }

    async fn get_model(&self, id: &str) -> Result<Model, StoreError> {
        self.state.read().await.models.get(id).cloned().ok_or_else(|| StoreError::NotFound(format!("model {id}")))
    }

    async fn list_models(&self, cursor: Cursor) -> Result<Page<Model>, StoreError> {
        let state = self.state.read().await;
        Ok(Self::paginate(&state.models, |m| m.created_at, cursor))
    }

    async fn delete_model(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.models.remove(id).ok_or_else(|| StoreError::NotFound(format!("model {id}")))?;
        for members in state.pool_models.values_mut() {
            members.remove(id);
        }
        Ok(())
    }

    async fn put_pool(&self, pool: Pool) -> Result<(), StoreError> {
        self.state.write().await.pools.insert(pool.id.clone(), pool);
        Ok(())
    }

    async fn get_pool(&self, id: &str) -> Result<Pool, StoreError> {
        self.state.read().await.pools.get(id).cloned().ok_or_else(|| StoreError::NotFound(format!("pool {id}")))
    }

    async fn list_pools(&self, cursor: Cursor) -> Result<Page<Pool>, StoreError> {
        let state = self.state.read().await;
        Ok(Self::paginate(&state.pools, |p| p.created_at, cursor))
    }

    async fn delete_pool(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.pools.get(id).map(|p| p.is_reserved()).unwrap_or(false) {
            return Err(StoreError::Immutable(format!("pool {id} is reserved and cannot be deleted")));
        }
        state.pools.remove(id).ok_or_else(|| StoreError::NotFound(format!("pool {id}")))?;
        state.pool_backends.remove(id);
        state.pool_models.remove(id);
        Ok(())
    }

    async fn add_backend_to_pool(&self, pool_id: &str, backend_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.backends.contains_key(backend_id) {
            return Err(StoreError::NotFound(format!("backend {backend_id}")));
        }
        if !state.pools.contains_key(pool_id) {
            return Err(StoreError::NotFound(format!("pool {pool_id}")));
        }
        state.pool_backends.entry(pool_id.to_string()).or_default().insert(backend_id.to_string());
        Ok(())
    }

    async fn remove_backend_from_pool(&self, pool_id: &str, backend_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(members) = state.pool_backends.get_mut(pool_id) {
            members.remove(backend_id);
        }
        Ok(())
    }

    async fn backends_in_pool(&self, pool_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.state.read().await.pool_backends.get(pool_id).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn pools_for_backend(&self, backend_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .pool_backends
            .iter()
            .filter(|(_, members)| members.contains(backend_id))
            .map(|(pool_id, _)| pool_id.clone())
            .collect())
    }

    async fn add_model_to_pool(&self, pool_id: &str, model_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.models.contains_key(model_id) {
            return Err(StoreError::NotFound(format!("model {model_id}")));
        }
        if !state.pools.contains_key(pool_id) {
            return Err(StoreError::NotFound(format!("pool {pool_id}")));
        }
        state.pool_models.entry(pool_id.to_string()).or_default().insert(model_id.to_string());
        Ok(())
    }

    async fn remove_model_from_pool(&self, pool_id: &str, model_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(members) = state.pool_models.get_mut(pool_id) {
            members.remove(model_id);
        }
        Ok(())
    }

    async fn models_in_pool(&self, pool_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.state.read().await.pool_models.get(pool_id).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn pools_for_model(&self, model_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .pool_models
            .iter()
            .filter(|(_, members)| members.contains(model_id))
            .map(|(pool_id, _)| pool_id.clone())
            .collect())
    }

    async fn append_job(&self, job: Job) -> Result<(), StoreError> {
        self.state.write().await.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn pop_job_for_type(&self, task_type: &str) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.write().await;
        let oldest_id = state
            .jobs
            .values()
            .filter(|j| j.task_type == task_type && j.status == JobStatus::Pending)
            .min_by_key(|j| j.created_at)
            .map(|j| j.id.clone());
        match oldest_id {
            Some(id) => {
                let mut job = state.jobs.remove(&id).expect("id from this state");
                job.status = JobStatus::Leased;
                state.jobs.insert(id, job.clone());
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn get_job(&self, id: &str) -> Result<Job, StoreError> {
        self.state.read().await.jobs.get(id).cloned().ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }

    async fn update_job(&self, job: Job) -> Result<(), StoreError> {
        self.state.write().await.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn delete_job(&self, id: &str) -> Result<(), StoreError> {
        self.state.write().await.jobs.remove(id).ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        Ok(())
    }

    async fn pending_jobs_of_type(&self, task_type: &str) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state.jobs.values().filter(|j| j.task_type == task_type && j.status == JobStatus::Pending).cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn delete_pending_jobs_where(&self, task_type: &str, predicate: &(dyn Fn(&Job) -> bool + Send + Sync)) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let to_remove: Vec<String> = state
            .jobs
            .values()
            .filter(|j| j.task_type == task_type && j.status == JobStatus::Pending && predicate(j))
            .map(|j| j.id.clone())
            .collect();
        for id in &to_remove {
            state.jobs.remove(id);
        }
        Ok(to_remove.len())
    }

    async fn set_chain_definition(&self, chain: ChainDefinition) -> Result<(), StoreError> {
        self.state.write().await.chains.insert(chain.id.clone(), chain);
        Ok(())
    }

    async fn get_chain_definition(&self, id: &str) -> Result<ChainDefinition, StoreError> {
        self.state.read().await.chains.get(id).cloned().ok_or_else(|| StoreError::NotFound(format!("chain {id}")))
    }

    async fn list_chain_definitions(&self) -> Result<Vec<ChainDefinition>, StoreError> {
        Ok(self.state.read().await.chains.values().cloned().collect())
    }
}
