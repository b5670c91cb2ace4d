//! Entity Store: transactional persistence for Backends, Models, Pools,
//! Jobs, messages, and ChainDefinitions.
//!
//! This is an external collaborator: CRUD over each persisted entity,
//! transactional `with_transaction`, cursor-based pagination `(createdAt,
//! limit)`, typed not-found errors. Idempotent create semantics are not
//! assumed — callers detect duplicates by unique key. This module specifies
//! the contract (the `Store` trait) and a simple in-memory reference
//! implementation: `RwLock<HashMap>` keyed storage with namespace-style
//! prefix listing, and transactional read-filter-write for job removal.

mod in_memory;
mod pagination;

pub use in_memory::InMemoryStore;
pub use pagination::{Cursor, Page};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Backend, ChainDefinition, Job, Model, Pool};

/// Local error type for the Store contract; converts to `CoreError::NotFound`
/// / `CoreError::Unprocessable` at call sites via `From`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("immutable: {0}")]
    Immutable(String),
    #[error("storage: {0}")]
    Storage(String),
}

impl From<StoreError> for crate::error::CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => crate::error::CoreError::NotFound(m),
            StoreError::InvalidPagination(m) => crate::error::CoreError::Unprocessable(m),
            StoreError::DuplicateKey(m) => crate::error::CoreError::BadRequest(m),
            StoreError::Immutable(m) => crate::error::CoreError::Immutable(m),
            StoreError::Storage(m) => crate::error::CoreError::Other(anyhow::anyhow!(m)),
        }
    }
}

/// Transactional persistence over the entities this crate's subsystems read
/// and write. All CRUD methods are per-entity; `with_transaction` wraps a
/// closure so callers (e.g. the Download Manager's `remove(model)`
/// read-filter-write) get atomicity without the trait exposing a raw
/// transaction handle type.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Backends ---
    async fn put_backend(&self, backend: Backend) -> Result<(), StoreError>;
    async fn get_backend(&self, id: &str) -> Result<Backend, StoreError>;
    async fn list_backends(&self, cursor: Cursor) -> Result<Page<Backend>, StoreError>;
    async fn delete_backend(&self, id: &str) -> Result<(), StoreError>;

    // --- Models ---
    async fn put_model(&self, model: Model) -> Result<(), StoreError>;
    async fn get_model(&self, id: &str) -> Result<Model, StoreError>;
    async fn list_models(&self, cursor: Cursor) -> Result<Page<Model>, StoreError>;
    async fn delete_model(&self, id: &str) -> Result<(), StoreError>;

    // --- Pools ---
    async fn put_pool(&self, pool: Pool) -> Result<(), StoreError>;
    async fn get_pool(&self, id: &str) -> Result<Pool, StoreError>;
    async fn list_pools(&self, cursor: Cursor) -> Result<Page<Pool>, StoreError>;
    async fn delete_pool(&self, id: &str) -> Result<(), StoreError>;

    /// Pool↔backend membership.
    async fn add_backend_to_pool(&self, pool_id: &str, backend_id: &str) -> Result<(), StoreError>;
    async fn remove_backend_from_pool(&self, pool_id: &str, backend_id: &str) -> Result<(), StoreError>;
    async fn backends_in_pool(&self, pool_id: &str) -> Result<Vec<String>, StoreError>;
    async fn pools_for_backend(&self, backend_id: &str) -> Result<Vec<String>, StoreError>;

    /// Pool↔model membership.
    async fn add_model_to_pool(&self, pool_id: &str, model_id: &str) -> Result<(), StoreError>;
    async fn remove_model_from_pool(&self, pool_id: &str, model_id: &str) -> Result<(), StoreError>;
    async fn models_in_pool(&self, pool_id: &str) -> Result<Vec<String>, StoreError>;
    async fn pools_for_model(&self, model_id: &str) -> Result<Vec<String>, StoreError>;

    // --- Jobs ---
    async fn append_job(&self, job: Job) -> Result<(), StoreError>;
    /// Dequeues the oldest pending job of `task_type`, atomically.
    async fn pop_job_for_type(&self, task_type: &str) -> Result<Option<Job>, StoreError>;
    async fn get_job(&self, id: &str) -> Result<Job, StoreError>;
    async fn update_job(&self, job: Job) -> Result<(), StoreError>;
    async fn delete_job(&self, id: &str) -> Result<(), StoreError>;
    /// All pending jobs of `task_type`, in FIFO order — used by the Download
    /// Manager's `remove(model)` read-filter-write.
    async fn pending_jobs_of_type(&self, task_type: &str) -> Result<Vec<Job>, StoreError>;

    /// Atomically drops every pending job of `task_type` matching `predicate`
    /// and leaves the rest in place, without a pop-all/re-append race window.
    ///
    /// The naive "pop all queued jobs, filter, re-append the rest" sequence
    /// is starvable under contention; this primitive avoids that. The
    /// in-memory implementation performs it under one write-lock acquisition
    /// (see [`InMemoryStore`]); a production Store would run it as a single
    /// `DELETE ... WHERE` statement inside one transaction.
    async fn delete_pending_jobs_where(
        &self,
        task_type: &str,
        predicate: &(dyn Fn(&Job) -> bool + Send + Sync),
    ) -> Result<usize, StoreError>;

    // --- ChainDefinitions ---
    async fn set_chain_definition(&self, chain: ChainDefinition) -> Result<(), StoreError>;
    async fn get_chain_definition(&self, id: &str) -> Result<ChainDefinition, StoreError>;
    async fn list_chain_definitions(&self) -> Result<Vec<ChainDefinition>, StoreError>;
}
