//! # fleet-core
//!
//! Control plane and execution runtime for a fleet of LLM inference backends:
//! reconciliation, model resolution, task-chain interpretation, and
//! job/download queues.
//!
//! The hard engineering lives in four tightly coupled subsystems:
//!
//! - [`runtime_state`]: reconciles desired backends/models/pools against what
//!   each remote server actually reports, driving model-pull jobs and a
//!   queryable, generationally-ordered [`runtime_state::Snapshot`].
//! - [`resolver`]: selects a concrete `(provider, model, backend)` triple per
//!   request, by capability, context length, and preference order.
//! - [`engine`]: a deterministic interpreter for [`domain::ChainDefinition`]s
//!   — model calls, hooks, and typed conditional transitions.
//! - [`job_queue`] and [`download`]: a leased, retry-bounded job queue plus a
//!   model-pull queue with progress streaming and cooperative cancellation.
//!
//! These sit on three external collaborators this crate specifies contracts
//! for but does not own the implementation of: [`store`] (transactional
//! persistence), [`messenger`] (publish/subscribe and request/reply), and
//! [`activity`] (the append-only event log). [`hooks`] and [`provider`] round
//! out the picture: named side-effectful chain steps, and a uniform
//! capability-tagged client over a remote inference server.
//!
//! ## Data flow
//!
//! A request enters through an external boundary, the Task Engine loads a
//! chain from the Store, and for each task either invokes a Hook or asks the
//! Resolver for a client against the current runtime snapshot. Provider
//! Adapters talk to remote inference servers; intermediate values travel
//! along typed edges; the Activity Sink records each step keyed by a request
//! id. Background loops drive the Runtime State Engine's reconciliation cycle
//! and the Job Queue's lease sweeper; the Download Manager consumes the
//! model-pull jobs the Runtime State Engine produces.
//!
//! ## Out of scope
//!
//! HTTP routing and OpenAPI generation, CLI/version tooling, authentication
//! middleware, OpenAI-wire-format translation, message ingesters, the vector
//! store, the tokenizer, and the concrete Store/Activity Sink/Messenger
//! implementations a deployment plugs in. This crate specifies their
//! contracts and ships in-memory reference implementations for tests.

pub mod activity;
pub mod circuit_breaker;
pub mod domain;
pub mod download;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod job_queue;
pub mod messenger;
pub mod provider;
pub mod resolver;
pub mod runtime_state;
pub mod store;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use domain::{
    Backend, ChainDefinition, ChainTask, DataType, DownloadJob, DownloadProgress, DownloadState,
    ExecuteConfig, HookCall, Job, JobStatus, Lease, Model, Pool, PoolId, PurposeType,
    TaskTransition, TaskType, TransitionBranch, TransitionOperator, TypedValue, DEFAULT_MAX_RETRIES,
};
pub use download::{DownloadManager, DownloadProgressEvent, ModelPuller, PullError};
pub use engine::{validate_chain, TaskEngine};
pub use error::CoreError;
pub use hooks::{HookOutcome, HookRegistry, HookRepo, HookStatus};
pub use job_queue::{DeadJob, JobQueue};
pub use messenger::{subjects, InMemoryMessenger, Messenger, MessengerError, Subscription};
pub use provider::{ChatMessage, Metrics, Provider, ProviderBackend, ProviderError};
pub use resolver::{Operation, ResolveRequest, ResolvedProvider, Resolver};
pub use runtime_state::{EvictionPolicy, LlmState, RuntimeStateEngine, Snapshot};
pub use store::{Cursor, InMemoryStore, Page, Store, StoreError};
pub use activity::{ActivityEvent, ActivitySink, CapturedStateUnit, InMemoryActivitySink};
