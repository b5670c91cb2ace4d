//! Data model: the entities owned by the Store, the runtime-only
//! snapshot owned by the Runtime State Engine, and the typed values that flow
//! along chain edges.

mod backend;
mod chain;
mod job;
pub mod pool;
mod typed_value;

pub use backend::Backend;
pub use chain::{ChainDefinition, ChainTask, ExecuteConfig, HookCall, TaskTransition, TaskType, TransitionBranch, TransitionOperator, END};
pub use job::{DownloadJob, DownloadProgress, DownloadState, Job, JobStatus, Lease, DEFAULT_MAX_RETRIES};
pub use pool::{Model, Pool, PoolId, PurposeType};
pub use typed_value::{DataType, TypedValue};
