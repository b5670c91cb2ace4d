//! Hook Registry: a `hook.type → HookRepo` map the Task Engine dispatches
//! `Hook` tasks through.
//!
//! Follows the same named-implementation-registry shape as a tool dispatcher:
//! the dispatch key is a hook type string, and the call arguments are a flat
//! string map rather than a typed schema — hook calls are message passing,
//! not an RPC contract.

pub mod args;
mod search_knowledge;

pub use search_knowledge::{SearchHit, SearchKnowledgeHook, VectorSearchBackend};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{DataType, HookCall, TaskTransition, TypedValue};
use crate::error::CoreError;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("unknown hook type: {0}")]
    UnknownHookType(String),
    #[error("hook {hook_type} failed: {message}")]
    Failed { hook_type: String, message: String },
}

impl From<HookError> for CoreError {
    fn from(e: HookError) -> Self {
        match e {
            HookError::UnknownHookType(t) => CoreError::BadRequest(format!("unknown hook type: {t}")),
            HookError::Failed { hook_type, message } => CoreError::HookFailed(format!("{hook_type}: {message}")),
        }
    }
}

/// Mirrors the Task Engine's own done/error split: `Error` status or a
/// non-empty `error` routes to the task's `on_failure` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Ok,
    Error,
}

/// A hook's result — the Task Engine reads `status`/`error` to decide whether
/// to route to the task's normal transition or its `on_failure` edge, and
/// threads `output`/`output_type` into captured state and the next task's
/// input the same way a `ModelExecution` task's result would be.
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub status: HookStatus,
    pub output: TypedValue,
    pub output_type: DataType,
    pub transition_tag: Option<String>,
    pub error: Option<String>,
}

impl HookOutcome {
    pub fn ok(output: TypedValue) -> Self {
        let output_type = output.data_type;
        Self { status: HookStatus::Ok, output, output_type, transition_tag: None, error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: HookStatus::Error,
            output: TypedValue::string(""),
            output_type: DataType::String,
            transition_tag: None,
            error: Some(message.into()),
        }
    }
}

/// One hook implementation.
#[async_trait]
pub trait HookRepo: Send + Sync {
    /// The hook type strings this implementation answers to.
    fn supports(&self) -> Vec<String>;

    async fn exec(&self, start_time: DateTime<Utc>, input: &TypedValue, input_type: DataType, transition: &TaskTransition, call: &HookCall) -> HookOutcome;
}

/// Maps `hook.type` to its [`HookRepo`], built up at startup by whichever
/// binary embeds this crate. The vector store itself is out of scope here;
/// this registry is the seam a deployment plugs one into.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn HookRepo>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` under every type it declares support for.
    pub fn register(&mut self, hook: Arc<dyn HookRepo>) {
        for hook_type in hook.supports() {
            self.hooks.insert(hook_type, hook.clone());
        }
    }

    pub async fn exec(&self, hook_type: &str, start_time: DateTime<Utc>, input: &TypedValue, input_type: DataType, transition: &TaskTransition, call: &HookCall) -> Result<HookOutcome, HookError> {
        let hook = self.hooks.get(hook_type).ok_or_else(|| HookError::UnknownHookType(hook_type.to_string()))?;
        Ok(hook.exec(start_time, input, input_type, transition, call).await)
    }
}
