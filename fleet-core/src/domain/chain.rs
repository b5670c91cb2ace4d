//! `ChainDefinition` and friends: the persisted, serializable description of
//! a task chain that the Task Engine interprets.
//!
//! `ChainTask.task_type` plus the type-specific optional fields is a sum
//! type, modelled here as a single enum carrying its variant-specific data,
//! with one dispatch site in [`crate::engine`], rather than as a trait-object
//! hierarchy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sentinel `goto` target meaning "chain execution is complete".
pub const END: &str = "end";

/// A directed graph of tasks with typed, conditional edges. Stored under KV
/// key `chain:<id>` as its JSON encoding.
///
/// Invariants (checked by [`crate::engine::validate_chain`]): exactly one
/// entry point (the first task in `tasks`); every `goto` references an
/// existing task id or [`END`]; no infinite loop without a retry bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub id: String,
    pub description: String,
    pub tasks: Vec<ChainTask>,
}

impl ChainDefinition {
    /// The chain's single entry point: the first task in declaration order.
    pub fn entry_task(&self) -> Option<&ChainTask> {
        self.tasks.first()
    }

    pub fn task(&self, id: &str) -> Option<&ChainTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// One node in a chain. `task_type`-specific fields are `Option` because only
/// the matching variant populates them; [`crate::engine::run_task`] is the
/// single dispatch site that reads the right field for the declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTask {
    pub id: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub input_var: Option<String>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub execute_config: Option<ExecuteConfig>,
    #[serde(default)]
    pub hook: Option<HookCall>,
    pub transition: TaskTransition,
    /// Retry budget for `ErrTransient` failures. Default 0 (no retry).
    #[serde(default)]
    pub retry_on_error: u32,
    /// When true, the engine also logs the rendered output at info level
    /// (debugging aid; has no effect on transitions or captured state).
    #[serde(default)]
    pub print: bool,
}

/// The dispatchable kind of a [`ChainTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ModelExecution,
    Hook,
    PromptToString,
    ParseNumber,
    RawString,
    RaiseError,
}

/// Constraints handed to the Model Resolver for a `ModelExecution` /
/// `PromptToString` / `ParseNumber` task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteConfig {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub providers: Vec<String>,
}

/// A `Hook` task's call: a named hook type plus a flat string-to-string
/// argument map, kept serializable and stable across processes — hook calls
/// are message passing, not an in-process RPC contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookCall {
    pub hook_type: String,
    #[serde(default)]
    pub args: HashMap<String, String>,
}

/// A task's outgoing edges: an ordered list of branches plus an optional
/// error transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskTransition {
    pub branches: Vec<TransitionBranch>,
    #[serde(default)]
    pub on_failure: Option<String>,
}

/// One conditional edge. Branches are evaluated in declaration order; the
/// first match wins; `Default` matches unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionBranch {
    pub operator: TransitionOperator,
    #[serde(default)]
    pub when: Option<String>,
    pub goto: String,
}

/// Comparison operator for a [`TransitionBranch`].
///
/// Numeric operators (`GreaterThan`, `LessThan`) parse both sides as decimal;
/// string operators compare the rendered string form of the task's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    Default,
}
