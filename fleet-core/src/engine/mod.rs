//! Task Engine — the centerpiece: a deterministic interpreter over a
//! [`crate::domain::ChainDefinition`].
//!
//! A `ready → running → done` state machine stepping over tasks, threading
//! typed output forward as the next task's input, with per-task retry
//! accounting and `tokio::time::timeout`-wrapped model/hook calls.

pub mod logging;
pub mod template;
pub mod transitions;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::activity::{ActivitySink, CapturedStateUnit};
use crate::domain::{ChainDefinition, ChainTask, DataType, ExecuteConfig, TaskType, TypedValue, END};
use crate::error::CoreError;
use crate::hooks::HookRegistry;
use crate::provider::ChatMessage;
use crate::resolver::{Operation, ResolveRequest, Resolver};
use crate::runtime_state::Snapshot;

/// Runaway-chain backstop. Structural cycles are still allowed by
/// [`validate_chain`] — this counter, not cycle detection, is what actually
/// guarantees every execution halts.
pub const DEFAULT_MAX_HOPS: u32 = 1000;

/// Soft timeout for a model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Soft timeout for a hook call.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Checks the structural invariants a [`ChainDefinition`] must hold:
/// exactly one entry task, and every `goto` (including `on_failure` edges)
/// names either an existing task id or [`END`]. Does not attempt full cycle
/// detection — [`DEFAULT_MAX_HOPS`] is the termination guarantee for chains
/// that do loop.
pub fn validate_chain(chain: &ChainDefinition) -> Result<(), CoreError> {
    if chain.tasks.is_empty() {
        return Err(CoreError::BadRequest(format!("chain {} has no tasks", chain.id)));
    }
    for task in &chain.tasks {
        for branch in &task.transition.branches {
            check_goto(chain, &task.id, &branch.goto)?;
        }
        if let Some(on_failure) = &task.transition.on_failure {
            check_goto(chain, &task.id, on_failure)?;
        }
    }
    Ok(())
}

fn check_goto(chain: &ChainDefinition, from: &str, goto: &str) -> Result<(), CoreError> {
    if goto == END || chain.task(goto).is_some() {
        Ok(())
    } else {
        Err(CoreError::BadRequest(format!("task {from} transitions to unknown task id {goto}")))
    }
}

/// One task's successful result: the typed output carried forward, the raw
/// upstream text (if any), and an optional routing hint that overrides the
/// output for transition matching (a hook's `transitionTag`).
struct TaskSuccess {
    output: TypedValue,
    raw_response: Option<String>,
    transition_tag: Option<String>,
}

/// The Task Engine: a deterministic interpreter for [`ChainDefinition`]s.
/// Stateless across executions — all per-run state is local to
/// [`Self::exec_env`].
pub struct TaskEngine {
    resolver: Arc<Resolver>,
    hooks: Arc<HookRegistry>,
    activity_sink: Arc<dyn ActivitySink>,
    max_hops: u32,
}

impl TaskEngine {
    pub fn new(resolver: Arc<Resolver>, hooks: Arc<HookRegistry>, activity_sink: Arc<dyn ActivitySink>) -> Self {
        Self { resolver, hooks, activity_sink, max_hops: DEFAULT_MAX_HOPS }
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// `ExecEnv(ctx, chain, input, inputType) -> (output, outputType, err)`.
    /// On `terminated(end)` returns the last done task's output;
    /// on `terminated(error)` returns the error, having already flushed the
    /// partial captured state to the Activity Sink keyed by `request_id`.
    pub async fn exec_env(&self, snapshot: &Snapshot, chain: &ChainDefinition, request_id: &str, input: TypedValue) -> Result<TypedValue, CoreError> {
        logging::log_chain_start(request_id, &chain.id);
        let mut task = chain.entry_task().ok_or_else(|| CoreError::BadRequest(format!("chain {} has no entry task", chain.id)))?;
        let mut current_input = input;
        let mut captured: Vec<CapturedStateUnit> = Vec::new();
        let mut hops: u32 = 0;

        loop {
            hops += 1;
            if hops > self.max_hops {
                let error = CoreError::HopLimit(format!("chain {} exceeded {} hops", chain.id, self.max_hops));
                self.flush(request_id, captured).await;
                logging::log_chain_error(request_id, &chain.id, &error);
                return Err(error);
            }

            logging::log_task_start(request_id, &task.id, hops);
            let started_at = Utc::now();

            if task.task_type == TaskType::RaiseError {
                let context = self.render_context(chain, &captured, &current_input, task);
                let message = template::render(task.prompt_template.as_deref().unwrap_or_default(), &context).map_err(|e| CoreError::BadRequest(e.to_string()))?;
                let error = CoreError::BadRequest(message.clone());
                captured.push(CapturedStateUnit {
                    task_id: task.id.clone(),
                    input: current_input.clone(),
                    output: None,
                    raw_response: None,
                    transition_taken: None,
                    error: Some(message),
                    started_at,
                    ended_at: Some(Utc::now()),
                });
                self.flush(request_id, captured).await;
                logging::log_chain_error(request_id, &chain.id, &error);
                return Err(error);
            }

            let context = self.render_context(chain, &captured, &current_input, task);
            let outcome = self.run_with_retries(task, &context, snapshot, &current_input, request_id).await;

            match outcome {
                Ok(success) => {
                    logging::log_task_complete(request_id, &task.id, &success.output, success.transition_tag.as_deref());
                    let routing_value = success.transition_tag.as_deref().map(TypedValue::string).unwrap_or_else(|| success.output.clone());
                    let goto = transitions::resolve(&task.transition.branches, &routing_value);

                    let transition_taken = match &goto {
                        Some(g) => Some(g.clone()),
                        None => task.transition.on_failure.clone(),
                    };

                    captured.push(CapturedStateUnit {
                        task_id: task.id.clone(),
                        input: current_input.clone(),
                        output: Some(success.output.clone()),
                        raw_response: success.raw_response,
                        transition_taken: transition_taken.clone(),
                        error: None,
                        started_at,
                        ended_at: Some(Utc::now()),
                    });

                    match transition_taken {
                        Some(next) if next == END => {
                            self.flush(request_id, captured).await;
                            logging::log_chain_done(request_id, &chain.id, hops);
                            return Ok(success.output);
                        }
                        Some(next) => {
                            task = chain.task(&next).ok_or_else(|| CoreError::NotFound(format!("chain {} has no task {next}", chain.id)))?;
                            current_input = success.output;
                        }
                        None => {
                            let error = CoreError::BadRequest(format!("task {} produced no matching transition and no on_failure", task.id));
                            self.flush(request_id, captured).await;
                            logging::log_chain_error(request_id, &chain.id, &error);
                            return Err(error);
                        }
                    }
                }
                Err(error) => {
                    captured.push(CapturedStateUnit {
                        task_id: task.id.clone(),
                        input: current_input.clone(),
                        output: None,
                        raw_response: None,
                        transition_taken: task.transition.on_failure.clone(),
                        error: Some(error.to_string()),
                        started_at,
                        ended_at: Some(Utc::now()),
                    });

                    match &task.transition.on_failure {
                        Some(next) => {
                            task = chain.task(next).ok_or_else(|| CoreError::NotFound(format!("chain {} has no task {next}", chain.id)))?;
                        }
                        None => {
                            self.flush(request_id, captured).await;
                            logging::log_chain_error(request_id, &chain.id, &error);
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Template context: `{input, <priorTaskId>: <its rendered output>, …,
    /// system}`.
    fn render_context(&self, _chain: &ChainDefinition, captured: &[CapturedStateUnit], current_input: &TypedValue, task: &ChainTask) -> HashMap<String, String> {
        let mut context: HashMap<String, String> = captured.iter().filter_map(|unit| unit.output.as_ref().map(|o| (unit.task_id.clone(), o.render_string()))).collect();
        context.insert("input".to_string(), current_input.render_string());
        context.insert("system".to_string(), task.system_instruction.clone().unwrap_or_default());
        context
    }

    /// Runs `task` once, retrying `CoreError::is_retryable` failures up to
    /// `task.retry_on_error` times.
    async fn run_with_retries(&self, task: &ChainTask, context: &HashMap<String, String>, snapshot: &Snapshot, current_input: &TypedValue, request_id: &str) -> Result<TaskSuccess, CoreError> {
        let mut attempt = 0u32;
        loop {
            match self.run_task(task, context, snapshot, current_input).await {
                Ok(success) => return Ok(success),
                Err(error) if error.is_retryable() && attempt < task.retry_on_error => {
                    attempt += 1;
                    logging::log_task_retry(request_id, &task.id, attempt, &error);
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Single dispatch site over [`TaskType`]'s tagged variants.
    async fn run_task(&self, task: &ChainTask, context: &HashMap<String, String>, snapshot: &Snapshot, current_input: &TypedValue) -> Result<TaskSuccess, CoreError> {
        match task.task_type {
            TaskType::ModelExecution => {
                let (reply, raw) = self.call_model(task, context, snapshot).await?;
                let output = TypedValue::json(serde_json::json!({"role": "assistant", "content": reply}));
                Ok(TaskSuccess { output: TypedValue { data_type: DataType::ChatHistory, ..output }, raw_response: Some(raw), transition_tag: None })
            }
            TaskType::PromptToString => {
                let (reply, raw) = self.call_model(task, context, snapshot).await?;
                Ok(TaskSuccess { output: TypedValue::string(reply), raw_response: Some(raw), transition_tag: None })
            }
            TaskType::ParseNumber => {
                let (reply, raw) = self.call_model(task, context, snapshot).await?;
                let parsed: f64 = reply.trim().parse().map_err(|e| CoreError::BadRequest(format!("ParseNumber: {e}")))?;
                Ok(TaskSuccess { output: TypedValue::number(parsed), raw_response: Some(raw), transition_tag: None })
            }
            TaskType::RawString => {
                let rendered = template::render(task.prompt_template.as_deref().unwrap_or_default(), context).map_err(|e| CoreError::BadRequest(e.to_string()))?;
                Ok(TaskSuccess { output: TypedValue::string(rendered), raw_response: None, transition_tag: None })
            }
            TaskType::Hook => self.call_hook(task, current_input).await,
            TaskType::RaiseError => unreachable!("RaiseError is handled before dispatch"),
        }
    }

    async fn call_model(&self, task: &ChainTask, context: &HashMap<String, String>, snapshot: &Snapshot) -> Result<(String, String), CoreError> {
        let template_str = task.prompt_template.as_deref().ok_or_else(|| CoreError::BadRequest(format!("task {} has no prompt_template", task.id)))?;
        let prompt = template::render(template_str, context).map_err(|e| CoreError::BadRequest(e.to_string()))?;
        let system = task.system_instruction.as_deref().map(|s| template::render(s, context)).transpose().map_err(|e| CoreError::BadRequest(e.to_string()))?;

        let ExecuteConfig { models, providers } = task.execute_config.clone().unwrap_or_default();
        let request = ResolveRequest { provider_types: providers, model_names: models, context_length: 0 };
        let resolved = self.resolver.resolve(snapshot, Operation::Chat, &request).await?;
        let conn = resolved.provider.get_chat_connection(&resolved.base_url)?;

        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let (reply, _metrics) = tokio::time::timeout(DEFAULT_MODEL_TIMEOUT, conn.chat(&messages))
            .await
            .map_err(|_| CoreError::Transient(format!("task {}: model call timed out", task.id)))??;
        Ok((reply.trim().to_string(), reply))
    }

    async fn call_hook(&self, task: &ChainTask, current_input: &TypedValue) -> Result<TaskSuccess, CoreError> {
        let call = task.hook.as_ref().ok_or_else(|| CoreError::BadRequest(format!("task {} has no hook call", task.id)))?;
        let outcome = tokio::time::timeout(DEFAULT_HOOK_TIMEOUT, self.hooks.exec(&call.hook_type, Utc::now(), current_input, current_input.data_type, &task.transition, call))
            .await
            .map_err(|_| CoreError::Transient(format!("task {}: hook call timed out", task.id)))??;

        if outcome.status == crate::hooks::HookStatus::Error {
            return Err(CoreError::HookFailed(outcome.error.unwrap_or_else(|| format!("hook {} failed", call.hook_type))));
        }
        Ok(TaskSuccess { output: outcome.output, raw_response: None, transition_tag: outcome.transition_tag })
    }

    async fn flush(&self, request_id: &str, captured: Vec<CapturedStateUnit>) {
        self.activity_sink.record_captured_state(request_id, captured).await;
    }
}
