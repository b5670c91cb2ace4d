//! Structured logging for chain execution: one free function per execution
//! event rather than inline `tracing::` calls scattered through [`super`].

use crate::domain::TypedValue;
use crate::error::CoreError;

pub fn log_task_start(request_id: &str, task_id: &str, hop: u32) {
    tracing::debug!(request_id, task_id, hop, "task execution start");
}

pub fn log_task_complete(request_id: &str, task_id: &str, output: &TypedValue, transition_taken: Option<&str>) {
    tracing::debug!(request_id, task_id, data_type = ?output.data_type, transition_taken, "task execution complete");
}

pub fn log_task_retry(request_id: &str, task_id: &str, attempt: u32, error: &CoreError) {
    tracing::warn!(request_id, task_id, attempt, %error, "task retrying after transient error");
}

pub fn log_chain_start(request_id: &str, chain_id: &str) {
    tracing::info!(request_id, chain_id, "chain execution start");
}

pub fn log_chain_done(request_id: &str, chain_id: &str, hops: u32) {
    tracing::info!(request_id, chain_id, hops, "chain execution complete");
}

pub fn log_chain_error(request_id: &str, chain_id: &str, error: &CoreError) {
    tracing::error!(request_id, chain_id, %error, "chain execution error");
}
