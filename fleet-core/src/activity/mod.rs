//! Activity Sink: an append-only event log keyed by request id, plus the Task
//! Engine's per-execution captured state that gets flushed to it.
//!
//! This is an external collaborator: this module specifies only the contract
//! (the `ActivitySink` trait) and a simple in-memory reference implementation
//! used by the test suite. Both take a stream of typed events and hand them
//! to an external sink without caring how that sink persists them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::TypedValue;

/// One append-only record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub request_id: String,
    pub operation: String,
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub entity_id: Option<String>,
    pub entity_data: Option<Value>,
    pub duration_ms: Option<i64>,
    pub metadata: Value,
}

/// The Task Engine's per-task execution record, appended to a per-run list and
/// flushed to the Activity Sink on chain completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedStateUnit {
    pub task_id: String,
    pub input: TypedValue,
    pub output: Option<TypedValue>,
    pub raw_response: Option<String>,
    pub transition_taken: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Append-only event log keyed by request id.
///
/// Event emission must be non-blocking relative to the critical path: a
/// failing or slow sink is logged at `warn` and the caller proceeds.
/// Implementations should honor that by not holding the caller up on their
/// own I/O; the in-memory reference implementation here is inherently
/// non-blocking.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Appends one event. Failures are non-critical: callers should log and
    /// continue rather than fail the chain execution.
    async fn record(&self, event: ActivityEvent);

    /// Flushes a chain execution's captured state, keyed by `request_id`.
    async fn record_captured_state(&self, request_id: &str, units: Vec<CapturedStateUnit>);
}

/// In-memory reference `ActivitySink`, used by tests and as a development
/// default. Keeps every event and captured-state batch in a concurrent map
/// keyed by `request_id`.
#[derive(Default)]
pub struct InMemoryActivitySink {
    events: DashMap<String, Vec<ActivityEvent>>,
    captured: DashMap<String, Vec<CapturedStateUnit>>,
}

impl InMemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, request_id: &str) -> Vec<ActivityEvent> {
        self.events.get(request_id).map(|v| v.clone()).unwrap_or_default()
    }

    pub fn captured_state_for(&self, request_id: &str) -> Vec<CapturedStateUnit> {
        self.captured.get(request_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivitySink {
    async fn record(&self, event: ActivityEvent) {
        self.events.entry(event.request_id.clone()).or_default().push(event);
    }

    async fn record_captured_state(&self, request_id: &str, units: Vec<CapturedStateUnit>) {
        self.captured.insert(request_id.to_string(), units);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_appended_per_request_id() {
        let sink = InMemoryActivitySink::new();
        sink.record(ActivityEvent {
            id: "e1".into(),
            request_id: "req-1".into(),
            operation: "task.run".into(),
            subject: "t1".into(),
            start: Utc::now(),
            end: None,
            error: None,
            entity_id: None,
            entity_data: None,
            duration_ms: None,
            metadata: Value::Null,
        })
        .await;
        sink.record(ActivityEvent {
            id: "e2".into(),
            request_id: "req-1".into(),
            operation: "task.run".into(),
            subject: "t2".into(),
            start: Utc::now(),
            end: None,
            error: None,
            entity_id: None,
            entity_data: None,
            duration_ms: None,
            metadata: Value::Null,
        })
        .await;
        let events = sink.events_for("req-1");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "e1");
        assert_eq!(events[1].id, "e2");
    }

    #[tokio::test]
    async fn captured_state_is_retrievable_by_request_id() {
        let sink = InMemoryActivitySink::new();
        sink.record_captured_state(
            "req-2",
            vec![CapturedStateUnit {
                task_id: "t1".into(),
                input: TypedValue::string("in"),
                output: Some(TypedValue::string("out")),
                raw_response: None,
                transition_taken: Some("end".into()),
                error: None,
                started_at: Utc::now(),
                ended_at: Some(Utc::now()),
            }],
        )
        .await;
        let units = sink.captured_state_for("req-2");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].task_id, "t1");
    }
}
