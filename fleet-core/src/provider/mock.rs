//! In-test [`ProviderBackend`] with scripted replies: a fixed-response
//! stand-in used by tests that don't want a real network call.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatMessage, Metrics, ProviderBackend, ProviderError};

enum Scripted {
    Reply(String),
    Fail(ProviderError),
}

/// Replies in FIFO order from a scripted queue; once exhausted, repeats the
/// last entry. Lets a test express "fail once, then succeed" without a real
/// backend.
pub struct MockProviderBackend {
    queue: Mutex<Vec<Scripted>>,
}

impl MockProviderBackend {
    pub fn with_fixed_reply(reply: impl Into<String>) -> Self {
        Self { queue: Mutex::new(vec![Scripted::Reply(reply.into())]) }
    }

    pub fn with_script(script: Vec<Result<String, ProviderError>>) -> Self {
        let queue = script
            .into_iter()
            .map(|item| match item {
                Ok(reply) => Scripted::Reply(reply),
                Err(err) => Scripted::Fail(err),
            })
            .collect();
        Self { queue: Mutex::new(queue) }
    }

    fn next(&self) -> Result<String, ProviderError> {
        let mut queue = self.queue.lock().expect("mock provider mutex poisoned");
        let item = if queue.len() > 1 { queue.remove(0) } else { return Self::describe(&queue[0]) };
        let described = Self::describe(&item);
        described
    }

    fn describe(item: &Scripted) -> Result<String, ProviderError> {
        match item {
            Scripted::Reply(r) => Ok(r.clone()),
            Scripted::Fail(ProviderError::Transient(m)) => Err(ProviderError::Transient(m.clone())),
            Scripted::Fail(ProviderError::BackendUnavailable(m)) => Err(ProviderError::BackendUnavailable(m.clone())),
            Scripted::Fail(ProviderError::BadRequest(m)) => Err(ProviderError::BadRequest(m.clone())),
            Scripted::Fail(ProviderError::Unsupported(m)) => Err(ProviderError::Unsupported(m.clone())),
        }
    }
}

#[async_trait]
impl ProviderBackend for MockProviderBackend {
    async fn chat(&self, _model: &str, _messages: &[ChatMessage]) -> Result<(String, Metrics), ProviderError> {
        self.next().map(|reply| (reply, Metrics::default()))
    }

    async fn prompt(&self, _model: &str, _prompt: &str) -> Result<(String, Metrics), ProviderError> {
        self.next().map(|reply| (reply, Metrics::default()))
    }

    async fn embed(&self, _model: &str, _text: &str) -> Result<(Vec<f32>, Metrics), ProviderError> {
        Err(ProviderError::Unsupported("MockProviderBackend does not implement embed".into()))
    }
}
