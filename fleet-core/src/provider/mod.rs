//! Provider Adapter: a uniform, capability-tagged client over one remote
//! inference server.
//!
//! Mirrors a narrow `invoke`-shaped client trait (methods returning a
//! response plus usage) for the interface, and an `async-openai`
//! `Client<OpenAIConfig>` pointed at a custom `base_url` via
//! `OpenAIConfig::with_api_base` for the HTTP-backed implementation.

mod http;
mod mock;

pub use http::HttpProviderBackend;
pub use mock::MockProviderBackend;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::CoreError;

/// One message in a chat-shaped request. Deliberately narrower than
/// [`crate::domain::TypedValue`]'s `ChatHistory` variant — the engine
/// flattens a `ChatHistory` TypedValue into `Vec<ChatMessage>` before calling
/// a chat connection.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }
}

/// Token accounting side-channel returned alongside every connection call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Failure taxonomy for a Provider Adapter call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("unsupported capability: {0}")]
    Unsupported(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("transient upstream failure: {0}")]
    Transient(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl From<ProviderError> for CoreError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::BackendUnavailable(m) => CoreError::BackendUnavailable(m),
            ProviderError::Unsupported(m) => CoreError::Unsupported(m),
            ProviderError::BadRequest(m) => CoreError::BadRequest(m),
            ProviderError::Transient(m) => CoreError::Transient(m),
        }
    }
}

/// A chunk of an in-progress stream response; the terminal item is always
/// `Err` (channel closed) or an item with `done: true`.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

/// The transport behind a [`Provider`]'s connections, one instance per
/// `(backend, base_url)`. Implementations: [`HttpProviderBackend`] (real
/// OpenAI-compatible HTTP), [`MockProviderBackend`] (tests).
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<(String, Metrics), ProviderError>;
    async fn prompt(&self, model: &str, prompt: &str) -> Result<(String, Metrics), ProviderError>;
    async fn embed(&self, model: &str, text: &str) -> Result<(Vec<f32>, Metrics), ProviderError>;
    /// Streams a chat completion. The default implementation calls [`Self::chat`]
    /// and emits its full content as a single chunk.
    async fn stream(&self, model: &str, messages: &[ChatMessage], tx: mpsc::Sender<StreamChunk>) -> Result<Metrics, ProviderError> {
        let (content, metrics) = self.chat(model, messages).await?;
        let _ = tx.send(StreamChunk { delta: content, done: true }).await;
        Ok(metrics)
    }
}

/// A capability-bearing, model-scoped view of one or more backends.
/// `backends` maps a backend's `base_url` to the transport
/// that talks to it; `get_*_connection` looks the transport up and checks the
/// matching capability flag before handing out a narrow client.
#[derive(Clone)]
pub struct Provider {
    pub model_name: String,
    pub backend_ids: Vec<String>,
    pub context_length: u32,
    pub can_chat: bool,
    pub can_prompt: bool,
    pub can_embed: bool,
    pub can_stream: bool,
    backends: HashMap<String, Arc<dyn ProviderBackend>>,
}

impl Provider {
    pub fn new(model_name: impl Into<String>, context_length: u32, can_chat: bool, can_prompt: bool, can_embed: bool, can_stream: bool) -> Self {
        Self {
            model_name: model_name.into(),
            backend_ids: Vec::new(),
            context_length,
            can_chat,
            can_prompt,
            can_embed,
            can_stream,
            backends: HashMap::new(),
        }
    }

    /// Registers the transport for one backend, keyed by its `base_url`.
    pub fn with_backend(mut self, backend_id: impl Into<String>, base_url: impl Into<String>, backend: Arc<dyn ProviderBackend>) -> Self {
        self.backend_ids.push(backend_id.into());
        self.backends.insert(base_url.into(), backend);
        self
    }

    fn backend_for(&self, base_url: &str) -> Result<Arc<dyn ProviderBackend>, ProviderError> {
        self.backends.get(base_url).cloned().ok_or_else(|| ProviderError::BackendUnavailable(base_url.to_string()))
    }

    pub fn get_chat_connection(&self, base_url: &str) -> Result<ChatConnection, ProviderError> {
        if !self.can_chat {
            return Err(ProviderError::Unsupported(format!("{} does not support chat", self.model_name)));
        }
        Ok(ChatConnection { model: self.model_name.clone(), backend: self.backend_for(base_url)? })
    }

    pub fn get_prompt_connection(&self, base_url: &str) -> Result<PromptConnection, ProviderError> {
        if !self.can_prompt {
            return Err(ProviderError::Unsupported(format!("{} does not support prompt", self.model_name)));
        }
        Ok(PromptConnection { model: self.model_name.clone(), backend: self.backend_for(base_url)? })
    }

    pub fn get_embed_connection(&self, base_url: &str) -> Result<EmbedConnection, ProviderError> {
        if !self.can_embed {
            return Err(ProviderError::Unsupported(format!("{} does not support embed", self.model_name)));
        }
        Ok(EmbedConnection { model: self.model_name.clone(), backend: self.backend_for(base_url)? })
    }

    pub fn get_stream_connection(&self, base_url: &str) -> Result<StreamConnection, ProviderError> {
        if !self.can_stream {
            return Err(ProviderError::Unsupported(format!("{} does not support stream", self.model_name)));
        }
        Ok(StreamConnection { model: self.model_name.clone(), backend: self.backend_for(base_url)? })
    }
}

macro_rules! narrow_connection {
    ($name:ident) => {
        pub struct $name {
            model: String,
            backend: Arc<dyn ProviderBackend>,
        }
    };
}

narrow_connection!(ChatConnection);
narrow_connection!(PromptConnection);
narrow_connection!(EmbedConnection);
narrow_connection!(StreamConnection);

impl ChatConnection {
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<(String, Metrics), ProviderError> {
        self.backend.chat(&self.model, messages).await
    }
}

impl PromptConnection {
    pub async fn prompt(&self, prompt: &str) -> Result<(String, Metrics), ProviderError> {
        self.backend.prompt(&self.model, prompt).await
    }
}

impl EmbedConnection {
    pub async fn embed(&self, text: &str) -> Result<(Vec<f32>, Metrics), ProviderError> {
        self.backend.embed(&self.model, text).await
    }
}

impl StreamConnection {
    pub async fn stream(&self, messages: &[ChatMessage], tx: mpsc::Sender<StreamChunk>) -> Result<Metrics, ProviderError> {
        self.backend.stream(&self.model, messages, tx).await
    }
}
