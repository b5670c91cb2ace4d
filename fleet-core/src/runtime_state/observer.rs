//! Per-backend health/pulled-model observation: queries the remote server
//! for its pulled model list and health.
//!
//! A narrow async interface plus a mock implementation used by everything
//! that doesn't want a live network call.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::Backend;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("backend {backend_id} unreachable: {message}")]
    Unreachable { backend_id: String, message: String },
    #[error("backend {backend_id} returned a malformed response: {message}")]
    MalformedResponse { backend_id: String, message: String },
}

/// What one observation cycle learns about a backend.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub pulled_models: Vec<String>,
}

/// Queries one backend for its pulled-model list. Implementations:
/// [`HttpBackendObserver`] (a real Ollama-style `/api/tags` call),
/// [`MockBackendObserver`] (tests).
#[async_trait]
pub trait BackendObserver: Send + Sync {
    async fn observe(&self, backend: &Backend) -> Result<Observation, ObserverError>;
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Calls `GET {base_url}/api/tags`, the Ollama-style pulled-model listing
/// endpoint, and reads back the model names.
pub struct HttpBackendObserver {
    client: reqwest::Client,
}

impl Default for HttpBackendObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBackendObserver {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl BackendObserver for HttpBackendObserver {
    async fn observe(&self, backend: &Backend) -> Result<Observation, ObserverError> {
        let url = format!("{}/api/tags", backend.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ObserverError::Unreachable { backend_id: backend.id.clone(), message: e.to_string() })?;
        let body: TagsResponse = response
            .json()
            .await
            .map_err(|e| ObserverError::MalformedResponse { backend_id: backend.id.clone(), message: e.to_string() })?;
        Ok(Observation { pulled_models: body.models.into_iter().map(|m| m.name).collect() })
    }
}

/// Scripted observer for tests: reports a fixed pulled-model list every
/// cycle, unless [`MockBackendObserver::fail_next`] has armed a one-shot
/// failure for the next call.
pub struct MockBackendObserver {
    pulled_models: Vec<String>,
    fail_once: AtomicBool,
}

impl MockBackendObserver {
    pub fn always_reporting(pulled_models: Vec<String>) -> Self {
        Self { pulled_models, fail_once: AtomicBool::new(false) }
    }

    pub fn fail_next(&self) {
        self.fail_once.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendObserver for MockBackendObserver {
    async fn observe(&self, backend: &Backend) -> Result<Observation, ObserverError> {
        if self.fail_once.swap(false, Ordering::SeqCst) {
            return Err(ObserverError::Unreachable { backend_id: backend.id.clone(), message: "scripted failure".into() });
        }
        Ok(Observation { pulled_models: self.pulled_models.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_observer_fails_exactly_once_after_arming() {
        let observer = MockBackendObserver::always_reporting(vec!["llama3".into()]);
        let backend = Backend::new("b1", "b1", "http://localhost:11434", "ollama");

        assert!(observer.observe(&backend).await.is_ok());
        observer.fail_next();
        assert!(observer.observe(&backend).await.is_err());
        assert!(observer.observe(&backend).await.is_ok());
    }
}
