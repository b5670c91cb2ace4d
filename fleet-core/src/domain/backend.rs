//! Backend entity: `{id, name, baseURL, type, createdAt, updatedAt}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A network-addressable remote inference server instance.
///
/// Mutable by admin; referenced by pools. The `(backend_type, base_url)` pair
/// must be reachable or the Runtime State Engine records an error against it
/// without removing it — a backend is never silently dropped from the desired
/// set because of a transient health failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Backend family, e.g. `"ollama"`, `"vllm"`. Used by the Model Resolver's
    /// `provider_types` filter.
    pub backend_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Backend {
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_url: impl Into<String>, backend_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            base_url: base_url.into(),
            backend_type: backend_type.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
