//! Model Resolver: capability- and preference-based selection of a
//! `(provider, model, backend)` triple over the current runtime snapshot.
//!
//! Composes multiple scoring/filtering stages into one decision: gather,
//! filter, score, tie-break.

mod tie_break;

pub use tie_break::{FirstAvailable, LowestLoad, Randomly, TieBreakStrategy};

use std::sync::Arc;

use crate::domain::Model;
use crate::error::CoreError;
use crate::provider::{Provider, ProviderBackend};
use crate::runtime_state::Snapshot;
use crate::store::Store;

/// What capability an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Chat,
    Prompt,
    Stream,
    Embed,
}

/// Chat/prompt/stream resolve input.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub provider_types: Vec<String>,
    pub model_names: Vec<String>,
    pub context_length: u32,
}

/// Embed resolve input — singular, not list-shaped.
#[derive(Debug, Clone)]
pub struct ResolveEmbedRequest {
    pub model_name: String,
    pub provider_type: String,
}

/// One candidate surviving the filter stage, carrying everything needed to
/// both score it and, if it wins, construct its [`Provider`].
#[derive(Debug, Clone)]
struct Candidate {
    backend_id: String,
    base_url: String,
    provider_type: String,
    model: Model,
    score: usize,
}

/// A selection result: enough to build the narrow connection the caller
/// actually wants (`provider.get_chat_connection(&base_url)`, etc).
pub struct ResolvedProvider {
    pub backend_id: String,
    pub base_url: String,
    pub provider: Provider,
}

/// Maps a `(backend_id)` to the [`ProviderBackend`] transport that talks to
/// it — supplied by whatever wires this crate together at startup (one entry
/// per configured backend).
#[derive(Default)]
pub struct ProviderRegistry {
    backends: std::collections::HashMap<String, Arc<dyn ProviderBackend>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend_id: impl Into<String>, backend: Arc<dyn ProviderBackend>) {
        self.backends.insert(backend_id.into(), backend);
    }

    fn get(&self, backend_id: &str) -> Option<Arc<dyn ProviderBackend>> {
        self.backends.get(backend_id).cloned()
    }
}

/// Selects, per request, a concrete `(provider, model, backend)` triple (spec
/// §4.F).
pub struct Resolver {
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
    tie_break: Arc<dyn TieBreakStrategy>,
}

impl Resolver {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ProviderRegistry>) -> Self {
        Self { store, registry, tie_break: Arc::new(Randomly::default()) }
    }

    pub fn with_tie_break(mut self, strategy: Arc<dyn TieBreakStrategy>) -> Self {
        self.tie_break = strategy;
        self
    }

    /// Algorithm: gather providers whose backend sits in ≥1 pool and whose
    /// pulled model also sits in ≥1 pool, and whose type matches
    /// `provider_types` (empty means all); filter by
    /// the operation's capability flag and `context_length`; score by the
    /// index of the first matching name in `model_names` (lower is better,
    /// empty list scores everything 0); tie-break by provider id lexical
    /// order, then the pluggable strategy.
    pub async fn resolve(&self, snapshot: &Snapshot, operation: Operation, request: &ResolveRequest) -> Result<ResolvedProvider, CoreError> {
        let mut candidates = self.gather(snapshot, &request.provider_types).await?;
        candidates.retain(|c| capability_flag(&c.model, operation) && (request.context_length == 0 || c.model.context_length >= request.context_length));
        self.pick(candidates, &request.model_names)
    }

    /// Embed resolve: singular model name + provider type, same filter/score
    /// machinery with `model_names = [model_name]`.
    pub async fn resolve_embed(&self, snapshot: &Snapshot, request: &ResolveEmbedRequest) -> Result<ResolvedProvider, CoreError> {
        let provider_types = vec![request.provider_type.clone()];
        let mut candidates = self.gather(snapshot, &provider_types).await?;
        candidates.retain(|c| c.model.can_embed && c.model.id == request.model_name);
        self.pick(candidates, &[request.model_name.clone()])
    }

    async fn gather(&self, snapshot: &Snapshot, provider_types: &[String]) -> Result<Vec<Candidate>, CoreError> {
        let mut candidates = Vec::new();
        for state in snapshot.states.values() {
            let pools = self.store.pools_for_backend(&state.backend.id).await.map_err(CoreError::from)?;
            if pools.is_empty() {
                continue;
            }
            if !provider_types.is_empty() && !provider_types.contains(&state.backend.backend_type) {
                continue;
            }
            for model_id in &state.pulled_models {
                let model = match self.store.get_model(model_id).await {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                let model_pools = self.store.pools_for_model(model_id).await.map_err(CoreError::from)?;
                if model_pools.is_empty() {
                    continue;
                }
                candidates.push(Candidate {
                    backend_id: state.backend.id.clone(),
                    base_url: state.backend.base_url.clone(),
                    provider_type: state.backend.backend_type.clone(),
                    model,
                    score: usize::MAX,
                });
            }
        }
        Ok(candidates)
    }

    fn pick(&self, mut candidates: Vec<Candidate>, model_names: &[String]) -> Result<ResolvedProvider, CoreError> {
        if candidates.is_empty() {
            return Err(CoreError::NoProvider("no candidate providers matched the request".into()));
        }
        for candidate in &mut candidates {
            candidate.score = if model_names.is_empty() {
                0
            } else {
                model_names.iter().position(|name| name == &candidate.model.id).unwrap_or(usize::MAX)
            };
        }
        candidates.retain(|c| c.score != usize::MAX || model_names.is_empty());
        if candidates.is_empty() {
            return Err(CoreError::NoProvider("no candidate matched any requested model name".into()));
        }
        let best_score = candidates.iter().map(|c| c.score).min().expect("non-empty");
        candidates.retain(|c| c.score == best_score);
        candidates.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));

        let winner_idx = if candidates.len() == 1 { 0 } else { self.tie_break.pick(&candidates.iter().map(|c| c.backend_id.as_str()).collect::<Vec<_>>()) };
        let winner = candidates.into_iter().nth(winner_idx).expect("index within bounds");

        let backend = self.registry.get(&winner.backend_id).ok_or_else(|| CoreError::BackendUnavailable(winner.backend_id.clone()))?;
        let provider = Provider::new(
            winner.model.id.clone(),
            winner.model.context_length,
            winner.model.can_chat,
            winner.model.can_prompt,
            winner.model.can_embed,
            winner.model.can_stream,
        )
        .with_backend(winner.backend_id.clone(), winner.base_url.clone(), backend);

        Ok(ResolvedProvider { backend_id: winner.backend_id.clone(), base_url: winner.base_url, provider })
    }
}

fn capability_flag(model: &Model, operation: Operation) -> bool {
    match operation {
        Operation::Chat => model.can_chat,
        Operation::Prompt => model.can_prompt,
        Operation::Stream => model.can_stream,
        Operation::Embed => model.can_embed,
    }
}
