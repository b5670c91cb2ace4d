//! Composite `search_knowledge` hook: chains `vector_search` then
//! `resolve_search_result` internally behind one registered hook type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::args;
use super::{HookOutcome, HookRepo};
use crate::domain::{DataType, HookCall, TaskTransition, TypedValue};

const DEFAULT_COLLECTION: &str = "default";
const DEFAULT_TOP_K: usize = 5;

/// One hit returned by a vector search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f64,
}

/// The `vector_search` half of the composite. The vector store itself is not
/// implemented here; this trait is the seam a deployment plugs a real one
/// into.
#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    async fn search(&self, collection: &str, query: &str, top_k: usize) -> Result<Vec<SearchHit>, String>;
}

/// `vector_search` then `resolve_search_result`: runs the query, then shapes
/// the hits into a `SearchResults`-typed value for the next task.
pub struct SearchKnowledgeHook {
    backend: Arc<dyn VectorSearchBackend>,
}

impl SearchKnowledgeHook {
    pub fn new(backend: Arc<dyn VectorSearchBackend>) -> Self {
        Self { backend }
    }

    async fn vector_search(&self, query: &str, effective_args: &HashMap<String, String>) -> Result<Vec<SearchHit>, String> {
        let collection = effective_args.get("collection").cloned().unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        let top_k = effective_args.get("top_k").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_TOP_K);
        self.backend.search(&collection, query, top_k).await
    }

    /// Shapes raw hits into the typed value downstream tasks see.
    fn resolve_search_result(hits: Vec<SearchHit>) -> TypedValue {
        TypedValue { data_type: DataType::SearchResults, payload: serde_json::json!(hits) }
    }
}

#[async_trait]
impl HookRepo for SearchKnowledgeHook {
    fn supports(&self) -> Vec<String> {
        vec!["search_knowledge".to_string()]
    }

    async fn exec(&self, _start_time: DateTime<Utc>, input: &TypedValue, _input_type: DataType, _transition: &TaskTransition, call: &HookCall) -> HookOutcome {
        let parsed = match args::parse(&input.render_string()) {
            Ok(p) => p,
            Err(e) => return HookOutcome::failed(e.to_string()),
        };
        // call.args are the hook call's own defaults; the parsed prefix, if
        // present, overrides them.
        let effective_args = args::merge(&call.args, &parsed.args);

        match self.vector_search(&parsed.payload, &effective_args).await {
            Ok(hits) => HookOutcome::ok(Self::resolve_search_result(hits)),
            Err(message) => HookOutcome::failed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedHits(Vec<SearchHit>);

    #[async_trait]
    impl VectorSearchBackend for FixedHits {
        async fn search(&self, _collection: &str, _query: &str, _top_k: usize) -> Result<Vec<SearchHit>, String> {
            Ok(self.0.clone())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl VectorSearchBackend for AlwaysFails {
        async fn search(&self, _collection: &str, _query: &str, _top_k: usize) -> Result<Vec<SearchHit>, String> {
            Err("backend unreachable".to_string())
        }
    }

    fn call_with_args(pairs: &[(&str, &str)]) -> HookCall {
        HookCall {
            hook_type: "search_knowledge".into(),
            args: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[tokio::test]
    async fn plain_input_with_no_args_prefix_searches_with_defaults() {
        let hook = SearchKnowledgeHook::new(Arc::new(FixedHits(vec![SearchHit { id: "1".into(), text: "fact".into(), score: 0.9 }])));
        let outcome = hook.exec(Utc::now(), &TypedValue::string("what is rust"), DataType::String, &TaskTransition::default(), &call_with_args(&[])).await;
        assert_eq!(outcome.status, super::super::HookStatus::Ok);
        assert_eq!(outcome.output.data_type, DataType::SearchResults);
    }

    #[tokio::test]
    async fn parsed_args_prefix_overrides_call_defaults() {
        let hook = SearchKnowledgeHook::new(Arc::new(FixedHits(vec![])));
        let input = TypedValue::string("args: top_k=1 | query text");
        let outcome = hook.exec(Utc::now(), &input, DataType::String, &TaskTransition::default(), &call_with_args(&[("top_k", "5")])).await;
        assert_eq!(outcome.status, super::super::HookStatus::Ok);
    }

    #[tokio::test]
    async fn malformed_args_prefix_fails_the_hook() {
        let hook = SearchKnowledgeHook::new(Arc::new(FixedHits(vec![])));
        let input = TypedValue::string("args: broken");
        let outcome = hook.exec(Utc::now(), &input, DataType::String, &TaskTransition::default(), &call_with_args(&[])).await;
        assert_eq!(outcome.status, super::super::HookStatus::Error);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_error_status() {
        let hook = SearchKnowledgeHook::new(Arc::new(AlwaysFails));
        let outcome = hook.exec(Utc::now(), &TypedValue::string("q"), DataType::String, &TaskTransition::default(), &call_with_args(&[])).await;
        assert_eq!(outcome.status, super::super::HookStatus::Error);
        assert!(outcome.error.is_some());
    }
}
