//! End-to-end resolve: Runtime State Engine reconciliation feeding a real
//! snapshot into the Model Resolver, over an in-memory Store/Messenger.

use std::sync::Arc;

use fleet_core::domain::{Backend, Model, Pool, PurposeType};
use fleet_core::messenger::InMemoryMessenger;
use fleet_core::provider::MockProviderBackend;
use fleet_core::resolver::{Operation, ProviderRegistry, ResolveRequest, Resolver};
use fleet_core::runtime_state::{MockBackendObserver, RuntimeStateEngine};
use fleet_core::store::InMemoryStore;

#[tokio::test]
async fn resolve_picks_the_preferred_model_after_a_reconcile_cycle() {
    let store = Arc::new(InMemoryStore::new());

    store.put_backend(Backend::new("b1", "backend-1", "http://b1", "ollama")).await.unwrap();
    store.put_pool(Pool::new("general", "general purpose", PurposeType::General)).await.unwrap();
    store.add_backend_to_pool("general", "b1").await.unwrap();

    store.put_model(Model::new("llama3", "llama3", 8192, true, true, false, false).unwrap()).await.unwrap();
    store.put_model(Model::new("mistral", "mistral", 8192, true, true, false, false).unwrap()).await.unwrap();
    store.add_model_to_pool("general", "llama3").await.unwrap();
    store.add_model_to_pool("general", "mistral").await.unwrap();

    let messenger = Arc::new(InMemoryMessenger::new());
    let observer = Arc::new(MockBackendObserver::always_reporting(vec!["llama3".into(), "mistral".into()]));
    let engine = RuntimeStateEngine::new(store.clone(), messenger, observer);
    engine.reconcile_once().await.unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register("b1", Arc::new(MockProviderBackend::with_fixed_reply("ok")));
    let resolver = Resolver::new(store, Arc::new(registry));

    let snapshot = engine.snapshot();
    let request = ResolveRequest { provider_types: vec![], model_names: vec!["mistral".into(), "llama3".into()], context_length: 0 };
    let resolved = resolver.resolve(&snapshot, Operation::Chat, &request).await.unwrap();

    assert_eq!(resolved.provider.model_name, "mistral");
    assert_eq!(resolved.backend_id, "b1");
}

#[tokio::test]
async fn resolve_fails_closed_when_no_backend_has_pulled_the_requested_model() {
    let store = Arc::new(InMemoryStore::new());
    store.put_backend(Backend::new("b1", "backend-1", "http://b1", "ollama")).await.unwrap();
    store.put_pool(Pool::new("general", "general purpose", PurposeType::General)).await.unwrap();
    store.add_backend_to_pool("general", "b1").await.unwrap();
    store.put_model(Model::new("llama3", "llama3", 8192, true, true, false, false).unwrap()).await.unwrap();
    store.add_model_to_pool("general", "llama3").await.unwrap();

    let messenger = Arc::new(InMemoryMessenger::new());
    // Backend has pulled nothing yet — the download job gets emitted, but
    // resolve has no candidate until the next cycle observes it pulled.
    let observer = Arc::new(MockBackendObserver::always_reporting(vec![]));
    let engine = RuntimeStateEngine::new(store.clone(), messenger, observer);
    engine.reconcile_once().await.unwrap();

    let jobs = store.pending_jobs_of_type(fleet_core::messenger::subjects::MODEL_DOWNLOAD).await.unwrap();
    assert_eq!(jobs.len(), 1, "expected a download job for the unpulled model");

    let mut registry = ProviderRegistry::new();
    registry.register("b1", Arc::new(MockProviderBackend::with_fixed_reply("ok")));
    let resolver = Resolver::new(store, Arc::new(registry));

    let snapshot = engine.snapshot();
    let request = ResolveRequest { provider_types: vec![], model_names: vec!["llama3".into()], context_length: 0 };
    let err = resolver.resolve(&snapshot, Operation::Chat, &request).await.unwrap_err();
    assert!(matches!(err, fleet_core::error::CoreError::NoProvider(_)));
}
