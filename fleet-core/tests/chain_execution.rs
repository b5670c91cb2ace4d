//! End-to-end Task Engine tests driven through the public API, with a chain
//! persisted in and loaded back from an `InMemoryStore` rather than
//! constructed in-process the way the engine's own unit tests do.

use std::collections::HashMap;
use std::sync::Arc;

use fleet_core::{
    Backend, ChainDefinition, ChainTask, DataType, ExecuteConfig, HookRegistry, InMemoryActivitySink,
    LlmState, Model, Pool, PurposeType, ProviderRegistry, Resolver, Snapshot, TaskEngine, TaskTransition,
    TaskType, TransitionBranch, TransitionOperator, TypedValue,
};
use fleet_core::provider::MockProviderBackend;
use fleet_core::store::InMemoryStore;

fn task(id: &str, task_type: TaskType, prompt: &str, goto: &str) -> ChainTask {
    ChainTask {
        id: id.to_string(),
        task_type,
        prompt_template: Some(prompt.to_string()),
        input_var: None,
        system_instruction: None,
        execute_config: Some(ExecuteConfig::default()),
        hook: None,
        transition: TaskTransition {
            branches: vec![TransitionBranch { operator: TransitionOperator::Default, when: None, goto: goto.to_string() }],
            on_failure: None,
        },
        retry_on_error: 0,
        print: false,
    }
}

async fn seeded(reply: &str) -> (Arc<InMemoryStore>, Arc<Resolver>, Snapshot) {
    let store = Arc::new(InMemoryStore::new());
    store.put_backend(Backend::new("b1", "b1", "http://b1", "ollama")).await.unwrap();
    store.put_pool(Pool::new("pool-1", "p", PurposeType::General)).await.unwrap();
    store.add_backend_to_pool("pool-1", "b1").await.unwrap();
    store.put_model(Model::new("llama3", "llama3", 4096, true, true, false, false).unwrap()).await.unwrap();
    store.add_model_to_pool("pool-1", "llama3").await.unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register("b1", Arc::new(MockProviderBackend::with_fixed_reply(reply)) as Arc<_>);
    let resolver = Arc::new(Resolver::new(store.clone(), Arc::new(registry)));

    let mut states = HashMap::new();
    states.insert(
        "b1".to_string(),
        LlmState {
            backend: Backend::new("b1", "b1", "http://b1", "ollama"),
            pulled_models: vec!["llama3".to_string()],
            models_desired: vec!["llama3".to_string()],
            error: None,
        },
    );
    let snapshot = Snapshot { generation: 1, states };

    (store, resolver, snapshot)
}

#[tokio::test]
async fn chain_persisted_in_store_executes_end_to_end() {
    let (store, resolver, snapshot) = seeded("hello from the model").await;

    let chain = ChainDefinition {
        id: "greeting".into(),
        description: "prompt then stop".into(),
        tasks: vec![task("say_hi", TaskType::PromptToString, "say hi to {{.input}}", fleet_core::domain::END)],
    };
    store.set_chain_definition(chain).await.unwrap();

    let loaded = store.get_chain_definition("greeting").await.unwrap();
    let hooks = Arc::new(HookRegistry::new());
    let sink = Arc::new(InMemoryActivitySink::new());
    let engine = TaskEngine::new(resolver, hooks, sink.clone());

    let output = engine.exec_env(&snapshot, &loaded, "req-1", TypedValue::string("world")).await.unwrap();
    assert_eq!(output.data_type, DataType::String);
    assert_eq!(output.render_string(), "hello from the model");

    let captured = sink.captured_state_for("req-1");
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].transition_taken.as_deref(), Some(fleet_core::domain::END));
}

#[tokio::test]
async fn branching_chain_routes_on_rendered_output() {
    let (_store, resolver, snapshot) = seeded("yes").await;

    let classify = ChainTask {
        transition: TaskTransition {
            branches: vec![
                TransitionBranch { operator: TransitionOperator::Equals, when: Some("yes".into()), goto: "accept".into() },
                TransitionBranch { operator: TransitionOperator::Default, when: None, goto: "reject".into() },
            ],
            on_failure: None,
        },
        ..task("classify", TaskType::PromptToString, "classify {{.input}}", "accept")
    };
    let accept = task("accept", TaskType::RawString, "accepted: {{.classify}}", fleet_core::domain::END);
    let reject = task("reject", TaskType::RawString, "rejected", fleet_core::domain::END);

    let chain = ChainDefinition { id: "gatekeeper".into(), description: "".into(), tasks: vec![classify, accept, reject] };

    let hooks = Arc::new(HookRegistry::new());
    let sink = Arc::new(InMemoryActivitySink::new());
    let engine = TaskEngine::new(resolver, hooks, sink);

    let output = engine.exec_env(&snapshot, &chain, "req-2", TypedValue::string("anything")).await.unwrap();
    assert_eq!(output.render_string(), "accepted: yes");
}
