//! End-to-end Download Manager test: two concurrent `enqueue` calls for the
//! same `(backend, model)` pair join a single in-flight pull and both see
//! its progress stream through to completion (spec scenario: download dedup).

use std::sync::Arc;
use std::time::Duration;

use fleet_core::download::{DownloadManager, MockPuller};
use fleet_core::store::InMemoryStore;
use fleet_core::InMemoryMessenger;

#[tokio::test]
async fn concurrent_enqueue_for_same_pair_shares_one_pull() {
    let store = Arc::new(InMemoryStore::new());
    let messenger = Arc::new(InMemoryMessenger::new());
    let puller = Arc::new(MockPuller::succeeding(100));
    let manager = DownloadManager::new(store, messenger, puller);

    manager.enqueue("http://b1", "llama3").await.unwrap();
    // Subscribe before the second enqueue call so we don't race the first
    // pull to completion before a receiver exists.
    let mut rx = manager.progress_stream("http://b1", "llama3").expect("pull in flight");

    manager.enqueue("http://b1", "llama3").await.unwrap();

    let mut saw_done = false;
    while let Ok(event) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        let Ok(event) = event else { break };
        if event.status == fleet_core::DownloadState::Done {
            saw_done = true;
            break;
        }
    }
    assert!(saw_done, "expected the shared pull to reach Done");

    // The job it produced is gone now that the pull finished, and dedup
    // bookkeeping no longer reports it in flight.
    assert!(manager.progress_stream("http://b1", "llama3").is_none());
}

#[tokio::test]
async fn distinct_models_on_the_same_backend_run_independently() {
    let store = Arc::new(InMemoryStore::new());
    let messenger = Arc::new(InMemoryMessenger::new());
    let puller = Arc::new(MockPuller::succeeding(10));
    let manager = DownloadManager::new(store, messenger, puller);

    manager.enqueue("http://b1", "llama3").await.unwrap();
    manager.enqueue("http://b1", "mistral").await.unwrap();

    assert!(manager.status("http://b1", "llama3").is_some());
    assert!(manager.status("http://b1", "mistral").is_some());
}
