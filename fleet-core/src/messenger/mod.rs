//! Messenger: at-most-once publish/subscribe plus request/reply, addressed
//! by subject string.
//!
//! An external collaborator; this module specifies the contract (the
//! `Messenger` trait) and an in-memory reference implementation for tests, in
//! a non-blocking-send style: a slow subscriber is dropped rather than
//! allowed to stall the publisher — best-effort, latest-wins.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

/// Well-known subjects this crate publishes or subscribes to, used bit-exact
/// by every caller.
pub mod subjects {
    pub const STATE_UPDATED: &str = "state.updated";
    pub const DOWNLOADS_PROGRESS: &str = "downloads.progress";
    pub const QUEUE_CANCEL: &str = "queue_cancel";
    pub const MODEL_DOWNLOAD: &str = "model_download";
    pub const LLMRESOLVER_RESOLVE: &str = "llmresolver.resolve";

    /// `events.<eventType>` — build the concrete subject for one event type.
    pub fn events(event_type: &str) -> String {
        format!("events.{event_type}")
    }
}

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("request to {subject} timed out")]
    Timeout { subject: String },
    #[error("no replier registered for {subject}")]
    NoReplier { subject: String },
    #[error("messenger closed")]
    Closed,
}

/// A live subscription to a subject. Dropping it unsubscribes.
pub struct Subscription {
    inner: broadcast::Receiver<Vec<u8>>,
}

impl Subscription {
    /// Awaits the next message. Returns `None` once the publisher side has
    /// gone away; silently skips messages this subscriber lagged behind on —
    /// subscribers must tolerate drops.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.inner.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// At-most-once publish/subscribe plus request/reply.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>);
    async fn stream(&self, subject: &str) -> Subscription;
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, MessengerError>;
}

type Replier = Box<dyn Fn(Vec<u8>) -> futures::future::BoxFuture<'static, Vec<u8>> + Send + Sync>;

/// In-memory reference `Messenger`. Pub/sub fans out through a
/// [`tokio::sync::broadcast`] channel per subject, created lazily on first
/// publish or subscribe; delivery is at-most-once and a subscriber that falls
/// behind loses messages rather than blocking the publisher. Request/reply
/// is served by handlers registered
/// with [`InMemoryMessenger::register_replier`]; a subject with no registered
/// replier fails fast with [`MessengerError::NoReplier`].
pub struct InMemoryMessenger {
    channels: dashmap::DashMap<String, broadcast::Sender<Vec<u8>>>,
    repliers: dashmap::DashMap<String, Replier>,
    capacity: usize,
}

impl Default for InMemoryMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessenger {
    pub fn new() -> Self {
        Self {
            channels: dashmap::DashMap::new(),
            repliers: dashmap::DashMap::new(),
            capacity: 256,
        }
    }

    fn channel_for(&self, subject: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Registers a responder for `subject`'s request/reply traffic. Only one
    /// replier per subject; registering again replaces the previous one.
    pub fn register_replier<F, Fut>(&self, subject: impl Into<String>, handler: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Vec<u8>> + Send + 'static,
    {
        let boxed: Replier = Box::new(move |payload| Box::pin(handler(payload)));
        self.repliers.insert(subject.into(), boxed);
    }
}

#[async_trait]
impl Messenger for InMemoryMessenger {
    async fn publish(&self, subject: &str, payload: Vec<u8>) {
        // No receivers is not an error: publish is fire-and-forget.
        let _ = self.channel_for(subject).send(payload);
    }

    async fn stream(&self, subject: &str) -> Subscription {
        Subscription {
            inner: self.channel_for(subject).subscribe(),
        }
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, MessengerError> {
        let fut = {
            let entry = self.repliers.get(subject).ok_or_else(|| MessengerError::NoReplier { subject: subject.to_string() })?;
            (entry.value())(payload)
        };
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(fut.await);
        });
        tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| MessengerError::Timeout { subject: subject.to_string() })?
            .map_err(|_| MessengerError::Closed)
    }
}
