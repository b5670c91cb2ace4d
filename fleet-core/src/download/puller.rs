//! The transport behind the Download Manager: one pull against one backend.
//! Mirrors [`crate::runtime_state::observer::BackendObserver`]'s split
//! between a real HTTP implementation and a scripted mock.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::DownloadProgress;

#[derive(Debug, Error)]
pub enum PullError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("transient pull failure: {0}")]
    Transient(String),
}

/// One update a [`ModelPuller`] emits as a pull advances.
#[derive(Debug, Clone)]
pub struct PullUpdate {
    pub status: PullStatus,
    pub progress: DownloadProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStatus {
    Pulling,
    Verifying,
    Done,
}

/// Pulls one model onto one backend, emitting [`PullUpdate`]s on `tx` as it
/// goes. Implementations must honor `cancel`: once cancelled, stop emitting
/// updates and return promptly.
#[async_trait]
pub trait ModelPuller: Send + Sync {
    async fn pull(&self, backend_url: &str, model: &str, tx: tokio::sync::mpsc::Sender<PullUpdate>, cancel: CancellationToken) -> Result<(), PullError>;
}

/// Scripted puller for tests: emits a fixed sequence of updates (or fails)
/// without a real backend.
pub struct MockPuller {
    steps: Vec<PullUpdate>,
    fail: Option<PullError>,
}

impl MockPuller {
    pub fn succeeding(total: u64) -> Self {
        Self {
            steps: vec![
                PullUpdate { status: PullStatus::Pulling, progress: DownloadProgress { completed: total / 2, total, digest: Some("sha256:partial".into()) } },
                PullUpdate { status: PullStatus::Verifying, progress: DownloadProgress { completed: total, total, digest: Some("sha256:full".into()) } },
                PullUpdate { status: PullStatus::Done, progress: DownloadProgress { completed: total, total, digest: Some("sha256:full".into()) } },
            ],
            fail: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { steps: Vec::new(), fail: Some(PullError::Transient(message.into())) }
    }
}

#[async_trait]
impl ModelPuller for MockPuller {
    async fn pull(&self, _backend_url: &str, _model: &str, tx: tokio::sync::mpsc::Sender<PullUpdate>, cancel: CancellationToken) -> Result<(), PullError> {
        if let Some(err) = &self.fail {
            return Err(PullError::Transient(err.to_string()));
        }
        for step in &self.steps {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let _ = tx.send(step.clone()).await;
        }
        Ok(())
    }
}
