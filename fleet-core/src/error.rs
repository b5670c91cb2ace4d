//! Crate-wide error kinds.
//!
//! Each subsystem keeps a narrow local error type where it owns one (e.g.
//! [`crate::store::StoreError`], [`crate::engine::CompilationError`]) and converts into
//! `CoreError` at its public boundary. `CoreError` is the type every external
//! collaborator call and every public operation in this crate ultimately surfaces.

use thiserror::Error;

/// Error kinds surfaced to callers of the control plane and task runtime.
///
/// Propagation policy: transient errors are retried locally up to a per-task
/// budget, then surfaced; every other kind is surfaced immediately. Nothing is
/// swallowed silently — when a failure is non-critical (e.g. an Activity Sink
/// publish), it is logged via `tracing::warn!` and the caller proceeds.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity or chain id unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input, template rendering failure, or invalid transition.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Pagination cursor or numeric argument malformed.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// Mutation attempted on a reserved pool or model.
    #[error("immutable: {0}")]
    Immutable(String),

    /// Resolver could not satisfy the requested constraints.
    #[error("no provider satisfies request: {0}")]
    NoProvider(String),

    /// Backend unreachable.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Retryable upstream condition (5xx, timeout, transport hiccup).
    #[error("transient: {0}")]
    Transient(String),

    /// Capability not supported by the selected provider.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Chain exceeded the maximum hop count.
    #[error("hop limit exceeded: {0}")]
    HopLimit(String),

    /// A hook returned a failure status.
    #[error("hook failed: {0}")]
    HookFailed(String),

    /// Upstream 4xx: malformed request to a provider. Not retryable.
    #[error("bad upstream request: {0}")]
    BadUpstreamRequest(String),

    /// Passthrough for an external collaborator error (Store, Messenger, Activity Sink)
    /// that does not map cleanly onto one of the kinds above.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// True for kinds the caller may retry against an unchanged request, per §7's
    /// propagation policy ("Transient errors are retried locally up to a per-task
    /// budget"). Used by the Task Engine and Provider Adapter call sites.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_) | CoreError::BackendUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_backend_unavailable_are_retryable() {
        assert!(CoreError::Transient("timeout".into()).is_retryable());
        assert!(CoreError::BackendUnavailable("unreachable".into()).is_retryable());
    }

    #[test]
    fn bad_request_is_not_retryable() {
        assert!(!CoreError::BadRequest("missing field".into()).is_retryable());
        assert!(!CoreError::BadUpstreamRequest("400".into()).is_retryable());
    }
}
