//! Single-flight circuit breaker shared by the three background loops: the
//! Runtime State Engine's reconciliation cycle, the Job Queue sweeper, and
//! each Download progress pump. Trips after three consecutive failures
//! within one second; cools down for a configurable duration before allowing
//! another attempt through.
//!
//! Generalizes a per-call "count consecutive failures, gate the next
//! attempt" retry shape into a per-loop open/half-open/closed state machine.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Consecutive failures within this window trip the breaker.
pub const TRIP_THRESHOLD: u32 = 3;
pub const TRIP_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    first_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
}

/// Thread-safe breaker; cheap to call `before_attempt`/`record_*` from a
/// single long-lived loop task.
pub struct CircuitBreaker {
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            inner: Mutex::new(Inner { state: BreakerState::Closed, consecutive_failures: 0, first_failure_at: None, opened_at: None }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    /// Call before attempting the guarded operation. Returns `true` if the
    /// attempt should proceed (closed, or open but cooldown elapsed — moves
    /// to half-open); `false` if the breaker is still open.
    pub fn before_attempt(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Call after a successful attempt: closes the breaker and resets the
    /// failure counter.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.first_failure_at = None;
        inner.opened_at = None;
    }

    /// Call after a failed attempt: trips the breaker open once three
    /// failures land within the one-second window (or immediately on a
    /// failed half-open probe).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            inner.consecutive_failures = TRIP_THRESHOLD;
            return;
        }
        let now = Instant::now();
        let window_start = inner.first_failure_at.get_or_insert(now);
        if now.duration_since(*window_start) > TRIP_WINDOW {
            inner.first_failure_at = Some(now);
            inner.consecutive_failures = 0;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= TRIP_THRESHOLD {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
        }
    }
}
