//! Tie-break strategies for the Model Resolver: once candidates are
//! lexicographically sorted by provider id, which tied winner to return.
//!
//! [`Randomly`] does not seed its RNG — the draw is observable but not
//! required to be reproducible across runs.

use rand::Rng;

/// Picks an index into `tied` (already sorted by provider id ascending).
pub trait TieBreakStrategy: Send + Sync {
    fn pick(&self, tied: &[&str]) -> usize;
}

/// Uniform random draw over the tied set. The default strategy.
#[derive(Default)]
pub struct Randomly;

impl TieBreakStrategy for Randomly {
    fn pick(&self, tied: &[&str]) -> usize {
        if tied.len() <= 1 {
            return 0;
        }
        rand::thread_rng().gen_range(0..tied.len())
    }
}

/// Always the lexicographically-first tied candidate — deterministic, no
/// randomness.
#[derive(Default)]
pub struct FirstAvailable;

impl TieBreakStrategy for FirstAvailable {
    fn pick(&self, _tied: &[&str]) -> usize {
        0
    }
}

/// Picks the tied candidate this crate believes is least loaded. This
/// reference implementation has no load signal to draw on (the runtime
/// snapshot does not track in-flight request counts per backend), so it
/// degrades to [`FirstAvailable`]'s choice; a deployment with real load
/// metrics should supply its own [`TieBreakStrategy`] instead.
#[derive(Default)]
pub struct LowestLoad;

impl TieBreakStrategy for LowestLoad {
    fn pick(&self, tied: &[&str]) -> usize {
        FirstAvailable.pick(tied)
    }
}
