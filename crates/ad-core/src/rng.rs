//! Deterministic per-agent RNG.
//!
//! Every randomized decision in the core (weighted rule selection, emergency
//! steering jitter, hand-brake flips) draws from one `AgentRng` owned by the
//! agent.  Seeding is
//!
//!   seed = global_seed XOR (actor_id * MIXING_CONSTANT)
//!
//! so two agents in the same run never share a stream and a replay with the
//! same seed takes identical decisions.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ActorId;

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Per-agent deterministic RNG.
pub struct AgentRng(SmallRng);

impl AgentRng {
    /// Seed deterministically from the run's global seed and the ego actor.
    pub fn new(global_seed: u64, actor: ActorId) -> Self {
        let seed = global_seed ^ (actor.0 as u64).wrapping_mul(MIXING_CONSTANT);
        AgentRng(SmallRng::seed_from_u64(seed))
    }

    pub fn from_seed(seed: u64) -> Self {
        AgentRng(SmallRng::seed_from_u64(seed))
    }

    /// Derive an independent stream, e.g. for a background worker.
    pub fn child(&mut self, offset: u64) -> AgentRng {
        let child_seed: u64 = self.0.r#gen::<u64>() ^ offset.wrapping_mul(MIXING_CONSTANT);
        AgentRng(SmallRng::seed_from_u64(child_seed))
    }

    #[inline]
    pub fn inner(&mut self) -> &mut SmallRng {
        &mut self.0
    }

    /// Sample a uniformly distributed value of any `Standard`-distributed type.
    #[inline]
    pub fn random<T>(&mut self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.0.r#gen()
    }

    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.0.gen_range(range)
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Pick an index from ascending cumulative weights.
    ///
    /// `cum_weights[i]` is the total weight of items `0..=i`.  Returns `None`
    /// if the slice is empty or the total weight is not positive.
    pub fn pick_cumulative(&mut self, cum_weights: &[f64]) -> Option<usize> {
        let total = *cum_weights.last()?;
        if !(total > 0.0) {
            return None;
        }
        let x = self.0.gen_range(0.0..total);
        let idx = cum_weights.partition_point(|&w| w <= x);
        Some(idx.min(cum_weights.len() - 1))
    }
}

/// Running sums of `weights`, the form [`AgentRng::pick_cumulative`] expects.
pub fn cumulative(weights: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut acc = 0.0;
    weights
        .into_iter()
        .map(|w| {
            acc += w.max(0.0);
            acc
        })
        .collect()
}
