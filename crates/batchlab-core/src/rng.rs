//! Seed derivation and generation for experimental runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Exclusive upper bound for run seeds handed to executed programs.
///
/// Many simulators store their seed in a signed 32-bit integer.
pub const SEED_LIMIT: u64 = 1 << 31;

/// Source of run seeds: reproducible from a seed, or from OS entropy.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Reproducible stream for `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Stream seeded from operating system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Draws a run seed in `[0, SEED_LIMIT)`.
    pub fn next_run_seed(&mut self) -> u64 {
        self.rng.gen_range(0..SEED_LIMIT)
    }
}

/// SipHash-1-3 with zero keys over `(master_seed, substream)`; stable
/// across platforms and releases.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}

/// Derives the seed for one run of one experiment from a master seed.
///
/// `attempt` distinguishes rerolls when two runs of the same experiment
/// would otherwise collide.
pub fn derive_run_seed(master_seed: u64, experiment: usize, run: usize, attempt: u64) -> u64 {
    let exp_stream = derive_substream_seed(master_seed, experiment as u64);
    let run_stream = derive_substream_seed(exp_stream, run as u64);
    derive_substream_seed(run_stream, attempt) % SEED_LIMIT
}
