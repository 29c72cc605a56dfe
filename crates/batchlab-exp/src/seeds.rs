//! Per-run seed assignment.

use std::collections::BTreeSet;

use batchlab_core::{derive_run_seed, RngHandle};

/// Where fresh seeds come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    /// Derived from a master seed; reproducible.
    Master(u64),
    /// Drawn from operating system entropy.
    Entropy,
}

impl SeedSource {
    /// Source implied by an optional master seed.
    pub fn from_master(master: Option<u64>) -> Self {
        master.map(SeedSource::Master).unwrap_or(SeedSource::Entropy)
    }
}

/// Seeds for `runs` runs of one experiment, unique within the experiment.
///
/// Seeds found in `prior` are reused position by position; only the missing
/// tail is generated.
pub fn assign_seeds(source: SeedSource, experiment: usize, runs: usize, prior: Option<&[u64]>) -> Vec<u64> {
    let mut seeds: Vec<u64> = Vec::with_capacity(runs);
    let mut used = BTreeSet::new();
    for seed in prior.unwrap_or_default().iter().take(runs) {
        if used.insert(*seed) {
            seeds.push(*seed);
        }
    }
    let mut entropy: Option<RngHandle> = None;
    while seeds.len() < runs {
        let run = seeds.len();
        let mut attempt = 0u64;
        loop {
            let candidate = match source {
                SeedSource::Master(master) => derive_run_seed(master, experiment, run, attempt),
                SeedSource::Entropy => entropy.get_or_insert_with(RngHandle::from_entropy).next_run_seed(),
            };
            if used.insert(candidate) {
                seeds.push(candidate);
                break;
            }
            attempt += 1;
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use batchlab_core::SEED_LIMIT;

    use super::*;

    #[test]
    fn master_seeds_are_reproducible_and_unique() {
        let first = assign_seeds(SeedSource::Master(7), 3, 16, None);
        let second = assign_seeds(SeedSource::Master(7), 3, 16, None);
        assert_eq!(first, second);
        let distinct: BTreeSet<_> = first.iter().collect();
        assert_eq!(distinct.len(), 16);
        assert!(first.iter().all(|seed| *seed < SEED_LIMIT));
    }

    #[test]
    fn prior_seeds_are_kept_and_extended() {
        let seeds = assign_seeds(SeedSource::Entropy, 0, 3, Some(&[11, 22]));
        assert_eq!(&seeds[..2], &[11, 22]);
        assert_eq!(seeds.len(), 3);
        let trimmed = assign_seeds(SeedSource::Entropy, 0, 1, Some(&[11, 22]));
        assert_eq!(trimmed, vec![11]);
    }
}
