//! Deterministic seed hierarchy for resampling.
//!
//! A master seed is expanded into one sub-seed per (organization, dataset,
//! endpoint) triple via BLAKE3. Derivation is hash-based, so each triple gets
//! the same seed no matter which worker thread processes it or in what order.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::TripleKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for one triple. Recorded in the significance report.
    pub fn sub_seed(&self, key: &TripleKey) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(&key.canonical_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, key: &TripleKey) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(key))
    }
}
