//! Placeholder images for records that arrive without one

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Default artwork used when an upstream record has no image
pub const DEFAULT_IMAGES: &[&str] = &[
    "/images/placeholder/vinyl.jpg",
    "/images/placeholder/stage.jpg",
    "/images/placeholder/crowd.jpg",
    "/images/placeholder/tape.jpg",
];

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 0x5eed_f00d;

/// Supplies a placeholder image URL for a record missing one
pub trait FallbackProvider: Send + Sync + std::fmt::Debug {
    /// Returns a placeholder for the record identified by `key`
    fn fallback_image(&self, key: &str) -> String;
}

/// Picks from a pool of images, deterministically per seed and record key
///
/// The same record always gets the same placeholder, so re-fetching unchanged
/// data produces identical output.
#[derive(Debug, Clone)]
pub struct SeededFallback {
    pool: Vec<String>,
    seed: u64,
}

impl SeededFallback {
    pub fn new(pool: Vec<String>, seed: u64) -> Self {
        Self { pool, seed }
    }
}

impl Default for SeededFallback {
    fn default() -> Self {
        Self::new(
            DEFAULT_IMAGES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_SEED,
        )
    }
}

impl FallbackProvider for SeededFallback {
    fn fallback_image(&self, key: &str) -> String {
        let mut rng = StdRng::seed_from_u64(seeded_key_hash(self.seed, key));
        self.pool.choose(&mut rng).cloned().unwrap_or_default()
    }
}

/// Always returns the same image
#[derive(Debug, Clone)]
pub struct FixedFallback(pub String);

impl FallbackProvider for FixedFallback {
    fn fallback_image(&self, _key: &str) -> String {
        self.0.clone()
    }
}

/// Hash of `seed` and `key` with the fixed-key std hasher, so it is the same
/// in every process
fn seeded_key_hash(seed: u64, key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}
