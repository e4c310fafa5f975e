//! The single seeded random source for a battle
//!
//! Every random draw in the engine goes through one `BattleRng` owned by the
//! battle store. Nothing else in the crate is allowed to reach for ambient
//! randomness, so seed + inputs always reproduce the same outcome.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct BattleRng {
    seed: u64,
    inner: ChaCha8Rng,
    draws: u64,
}

impl BattleRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of values drawn so far
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Uniform roll in `[0, 1)`
    pub fn roll(&mut self) -> f64 {
        self.draws += 1;
        self.inner.gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = BattleRng::from_seed(42);
        let mut b = BattleRng::from_seed(42);
        for _ in 0..100 {
            assert_eq!(a.roll().to_bits(), b.roll().to_bits());
        }
    }

    #[test]
    fn test_different_seed_different_sequence() {
        let mut a = BattleRng::from_seed(1);
        let mut b = BattleRng::from_seed(2);
        let seq_a: Vec<u64> = (0..8).map(|_| a.roll().to_bits()).collect();
        let seq_b: Vec<u64> = (0..8).map(|_| b.roll().to_bits()).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn test_roll_range_and_draw_count() {
        let mut rng = BattleRng::from_seed(7);
        for _ in 0..1000 {
            let r = rng.roll();
            assert!((0.0..1.0).contains(&r));
        }
        assert_eq!(rng.draws(), 1000);
        assert_eq!(rng.seed(), 7);
    }
}
