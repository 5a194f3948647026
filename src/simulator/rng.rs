use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded RNG for workloads and fault injection. Same seed, same sequence.
pub struct DeterministicRng {
    rng: ChaCha8Rng,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        DeterministicRng {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform in `[min, max)`; `min` when the range is empty.
    pub fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }

    pub fn gen_bool(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        let val = self.next_u64() as f64 / u64::MAX as f64;
        val < probability
    }

    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.gen_range(0, items.len() as u64) as usize;
        items.get(index)
    }
}

/// Fire a fault with the given probability.
pub fn buggify(rng: &mut DeterministicRng, probability: f64) -> bool {
    rng.gen_bool(probability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = DeterministicRng::new(9);
        let mut b = DeterministicRng::new(9);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_probability_edges() {
        let mut rng = DeterministicRng::new(1);
        assert!((0..100).all(|_| !buggify(&mut rng, 0.0)));
        assert!((0..100).all(|_| buggify(&mut rng, 1.0)));
        assert_eq!(rng.gen_range(5, 5), 5);
        assert!(rng.choose::<u8>(&[]).is_none());
    }
}
