//! Seeded randomness shared by the data split and the classifier.

use oorandom::Rand64;

/// Fisher-Yates shuffle driven by a seeded generator.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rand64) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

/// Permutation of `0..len` that depends only on `seed`.
pub fn permutation(len: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = Rand64::new(seed as u128);
    shuffle(&mut indices, &mut rng);
    indices
}

/// `count` samples drawn uniformly from `[-limit, limit)`.
pub fn uniform(rng: &mut Rand64, count: usize, limit: f64) -> Vec<f32> {
    (0..count)
        .map(|_| ((rng.rand_float() * 2.0 - 1.0) * limit) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_is_reproducible() {
        assert_eq!(permutation(50, 42), permutation(50, 42));
        assert_ne!(permutation(50, 42), permutation(50, 7));
    }

    #[test]
    fn test_permutation_covers_every_index() {
        let mut indices = permutation(100, 3);
        indices.sort_unstable();
        assert_eq!(indices, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_uniform_respects_limit() {
        let mut rng = Rand64::new(1);
        let values = uniform(&mut rng, 1000, 0.05);
        assert_eq!(values.len(), 1000);
        assert!(values.iter().all(|v| v.abs() <= 0.05));
    }
}
