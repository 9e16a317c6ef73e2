//! Randomness, negative sampling and minibatch partitioning.
//!
//! Every random draw of a training run goes through one [`RandomSource`] that the
//! caller owns and passes in explicitly, so a fixed seed and a fixed data order
//! reproduce a run exactly.
//!
//! # Negative sampling
//!
//! Negatives are made by *corruption*: keep two fields of a true triple and
//! replace the third with a uniformly drawn entity.
//!
//! ```text
//! (h, r, t)  --left-->   (h', r, t)
//! (h, r, t)  --right-->  (h, r, t')
//! ```
//!
//! No check is made that the corrupted triple is actually false (local
//! closed-world assumption); the occasional false negative is training noise.

use rand::Rng;

use crate::dataset::Triple;

/// Source of uniform random draws.
///
/// Implemented for every [`rand::Rng`]; tests may implement it directly to
/// script the draws.
pub trait RandomSource {
    /// Uniform integer in `[0, upper)`. `upper` must be non-zero.
    fn gen_index(&mut self, upper: usize) -> usize;

    /// Uniform float in `[0, 1)`.
    fn gen_unit(&mut self) -> f32;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn gen_index(&mut self, upper: usize) -> usize {
        self.gen_range(0..upper)
    }

    fn gen_unit(&mut self) -> f32 {
        self.gen::<f32>()
    }
}

/// Copy `batch`, replacing every head with a uniformly drawn entity.
pub fn corrupt_heads<R: RandomSource + ?Sized>(
    batch: &[Triple],
    n_entities: usize,
    rng: &mut R,
) -> Vec<Triple> {
    batch
        .iter()
        .map(|t| Triple::new(rng.gen_index(n_entities), t.relation, t.tail))
        .collect()
}

/// Copy `batch`, replacing every tail with a uniformly drawn entity.
pub fn corrupt_tails<R: RandomSource + ?Sized>(
    batch: &[Triple],
    n_entities: usize,
    rng: &mut R,
) -> Vec<Triple> {
    batch
        .iter()
        .map(|t| Triple::new(t.head, t.relation, rng.gen_index(n_entities)))
        .collect()
}

/// In-place Fisher-Yates shuffle driven by `rng`.
pub fn shuffle<T, R: RandomSource + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_index(i + 1);
        items.swap(i, j);
    }
}

/// Partition `0..n` into contiguous minibatches of `batch_size`.
///
/// Yields `n / batch_size` full batches followed by one trailing batch holding
/// the remainder, if any. The trailing batch is neither dropped nor padded.
/// With `shuffle` the index order is permuted first (consuming draws from
/// `rng`); otherwise the original order is kept and `rng` is untouched.
///
/// Each batch is paired with its position in the returned sequence.
pub fn minibatches<R: RandomSource + ?Sized>(
    n: usize,
    batch_size: usize,
    shuffle_order: bool,
    rng: &mut R,
) -> Vec<(usize, Vec<usize>)> {
    assert!(batch_size > 0, "batch_size must be positive");

    let mut idx: Vec<usize> = (0..n).collect();
    if shuffle_order {
        shuffle(&mut idx, rng);
    }

    idx.chunks(batch_size)
        .map(<[usize]>::to_vec)
        .enumerate()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    /// Replays a fixed list of indices.
    struct Scripted(Vec<usize>);

    impl RandomSource for Scripted {
        fn gen_index(&mut self, upper: usize) -> usize {
            let v = self.0.remove(0);
            assert!(v < upper);
            v
        }

        fn gen_unit(&mut self) -> f32 {
            0.5
        }
    }

    #[test]
    fn test_minibatches_keep_remainder() {
        let mut rng = XorShiftRng::seed_from_u64(0);
        let batches = minibatches(7, 3, false, &mut rng);
        assert_eq!(
            batches,
            vec![(0, vec![0, 1, 2]), (1, vec![3, 4, 5]), (2, vec![6])]
        );
    }

    #[test]
    fn test_minibatches_exact_multiple() {
        let mut rng = XorShiftRng::seed_from_u64(0);
        let batches = minibatches(6, 3, false, &mut rng);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].1, vec![3, 4, 5]);
    }

    #[test]
    fn test_minibatches_empty_input() {
        let mut rng = XorShiftRng::seed_from_u64(0);
        assert!(minibatches(0, 4, true, &mut rng).is_empty());
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        let batches = minibatches(50, 8, true, &mut rng);
        let mut seen: Vec<usize> = batches.into_iter().flat_map(|(_, b)| b).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_corruption_uses_scripted_draws() {
        let batch = vec![Triple::new(0, 1, 2), Triple::new(3, 0, 4)];

        let left = corrupt_heads(&batch, 5, &mut Scripted(vec![4, 1]));
        assert_eq!(left, vec![Triple::new(4, 1, 2), Triple::new(1, 0, 4)]);

        let right = corrupt_tails(&batch, 5, &mut Scripted(vec![0, 0]));
        assert_eq!(right, vec![Triple::new(0, 1, 0), Triple::new(3, 0, 0)]);
    }

    #[test]
    fn test_same_seed_same_negatives() {
        let batch: Vec<Triple> = (0..32).map(|i| Triple::new(i % 10, 0, (i + 1) % 10)).collect();
        let a = corrupt_tails(&batch, 10, &mut XorShiftRng::seed_from_u64(11));
        let b = corrupt_tails(&batch, 10, &mut XorShiftRng::seed_from_u64(11));
        assert_eq!(a, b);
    }
}
