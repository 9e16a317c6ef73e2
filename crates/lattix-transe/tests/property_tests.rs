//! Property-based tests for sampling, normalization, loss and ranking.
//!
//! These verify invariants that must hold for all inputs:
//! - Minibatch partitioning covers every index once, in order unless shuffled
//! - Corruption changes exactly one field, within the entity range
//! - Entity normalization is idempotent
//! - Margin loss is zero exactly when every pair clears the margin
//! - Rank equals position in ascending score order

#![allow(clippy::unwrap_used)]

use lattix_transe::evaluation::stable_rank;
use lattix_transe::{
    corrupt_heads, corrupt_tails, minibatches, ModelParams, Norm, RankSide, TransE, Triple,
};
use ndarray::Array2;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

mod partition_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn covers_every_index_in_order(n in 1usize..300, b in 1usize..64, seed in any::<u64>()) {
            prop_assume!(b <= n);
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let batches = minibatches(n, b, false, &mut rng);

            prop_assert_eq!(batches.len(), n.div_ceil(b));
            for (pos, (i, _)) in batches.iter().enumerate() {
                prop_assert_eq!(pos, *i);
            }

            let last = &batches.last().unwrap().1;
            let expected_last = if n % b == 0 { b } else { n % b };
            prop_assert_eq!(last.len(), expected_last);
            for (_, batch) in &batches[..batches.len() - 1] {
                prop_assert_eq!(batch.len(), b);
            }

            let flat: Vec<usize> = batches.into_iter().flat_map(|(_, idx)| idx).collect();
            prop_assert_eq!(flat, (0..n).collect::<Vec<_>>());
        }

        #[test]
        fn shuffled_is_permutation(n in 1usize..300, b in 1usize..64, seed in any::<u64>()) {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let batches = minibatches(n, b, true, &mut rng);
            prop_assert_eq!(batches.len(), n.div_ceil(b));

            let mut flat: Vec<usize> = batches.into_iter().flat_map(|(_, idx)| idx).collect();
            flat.sort_unstable();
            prop_assert_eq!(flat, (0..n).collect::<Vec<_>>());
        }
    }
}

mod corruption_props {
    use super::*;

    fn arb_batch(n_entities: usize) -> impl Strategy<Value = Vec<Triple>> {
        prop::collection::vec(
            (0..n_entities, 0usize..5, 0..n_entities).prop_map(|(h, r, t)| Triple::new(h, r, t)),
            1..64,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn left_corruption_only_touches_head(batch in arb_batch(20), seed in any::<u64>()) {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let neg = corrupt_heads(&batch, 20, &mut rng);
            prop_assert_eq!(neg.len(), batch.len());
            for (p, n) in batch.iter().zip(&neg) {
                prop_assert_eq!(p.relation, n.relation);
                prop_assert_eq!(p.tail, n.tail);
                prop_assert!(n.head < 20);
            }
        }

        #[test]
        fn right_corruption_only_touches_tail(batch in arb_batch(20), seed in any::<u64>()) {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let neg = corrupt_tails(&batch, 20, &mut rng);
            prop_assert_eq!(neg.len(), batch.len());
            for (p, n) in batch.iter().zip(&neg) {
                prop_assert_eq!(p.head, n.head);
                prop_assert_eq!(p.relation, n.relation);
                prop_assert!(n.tail < 20);
            }
        }
    }

    #[test]
    fn corrupted_index_is_roughly_uniform() {
        let batch = vec![Triple::new(0, 0, 0); 10_000];
        let mut rng = XorShiftRng::seed_from_u64(99);
        let neg = corrupt_tails(&batch, 4, &mut rng);

        let mut counts = [0usize; 4];
        for t in &neg {
            counts[t.tail] += 1;
        }
        for c in counts {
            // expected 2500 each
            assert!((2200..2800).contains(&c), "counts {counts:?}");
        }
    }
}

mod model_props {
    use super::*;

    fn l2(v: ndarray::ArrayView1<'_, f32>) -> f32 {
        v.dot(&v).sqrt()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn normalization_is_idempotent(
            n in 1usize..30,
            dim in 1usize..32,
            seed in any::<u64>(),
        ) {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let mut model = TransE::new(n, 1, dim, Norm::L2, &mut rng);
            model.normalize_entities();
            let first = model.params();
            model.normalize_entities();

            for e in 0..n {
                let v = model.entity_embedding(e);
                prop_assert!((l2(v) - 1.0).abs() < 1e-5);
                for (a, b) in v.iter().zip(first.entities.row(e).iter()) {
                    prop_assert!((a - b).abs() < 1e-6);
                }
            }
        }

        #[test]
        fn margin_loss_sign(
            seed in any::<u64>(),
            margin in 0.1f32..3.0,
            norm in prop_oneof![Just(Norm::L1), Just(Norm::L2)],
        ) {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let mut model = TransE::new(8, 2, 6, norm, &mut rng);
            model.normalize_entities();

            let pos: Vec<Triple> = (0..8).map(|i| Triple::new(i, i % 2, (i + 3) % 8)).collect();
            let neg = corrupt_tails(&pos, 8, &mut rng);
            let loss = model.margin_loss(&pos, &neg, margin);

            let all_clear = pos
                .iter()
                .zip(&neg)
                .all(|(p, n)| model.score(n) - model.score(p) >= margin);
            if all_clear {
                prop_assert_eq!(loss, 0.0);
            } else {
                prop_assert!(loss > 0.0);
            }
        }

        #[test]
        fn rank_is_position_in_score_order(
            offsets in prop::collection::vec(0.01f32..1.0, 1..20),
            pick in any::<prop::sample::Index>(),
        ) {
            // One-dimensional entities at strictly increasing positions; head 0
            // with a zero relation scores candidate k as its position.
            let mut pos = 0.0f32;
            let coords: Vec<f32> = std::iter::once(0.0)
                .chain(offsets.iter().map(|d| {
                    pos += d;
                    pos
                }))
                .collect();
            let k = coords.len();
            let model = TransE::from_params(
                ModelParams {
                    entities: Array2::from_shape_vec((k, 1), coords).unwrap(),
                    relations: Array2::zeros((1, 1)),
                },
                Norm::L1,
            )
            .unwrap();

            let j = pick.index(k);
            let ranks = model.ranks(&[Triple::new(0, 0, j)], RankSide::Tail, None);
            prop_assert_eq!(ranks, vec![j + 1]);
        }

        #[test]
        fn stable_rank_matches_stable_sort(
            scores in prop::collection::vec(prop_oneof![Just(0.5f32), 0.0f32..1.0], 1..40),
            pick in any::<prop::sample::Index>(),
        ) {
            let target = pick.index(scores.len());
            let mut order: Vec<usize> = (0..scores.len()).collect();
            order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap());
            let expected = order.iter().position(|&c| c == target).unwrap() + 1;

            prop_assert_eq!(stable_rank(&scores, target, |_| true), expected);
        }
    }
}
