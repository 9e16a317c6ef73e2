//! TransE: Relations as Translations.
//!
//! TransE ([Bordes et al. 2013](https://papers.nips.cc/paper/2013/hash/1cecc7a77928ca8133fa24680a88d2f9-Abstract.html))
//! interprets relations as translations in embedding space:
//!
//! ```text
//! h + r ≈ t  (if the triple is true)
//! ```
//!
//! # Scoring
//!
//! Score = ||h + r - t|| under the L1 or L2 norm. This is a *dissimilarity*:
//! lower scores mean more plausible triples.
//!
//! # Training
//!
//! Margin-based ranking loss over (positive, corrupted) pairs:
//!
//! ```text
//! L = mean_i max(0, margin + d(h_i + r_i, t_i) - d(h'_i + r'_i, t'_i))
//! ```
//!
//! The gradient is closed-form. With `u = (h + r - t)` and `g = ∂||u||/∂u`
//! (`sign(u)` for L1, `u / ||u||` for L2), an active pair contributes
//! `+g` to h and r and `-g` to t of the positive, and the opposite signs to
//! the negative. Pairs whose margin is already satisfied contribute nothing.
//!
//! Entity rows are renormalized to unit L2 norm before every minibatch, which
//! stops the trivial solution of inflating entity norms to separate negatives.

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::dataset::Triple;
use crate::error::{Error, Result};
use crate::evaluation::{stable_rank, KnownTriples, RankSide};
use crate::sampling::RandomSource;

/// Dissimilarity used by the score function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    #[default]
    L1,
    L2,
}

impl Norm {
    /// Norm of a residual given element-wise.
    #[inline]
    fn of(self, residual: impl Iterator<Item = f32>) -> f32 {
        match self {
            Self::L1 => residual.map(f32::abs).sum(),
            Self::L2 => residual.map(|d| d * d).sum::<f32>().sqrt(),
        }
    }

    /// Gradient of the norm with respect to the residual.
    fn grad(self, residual: &Array1<f32>) -> Array1<f32> {
        match self {
            Self::L1 => residual.mapv(|d| {
                if d > 0.0 {
                    1.0
                } else if d < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }),
            Self::L2 => {
                let n = residual.dot(residual).sqrt();
                if n > 0.0 {
                    residual / n
                } else {
                    Array1::zeros(residual.len())
                }
            }
        }
    }
}

/// Raw embedding tables, one row per entity / relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub entities: Array2<f32>,
    pub relations: Array2<f32>,
}

/// Diagnostics from one training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    /// Mean margin ranking loss over the batch, before the update.
    pub loss: f32,
    /// Pairs whose margin was violated (and therefore produced a gradient).
    pub violations: usize,
}

/// TransE model over integer-indexed entities and relations.
#[derive(Debug, Clone)]
pub struct TransE {
    entities: Array2<f32>,
    relations: Array2<f32>,
    norm: Norm,
}

impl TransE {
    /// Randomly initialized model.
    ///
    /// Both tables are drawn uniformly from `[-6/sqrt(D), 6/sqrt(D)]`; relation
    /// rows are then normalized once to unit length.
    pub fn new<R: RandomSource + ?Sized>(
        n_entities: usize,
        n_relations: usize,
        dim: usize,
        norm: Norm,
        rng: &mut R,
    ) -> Self {
        let bound = 6.0 / (dim.max(1) as f32).sqrt();
        let mut init = |rows: usize| {
            Array2::from_shape_fn((rows, dim), |_| (2.0 * rng.gen_unit() - 1.0) * bound)
        };
        let entities = init(n_entities);
        let mut relations = init(n_relations);
        normalize_rows(&mut relations);

        Self {
            entities,
            relations,
            norm,
        }
    }

    /// Create from pre-trained tables.
    pub fn from_params(params: ModelParams, norm: Norm) -> Result<Self> {
        let (_, dim) = params.entities.dim();
        let (n_rel, rel_dim) = params.relations.dim();
        if rel_dim != dim {
            return Err(Error::ShapeMismatch {
                what: "relation embeddings",
                expected: (n_rel, dim),
                actual: (n_rel, rel_dim),
            });
        }
        Ok(Self {
            entities: params.entities,
            relations: params.relations,
            norm,
        })
    }

    /// Copy of the current tables.
    pub fn params(&self) -> ModelParams {
        ModelParams {
            entities: self.entities.clone(),
            relations: self.relations.clone(),
        }
    }

    pub fn into_params(self) -> ModelParams {
        ModelParams {
            entities: self.entities,
            relations: self.relations,
        }
    }

    pub fn n_entities(&self) -> usize {
        self.entities.nrows()
    }

    pub fn n_relations(&self) -> usize {
        self.relations.nrows()
    }

    pub fn dim(&self) -> usize {
        self.entities.ncols()
    }

    pub fn norm(&self) -> Norm {
        self.norm
    }

    pub fn entity_embedding(&self, entity: usize) -> ArrayView1<'_, f32> {
        self.entities.row(entity)
    }

    pub fn relation_embedding(&self, relation: usize) -> ArrayView1<'_, f32> {
        self.relations.row(relation)
    }

    /// Dissimilarity of a triple; lower is more plausible.
    pub fn score(&self, triple: &Triple) -> f32 {
        let h = self.entities.row(triple.head);
        let r = self.relations.row(triple.relation);
        let t = self.entities.row(triple.tail);
        self.norm.of(
            h.iter()
                .zip(r.iter())
                .zip(t.iter())
                .map(|((h, r), t)| h + r - t),
        )
    }

    fn residual(&self, triple: &Triple) -> Array1<f32> {
        let h = self.entities.row(triple.head);
        let r = self.relations.row(triple.relation);
        let t = self.entities.row(triple.tail);
        &h + &r - &t
    }

    /// Mean margin ranking loss without touching parameters.
    ///
    /// A NaN slack propagates into the result instead of being clamped away.
    pub fn margin_loss(&self, positives: &[Triple], negatives: &[Triple], margin: f32) -> f32 {
        debug_assert_eq!(positives.len(), negatives.len());
        if positives.is_empty() {
            return 0.0;
        }
        let total: f32 = positives
            .iter()
            .zip(negatives)
            .map(|(p, n)| hinge(margin + self.score(p) - self.score(n)))
            .sum();
        total / positives.len() as f32
    }

    /// One SGD step on the margin ranking loss.
    ///
    /// `positives[i]` is paired with `negatives[i]`. Gradients are computed
    /// from the parameters as they were on entry, then applied with step
    /// `learning_rate`. Only rows touched by the batch change.
    pub fn train_step(
        &mut self,
        positives: &[Triple],
        negatives: &[Triple],
        margin: f32,
        learning_rate: f32,
    ) -> StepOutput {
        debug_assert_eq!(positives.len(), negatives.len());
        if positives.is_empty() {
            return StepOutput {
                loss: 0.0,
                violations: 0,
            };
        }

        let scale = 1.0 / positives.len() as f32;
        let dim = self.dim();
        let mut entity_grads: HashMap<usize, Array1<f32>> = HashMap::new();
        let mut relation_grads: HashMap<usize, Array1<f32>> = HashMap::new();
        let mut total = 0.0;
        let mut violations = 0;

        for (p, n) in positives.iter().zip(negatives) {
            let dp = self.residual(p);
            let dn = self.residual(n);
            let slack = margin + self.norm.of(dp.iter().copied()) - self.norm.of(dn.iter().copied());
            total += hinge(slack);

            if slack.is_nan() || slack <= 0.0 {
                continue;
            }
            violations += 1;

            let gp = self.norm.grad(&dp);
            let gn = self.norm.grad(&dn);

            accumulate(&mut entity_grads, p.head, scale, &gp, dim);
            accumulate(&mut relation_grads, p.relation, scale, &gp, dim);
            accumulate(&mut entity_grads, p.tail, -scale, &gp, dim);

            accumulate(&mut entity_grads, n.head, -scale, &gn, dim);
            accumulate(&mut relation_grads, n.relation, -scale, &gn, dim);
            accumulate(&mut entity_grads, n.tail, scale, &gn, dim);
        }

        for (idx, grad) in &entity_grads {
            self.entities.row_mut(*idx).scaled_add(-learning_rate, grad);
        }
        for (idx, grad) in &relation_grads {
            self.relations.row_mut(*idx).scaled_add(-learning_rate, grad);
        }

        StepOutput {
            loss: total * scale,
            violations,
        }
    }

    /// Rescale every entity row to unit L2 norm. Zero rows are left alone.
    pub fn normalize_entities(&mut self) {
        normalize_rows(&mut self.entities);
    }

    /// Dissimilarity of (head, relation, c) for every entity c.
    pub fn tail_scores(&self, head: usize, relation: usize) -> Vec<f32> {
        let hr = &self.entities.row(head) + &self.relations.row(relation);
        self.entities
            .outer_iter()
            .map(|e| self.norm.of(hr.iter().zip(e.iter()).map(|(a, b)| a - b)))
            .collect()
    }

    /// Dissimilarity of (c, relation, tail) for every entity c.
    pub fn head_scores(&self, relation: usize, tail: usize) -> Vec<f32> {
        let tr = &self.entities.row(tail) - &self.relations.row(relation);
        self.entities
            .outer_iter()
            .map(|e| self.norm.of(e.iter().zip(tr.iter()).map(|(a, b)| a - b)))
            .collect()
    }

    /// Link-prediction rank of every triple.
    ///
    /// [`RankSide::Both`] yields two ranks per triple (tail, then head). With
    /// `known`, candidates forming another known triple are skipped (filtered
    /// ranks); otherwise every entity competes (raw ranks).
    pub fn ranks(
        &self,
        triples: &[Triple],
        side: RankSide,
        known: Option<&KnownTriples>,
    ) -> Vec<usize> {
        let is_known = |t: Triple| known.is_some_and(|k| k.contains(&t));
        let mut ranks = Vec::with_capacity(triples.len());

        for t in triples {
            if matches!(side, RankSide::Tail | RankSide::Both) {
                let scores = self.tail_scores(t.head, t.relation);
                ranks.push(stable_rank(&scores, t.tail, |c| {
                    !is_known(Triple::new(t.head, t.relation, c))
                }));
            }
            if matches!(side, RankSide::Head | RankSide::Both) {
                let scores = self.head_scores(t.relation, t.tail);
                ranks.push(stable_rank(&scores, t.head, |c| {
                    !is_known(Triple::new(c, t.relation, t.tail))
                }));
            }
        }

        ranks
    }
}

/// `max(0, x)` that lets NaN through.
#[inline]
fn hinge(x: f32) -> f32 {
    if x.is_nan() {
        x
    } else {
        x.max(0.0)
    }
}

fn accumulate(
    grads: &mut HashMap<usize, Array1<f32>>,
    idx: usize,
    alpha: f32,
    grad: &Array1<f32>,
    dim: usize,
) {
    grads
        .entry(idx)
        .or_insert_with(|| Array1::zeros(dim))
        .scaled_add(alpha, grad);
}

fn normalize_rows(table: &mut Array2<f32>) {
    for mut row in table.rows_mut() {
        let n = row.dot(&row).sqrt();
        if n > 0.0 {
            row.mapv_inplace(|x| x / n);
        }
    }
}
