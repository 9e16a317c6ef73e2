//! Training loop for TransE.
//!
//! The loop runs in one thread and owns nothing global: the model is passed in
//! by `&mut`, and every random draw comes from the caller's generator.
//!
//! ```text
//! Initializing -> Evaluating(baseline)
//!   -> { Shuffling -> Minibatches -> Evaluating } x epochs
//!   -> Finished | Aborted(diverged)
//! ```
//!
//! Each minibatch:
//! 1. Renormalize entity embeddings
//! 2. Corrupt heads and tails of the batch (one negative per side)
//! 3. Two training steps, one per corruption side; cost = sum of both losses
//! 4. Abort the whole run if the cost is NaN or infinite
//!
//! Divergence is fail-fast: a non-finite cost has already poisoned every row it
//! touched, so the run stops with [`Error::NonFiniteLoss`] and the model is left
//! in its last (unusable) state.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattix_transe::{Dataset, Trainer, TrainingConfig, TrainingEvent};
//! use rand::SeedableRng;
//! use rand_xorshift::XorShiftRng;
//!
//! let train = Dataset::from_file("train.txt")?;
//! let valid = Dataset::from_file_closed("valid.txt", &train)?;
//! let test = Dataset::from_file_closed("test.txt", &train)?;
//!
//! let config = TrainingConfig::default().with_epochs(100).with_full_train(true);
//! let mut rng = XorShiftRng::seed_from_u64(config.seed);
//! let (model, report) = Trainer::new(config).fit(&train, &valid, &test, &mut rng, Box::new(|_: &TrainingEvent| {}))?;
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::dataset::{Dataset, Triple};
use crate::error::{Error, Result};
use crate::evaluation::{EvalSummary, KnownTriples, RankMetrics, RankSide};
use crate::model::{ModelParams, Norm, TransE};
use crate::sampling::{corrupt_heads, corrupt_tails, minibatches, RandomSource};

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs (default: 500).
    pub epochs: usize,
    /// Train on the whole training split instead of a sample (default: false).
    pub full_train: bool,
    /// Size of the training sample when `full_train` is off (default: 5000).
    pub num_train: usize,
    /// Declared for compatibility; each positive gets exactly one negative per
    /// corruption side (default: 100).
    pub negative_samples: usize,
    /// Embedding dimension (default: 50).
    pub embedding_dim: usize,
    /// L1 regularization weight. Not applied by the loss (default: 0.0).
    pub l1_reg: f32,
    /// L2 regularization weight. Not applied by the loss (default: 0.0).
    pub l2_reg: f32,
    /// SGD learning rate (default: 0.01).
    pub learning_rate: f32,
    /// Minibatch size (default: 128).
    pub batch_size: usize,
    /// Margin for ranking loss (default: 1.0).
    pub margin: f32,
    /// Dissimilarity used for scoring (default: L1).
    pub norm: Norm,
    /// Shuffle minibatch order every epoch (default: false).
    pub shuffle: bool,
    /// Filter known triples out of the candidate lists (default: false).
    pub filtered: bool,
    /// Slots ranked during evaluation (default: tail).
    pub rank_side: RankSide,
    /// Seed for the generator a front end creates (default: 42).
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 500,
            full_train: false,
            num_train: 5000,
            negative_samples: 100,
            embedding_dim: 50,
            l1_reg: 0.0,
            l2_reg: 0.0,
            learning_rate: 0.01,
            batch_size: 128,
            margin: 1.0,
            norm: Norm::L1,
            shuffle: false,
            filtered: false,
            rank_side: RankSide::Tail,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_full_train(mut self, full_train: bool) -> Self {
        self.full_train = full_train;
        self
    }

    pub fn with_num_train(mut self, n: usize) -> Self {
        self.num_train = n;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_norm(mut self, norm: Norm) -> Self {
        self.norm = norm;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_filtered(mut self, filtered: bool) -> Self {
        self.filtered = filtered;
        self
    }

    pub fn with_rank_side(mut self, side: RankSide) -> Self {
        self.rank_side = side;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig("embedding_dim must be positive".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be finite and positive, got {}",
                self.learning_rate
            )));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "margin must be finite and non-negative, got {}",
                self.margin
            )));
        }
        if !self.full_train && self.num_train == 0 {
            return Err(Error::InvalidConfig(
                "num_train must be positive unless full_train is set".into(),
            ));
        }
        Ok(())
    }
}

/// The three triple sets a run evaluates on.
#[derive(Debug, Clone, Copy)]
pub struct Splits<'a> {
    pub train: &'a [Triple],
    pub valid: &'a [Triple],
    pub test: &'a [Triple],
}

/// Results of one completed epoch.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Wall-clock time of the epoch, evaluation included.
    pub elapsed: Duration,
    /// Mean minibatch cost (left + right loss) over the epoch.
    pub mean_cost: f32,
    pub eval: EvalSummary,
}

/// Results of a run that reached its configured epoch count.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub baseline: EvalSummary,
    pub epochs: Vec<EpochSummary>,
    pub final_eval: EvalSummary,
}

/// Progress notifications, in the order the loop produces them.
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    /// Evaluation before the first update.
    Baseline(EvalSummary),
    /// Cost of one minibatch (0-based epoch and batch).
    Minibatch { epoch: usize, batch: usize, cost: f32 },
    /// An epoch finished and was evaluated.
    EpochEnd(EpochSummary),
    /// A non-finite cost stopped the run; nothing follows.
    Diverged { epoch: usize, batch: usize, cost: f32 },
    /// All epochs done; final evaluation.
    Finished(EvalSummary),
}

/// Receives [`TrainingEvent`]s as the loop runs.
pub type ProgressCallback<'a> = Box<dyn FnMut(&TrainingEvent) + 'a>;

/// TransE trainer.
pub struct Trainer {
    config: TrainingConfig,
    initial_params: Option<ModelParams>,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            initial_params: None,
        }
    }

    /// Resume from pre-trained tables instead of a random initialization.
    pub fn with_initial_params(mut self, params: ModelParams) -> Self {
        self.initial_params = Some(params);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Create the model: the supplied parameters (shape-checked) or a random
    /// initialization drawn from `rng`.
    pub fn build_model<R: RandomSource + ?Sized>(
        &self,
        n_entities: usize,
        n_relations: usize,
        rng: &mut R,
    ) -> Result<TransE> {
        let dim = self.config.embedding_dim;
        match &self.initial_params {
            Some(params) => {
                let expect = |what, actual: (usize, usize), expected: (usize, usize)| {
                    if actual == expected {
                        Ok(())
                    } else {
                        Err(Error::ShapeMismatch {
                            what,
                            expected,
                            actual,
                        })
                    }
                };
                expect("entity embeddings", params.entities.dim(), (n_entities, dim))?;
                expect("relation embeddings", params.relations.dim(), (n_relations, dim))?;
                TransE::from_params(params.clone(), self.config.norm)
            }
            None => Ok(TransE::new(
                n_entities,
                n_relations,
                dim,
                self.config.norm,
                rng,
            )),
        }
    }

    /// The triples to train on: all of them with `full_train`, otherwise a
    /// sample of `num_train` drawn from `rng`.
    pub fn training_triples<R: RandomSource + ?Sized>(
        &self,
        train: &Dataset,
        rng: &mut R,
    ) -> Vec<Triple> {
        if self.config.full_train {
            train.triples().to_vec()
        } else {
            train.sample_triples(self.config.num_train, rng)
        }
    }

    /// Rank metrics on all three splits.
    pub fn evaluate(
        &self,
        model: &TransE,
        splits: Splits<'_>,
        known: Option<&KnownTriples>,
    ) -> EvalSummary {
        let side = self.config.rank_side;
        let metrics = |triples: &[Triple]| RankMetrics::from_ranks(&model.ranks(triples, side, known));
        EvalSummary {
            train: metrics(splits.train),
            valid: metrics(splits.valid),
            test: metrics(splits.test),
        }
    }

    /// Load-to-finish pipeline: build the model, pick training triples,
    /// then [`Trainer::run`].
    pub fn fit<R: RandomSource + ?Sized>(
        &self,
        train: &Dataset,
        valid: &Dataset,
        test: &Dataset,
        rng: &mut R,
        callback: ProgressCallback<'_>,
    ) -> Result<(TransE, TrainingReport)> {
        self.config.validate()?;
        if train.is_empty() {
            return Err(Error::InvalidConfig("training split is empty".into()));
        }

        let mut model = self.build_model(train.n_entities(), train.n_relations(), rng)?;
        let train_triples = self.training_triples(train, rng);
        info!(
            entities = model.n_entities(),
            relations = model.n_relations(),
            dim = model.dim(),
            train = train_triples.len(),
            "built model"
        );

        let known: Option<KnownTriples> = self.config.filtered.then(|| {
            train
                .triples()
                .iter()
                .chain(valid.triples())
                .chain(test.triples())
                .copied()
                .collect()
        });

        let splits = Splits {
            train: &train_triples,
            valid: valid.triples(),
            test: test.triples(),
        };
        let report = self.run(&mut model, splits, known.as_ref(), rng, callback)?;
        Ok((model, report))
    }

    /// Baseline evaluation, `epochs` passes over `splits.train`, final evaluation.
    ///
    /// Returns [`Error::NonFiniteLoss`] as soon as a minibatch cost is NaN or
    /// infinite; the epoch is not finished and no evaluation follows.
    pub fn run<R: RandomSource + ?Sized>(
        &self,
        model: &mut TransE,
        splits: Splits<'_>,
        known: Option<&KnownTriples>,
        rng: &mut R,
        mut callback: ProgressCallback<'_>,
    ) -> Result<TrainingReport> {
        let cfg = &self.config;
        cfg.validate()?;
        if cfg.l1_reg != 0.0 || cfg.l2_reg != 0.0 {
            warn!(
                l1_reg = cfg.l1_reg,
                l2_reg = cfg.l2_reg,
                "regularization weights are not applied by the margin loss"
            );
        }
        debug!(
            negative_samples = cfg.negative_samples,
            "one negative per corruption side"
        );

        let baseline = self.evaluate(model, splits, known);
        info!(mean_rank = baseline.valid.mr, "baseline evaluation");
        callback(&TrainingEvent::Baseline(baseline.clone()));

        let n_entities = model.n_entities();
        let mut epochs = Vec::with_capacity(cfg.epochs);

        for epoch in 0..cfg.epochs {
            let start = Instant::now();
            let mut total_cost = 0.0f32;
            let batches = minibatches(splits.train.len(), cfg.batch_size, cfg.shuffle, rng);
            let num_batches = batches.len();

            for (batch_idx, idx) in batches {
                model.normalize_entities();

                let positives: Vec<Triple> = idx.iter().map(|&i| splits.train[i]).collect();
                let left = corrupt_heads(&positives, n_entities, rng);
                let right = corrupt_tails(&positives, n_entities, rng);

                let out_l = model.train_step(&positives, &left, cfg.margin, cfg.learning_rate);
                let out_r = model.train_step(&positives, &right, cfg.margin, cfg.learning_rate);
                let cost = out_l.loss + out_r.loss;

                debug!(
                    epoch,
                    batch = batch_idx,
                    cost,
                    violations = out_l.violations + out_r.violations,
                    "minibatch"
                );
                callback(&TrainingEvent::Minibatch {
                    epoch,
                    batch: batch_idx,
                    cost,
                });

                if !cost.is_finite() {
                    error!(epoch, batch = batch_idx, cost, "bad cost detected, aborting");
                    callback(&TrainingEvent::Diverged {
                        epoch,
                        batch: batch_idx,
                        cost,
                    });
                    return Err(Error::NonFiniteLoss {
                        epoch,
                        batch: batch_idx,
                        cost,
                    });
                }
                total_cost += cost;
            }

            let eval = self.evaluate(model, splits, known);
            let summary = EpochSummary {
                epoch: epoch + 1,
                elapsed: start.elapsed(),
                mean_cost: if num_batches > 0 {
                    total_cost / num_batches as f32
                } else {
                    0.0
                },
                eval,
            };
            info!(
                epoch = summary.epoch,
                of = cfg.epochs,
                elapsed_s = summary.elapsed.as_secs_f64(),
                mean_cost = summary.mean_cost,
                train_mr = summary.eval.train.mr,
                valid_mr = summary.eval.valid.mr,
                test_mr = summary.eval.test.mr,
                "epoch complete"
            );
            callback(&TrainingEvent::EpochEnd(summary.clone()));
            epochs.push(summary);
        }

        let final_eval = self.evaluate(model, splits, known);
        info!(
            valid_mr = final_eval.valid.mr,
            test_mr = final_eval.test.mr,
            "training finished"
        );
        callback(&TrainingEvent::Finished(final_eval.clone()));

        Ok(TrainingReport {
            baseline,
            epochs,
            final_eval,
        })
    }
}
