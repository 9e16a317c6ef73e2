#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]

//! TransE knowledge graph embeddings, trained from triple files.
//!
//! Knowledge graphs store facts as (head, relation, tail) triples:
//! `(Einstein, won, NobelPrize)`, `(Paris, capitalOf, France)`.
//! TransE learns one vector per entity and per relation such that
//! **h + r ≈ t** holds for true facts and fails for corrupted ones.
//!
//! ```text
//!   h ----r----> t
//!   |            |
//!   v            v
//!  [0.2, 0.5] + [0.3, 0.1] ≈ [0.5, 0.6]
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module | What happens |
//! |-------|--------|--------------|
//! | Read | [`dataset`] | text triples -> integer triples + vocabularies |
//! | Corrupt | [`sampling`] | one random head and one random tail per positive |
//! | Learn | [`model`] | margin ranking loss, closed-form SGD step |
//! | Loop | [`training`] | epochs, minibatches, divergence check |
//! | Judge | [`evaluation`] | link-prediction ranks, MR / MRR / Hits@k |
//!
//! Training is single-threaded and deterministic for a given seed: one
//! generator, owned by the caller, feeds initialization, sampling and
//! shuffling.
//!
//! ## Usage
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
//! let config = TrainingConfig::default().with_epochs(10).with_full_train(true);
//! let mut rng = XorShiftRng::seed_from_u64(config.seed);
//! let (model, report) = Trainer::new(config).fit(
//!     &train, &valid, &test, &mut rng,
//!     Box::new(|event: &TrainingEvent| println!("{event:?}")),
//! )?;
//! println!("test MR: {:.1}", report.final_eval.test.mr);
//! ```
//!
//! ## References
//!
//! - Bordes et al. (2013). "Translating Embeddings for Modeling
//!   Multi-relational Data." NIPS.

pub mod dataset;
mod error;
pub mod evaluation;
pub mod model;
pub mod sampling;
pub mod training;

pub use dataset::{Dataset, DatasetStats, Triple, Vocab};
pub use error::{Error, Result, SymbolKind};
pub use evaluation::{EvalSummary, KnownTriples, RankMetrics, RankSide};
pub use model::{ModelParams, Norm, StepOutput, TransE};
pub use sampling::{corrupt_heads, corrupt_tails, minibatches, RandomSource};
pub use training::{
    EpochSummary, ProgressCallback, Splits, Trainer, TrainingConfig, TrainingEvent,
    TrainingReport,
};
