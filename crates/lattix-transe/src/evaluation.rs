//! Rank-based evaluation for link prediction.
//!
//! For a test triple (h, r, t) every entity is tried in the tail slot,
//! candidates are sorted by ascending dissimilarity, and the 1-based position of
//! the true tail is its rank. Head ranks are computed the same way with the
//! head slot replaced.
//!
//! # Raw vs filtered
//!
//! | Setting | Candidates | Use |
//! |---------|------------|-----|
//! | Raw | every entity | what the training loop reports by default |
//! | Filtered | skip candidates that form another known true triple | benchmark comparisons |
//!
//! # Ties
//!
//! Ties keep candidate-index order, i.e. the rank equals the position the true
//! entity would get from a stable sort of all candidates by score.
//!
//! # Metrics
//!
//! | Metric | Range | Description |
//! |--------|-------|-------------|
//! | MR | [1, n] | Mean Rank (lower is better) |
//! | MRR | (0, 1] | Mean Reciprocal Rank |
//! | Hits@k | [0, 1] | Fraction with rank <= k |

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::Triple;

/// Which slot(s) to corrupt during rank evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankSide {
    /// Rank the true tail among all candidate tails.
    #[default]
    Tail,
    /// Rank the true head among all candidate heads.
    Head,
    /// Both: tail rank then head rank for every triple.
    Both,
}

/// Rank-based evaluation results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    /// Mean Rank: E\[rank\]
    pub mr: f64,
    /// Mean Reciprocal Rank: E\[1/rank\]
    pub mrr: f64,
    /// Hits@1: P(rank = 1)
    pub hits_at_1: f64,
    /// Hits@3: P(rank <= 3)
    pub hits_at_3: f64,
    /// Hits@10: P(rank <= 10)
    pub hits_at_10: f64,
    /// Number of ranks aggregated
    pub num_ranks: usize,
}

impl RankMetrics {
    /// Compute metrics from a list of ranks. An empty list gives all zeros.
    pub fn from_ranks(ranks: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }

        let n = ranks.len() as f64;
        let mr = ranks.iter().map(|&r| r as f64).sum::<f64>() / n;
        let mrr = ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n;
        let hits = |k: usize| ranks.iter().filter(|&&r| r <= k).count() as f64 / n;

        Self {
            mr,
            mrr,
            hits_at_1: hits(1),
            hits_at_3: hits(3),
            hits_at_10: hits(10),
            num_ranks: ranks.len(),
        }
    }

    /// Format as summary string.
    pub fn summary(&self) -> String {
        format!(
            "MR: {:.2} | MRR: {:.4} | H@1: {:.3} | H@3: {:.3} | H@10: {:.3} (n={})",
            self.mr, self.mrr, self.hits_at_1, self.hits_at_3, self.hits_at_10, self.num_ranks
        )
    }
}

/// Metrics for the three splits at one point of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub train: RankMetrics,
    pub valid: RankMetrics,
    pub test: RankMetrics,
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  mean training triples rank: {:.6}", self.train.mr)?;
        writeln!(f, "  mean validation triples rank: {:.6}", self.valid.mr)?;
        write!(f, "  mean test triples rank: {:.6}", self.test.mr)
    }
}

/// Set of true triples used to filter candidates.
#[derive(Debug, Clone, Default)]
pub struct KnownTriples {
    triples: HashSet<Triple>,
}

impl KnownTriples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, triple: Triple) {
        self.triples.insert(triple);
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

impl Extend<Triple> for KnownTriples {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        self.triples.extend(iter);
    }
}

impl FromIterator<Triple> for KnownTriples {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Self {
            triples: iter.into_iter().collect(),
        }
    }
}

/// Stable-order rank of candidate `target` among `scores` (ascending is better).
///
/// Equivalent to the 1-based position of `target` after a stable sort of all
/// candidate indices by score. Candidates for which `keep` returns false are
/// ignored; `target` itself is always kept.
pub fn stable_rank(scores: &[f32], target: usize, mut keep: impl FnMut(usize) -> bool) -> usize {
    let target_score = scores[target];
    let mut rank = 1;
    for (c, &s) in scores.iter().enumerate() {
        if c == target || !keep(c) {
            continue;
        }
        if s < target_score || (s == target_score && c < target) {
            rank += 1;
        }
    }
    rank
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_metrics_from_ranks() {
        let ranks = vec![1, 2, 3, 10, 100];
        let metrics = RankMetrics::from_ranks(&ranks);

        // MR = (1 + 2 + 3 + 10 + 100) / 5 = 23.2
        assert!((metrics.mr - 23.2).abs() < 1e-9);
        // MRR = (1 + 0.5 + 0.333 + 0.1 + 0.01) / 5
        assert!((metrics.mrr - 0.3887).abs() < 0.001);
        assert!((metrics.hits_at_1 - 0.2).abs() < 1e-9);
        assert!((metrics.hits_at_3 - 0.6).abs() < 1e-9);
        assert!((metrics.hits_at_10 - 0.8).abs() < 1e-9);
        assert_eq!(metrics.num_ranks, 5);
    }

    #[test]
    fn test_rank_metrics_empty() {
        let metrics = RankMetrics::from_ranks(&[]);
        assert_eq!(metrics.num_ranks, 0);
        assert_eq!(metrics.mr, 0.0);
    }

    #[test]
    fn test_stable_rank_orders_by_ascending_score() {
        let scores = [0.3, 0.1, 0.9, 0.5];
        assert_eq!(stable_rank(&scores, 1, |_| true), 1);
        assert_eq!(stable_rank(&scores, 0, |_| true), 2);
        assert_eq!(stable_rank(&scores, 3, |_| true), 3);
        assert_eq!(stable_rank(&scores, 2, |_| true), 4);
    }

    #[test]
    fn test_stable_rank_ties_follow_index_order() {
        let scores = [0.5, 0.5, 0.5];
        assert_eq!(stable_rank(&scores, 0, |_| true), 1);
        assert_eq!(stable_rank(&scores, 1, |_| true), 2);
        assert_eq!(stable_rank(&scores, 2, |_| true), 3);
    }

    #[test]
    fn test_stable_rank_single_candidate() {
        assert_eq!(stable_rank(&[42.0], 0, |_| true), 1);
    }

    #[test]
    fn test_stable_rank_filter_skips_candidates() {
        let scores = [0.1, 0.2, 0.3];
        assert_eq!(stable_rank(&scores, 2, |c| c != 0), 2);
    }

    #[test]
    fn test_eval_summary_display() {
        let summary = EvalSummary {
            train: RankMetrics::from_ranks(&[1, 3]),
            valid: RankMetrics::from_ranks(&[4]),
            test: RankMetrics::from_ranks(&[5, 5]),
        };
        let text = summary.to_string();
        assert!(text.contains("mean training triples rank: 2.000000"));
        assert!(text.contains("mean validation triples rank: 4.000000"));
        assert!(text.contains("mean test triples rank: 5.000000"));
    }
}
