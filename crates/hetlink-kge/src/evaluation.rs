//! Ranking metrics for held-out edges.
//!
//! Scores are passed through a sigmoid before ranking. Positives are
//! labelled 1 and sampled negatives 0; three metrics are reported per
//! relation:
//!
//! - AUROC, with tied scores sharing their average rank
//! - AUPRC, as step-wise average precision over distinct thresholds
//! - AP@k over the combined list ranked by descending score
//!
//! A non-finite score counts as 0 after the sigmoid.

use hetlink_core::{Edge, RelationType, SparseMatrix};
use hetlink_nn::Embeddings;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::model::LinkPredictionModel;

/// Default cutoff for AP@k.
pub const DEFAULT_APK_K: usize = 50;

/// Metrics of one relation on one held-out set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Area under the ROC curve.
    pub auroc: f64,
    /// Area under the precision-recall curve.
    pub auprc: f64,
    /// Average precision at `k`.
    pub apk: f64,
    /// `k` used for `apk`.
    pub k: usize,
    /// Positive edges scored.
    pub num_positives: usize,
    /// Negative edges scored.
    pub num_negatives: usize,
}

fn sigmoid(x: f32) -> f64 {
    let p = 1.0 / (1.0 + (-f64::from(x)).exp());
    if p.is_finite() {
        p
    } else {
        0.0
    }
}

fn check_labels(labels: &[bool], scores: &[f64]) -> Result<(usize, usize)> {
    if labels.len() != scores.len() {
        return Err(Error::Configuration(format!(
            "{} labels for {} scores",
            labels.len(),
            scores.len()
        )));
    }
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(Error::DegenerateLabels {
            positives,
            negatives,
        });
    }
    Ok((positives, negatives))
}

/// Indices ordered by descending score; ties keep input order.
fn descending_order(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order
}

/// Area under the ROC curve (Mann-Whitney U with average ranks for ties).
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Result<f64> {
    let (positives, negatives) = check_labels(labels, scores)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks i+1..=j+1 share their mean.
        let avg_rank = (i + j + 2) as f64 / 2.0;
        rank_sum += avg_rank * order[i..=j].iter().filter(|&&k| labels[k]).count() as f64;
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Ok((rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Average precision: `sum_n (R_n - R_{n-1}) P_n` over distinct score
/// thresholds, highest first.
pub fn average_precision(labels: &[bool], scores: &[f64]) -> Result<f64> {
    let (positives, _) = check_labels(labels, scores)?;
    let order = descending_order(scores);

    let mut tp = 0usize;
    let mut seen = 0usize;
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if labels[order[i]] {
                tp += 1;
            }
            seen += 1;
            i += 1;
        }
        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / seen as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Ok(ap)
}

/// Average precision at `k` of a ranked prediction list.
///
/// Only the first `k` predictions count, and a repeated prediction is
/// scored once. Returns 0 when `actual` is empty.
pub fn apk<T: Eq + Hash>(actual: &[T], predicted: &[T], k: usize) -> f64 {
    if actual.is_empty() || k == 0 {
        return 0.0;
    }
    let relevant: HashSet<&T> = actual.iter().collect();
    let mut seen: HashSet<&T> = HashSet::new();
    let mut hits = 0usize;
    let mut score = 0.0;
    for (i, p) in predicted.iter().take(k).enumerate() {
        if relevant.contains(p) && seen.insert(p) {
            hits += 1;
            score += hits as f64 / (i + 1) as f64;
        } else {
            seen.insert(p);
        }
    }
    score / actual.len().min(k) as f64
}

/// Scores held-out edges and checks them against the original adjacency.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    k: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self { k: DEFAULT_APK_K }
    }
}

impl Evaluator {
    /// Evaluator with AP@k cutoff `k`.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::Configuration("apk cutoff must be positive".into()));
        }
        Ok(Self { k })
    }

    /// AP@k cutoff.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Score `positives` and `negatives` of `relation` and compute metrics.
    ///
    /// Every positive must be an edge of `original` and no negative may be.
    pub fn evaluate(
        &self,
        model: &LinkPredictionModel,
        embeddings: &Embeddings,
        relation: &RelationType,
        positives: &[Edge],
        negatives: &[Edge],
        original: &SparseMatrix,
    ) -> Result<EvaluationMetrics> {
        if let Some(&(r, c)) = positives.iter().find(|&&(r, c)| !original.contains(r, c)) {
            return Err(Error::DataIntegrity {
                relation: *relation,
                message: format!("positive edge ({r}, {c}) missing from the original adjacency"),
            });
        }
        if let Some(&(r, c)) = negatives.iter().find(|&&(r, c)| original.contains(r, c)) {
            return Err(Error::DataIntegrity {
                relation: *relation,
                message: format!("negative edge ({r}, {c}) present in the original adjacency"),
            });
        }

        let pos = model
            .score_edges(embeddings, relation, positives)?
            .to_dtype(candle_core::DType::F32)?
            .to_vec1::<f32>()?;
        let neg = model
            .score_edges(embeddings, relation, negatives)?
            .to_dtype(candle_core::DType::F32)?
            .to_vec1::<f32>()?;
        self.evaluate_scores(&pos, &neg)
    }

    /// Metrics from raw positive and negative scores.
    pub fn evaluate_scores(&self, positive_scores: &[f32], negative_scores: &[f32]) -> Result<EvaluationMetrics> {
        let scores: Vec<f64> = positive_scores
            .iter()
            .chain(negative_scores)
            .map(|&s| sigmoid(s))
            .collect();
        let labels: Vec<bool> = (0..scores.len())
            .map(|i| i < positive_scores.len())
            .collect();

        let auroc = roc_auc(&labels, &scores)?;
        let auprc = average_precision(&labels, &scores)?;

        let actual: Vec<usize> = (0..positive_scores.len()).collect();
        let predicted = descending_order(&scores);
        let apk = apk(&actual, &predicted, self.k);

        Ok(EvaluationMetrics {
            auroc,
            auprc,
            apk,
            k: self.k,
            num_positives: positive_scores.len(),
            num_negatives: negative_scores.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separable_scores() {
        let m = Evaluator::default()
            .evaluate_scores(&[3.0, 2.5, 2.0], &[-1.0, -2.0])
            .unwrap();
        assert_eq!(m.auroc, 1.0);
        assert_eq!(m.auprc, 1.0);
        assert_eq!(m.apk, 1.0);
        assert_eq!((m.num_positives, m.num_negatives), (3, 2));
    }

    #[test]
    fn test_tied_positives_above_negatives() {
        let m = Evaluator::default()
            .evaluate_scores(&[1.0, 1.0, 1.0, 1.0], &[0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(m.auroc, 1.0);
        assert_eq!(m.auprc, 1.0);
        assert_eq!(m.apk, 1.0);
    }

    #[test]
    fn test_inverted_scores() {
        let m = Evaluator::default()
            .evaluate_scores(&[-3.0, -2.0], &[2.0, 3.0])
            .unwrap();
        assert_eq!(m.auroc, 0.0);
        assert!(m.auprc < 0.6);
    }

    #[test]
    fn test_roc_ties_count_half() {
        let labels = [true, false];
        assert_eq!(roc_auc(&labels, &[0.5, 0.5]).unwrap(), 0.5);
    }

    #[test]
    fn test_roc_known_value() {
        // Pairs (pos, neg): (0.8, 0.6) ok, (0.8, 0.9) bad, (0.4, 0.6) bad, (0.4, 0.9) bad.
        let labels = [true, true, false, false];
        let scores = [0.8, 0.4, 0.6, 0.9];
        assert!((roc_auc(&labels, &scores).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_average_precision_known_value() {
        // Ranking: 0.9 (-), 0.8 (+), 0.6 (-), 0.4 (+)
        // Recall steps at ranks 2 and 4 with precision 1/2 and 2/4.
        let labels = [true, true, false, false];
        let scores = [0.8, 0.4, 0.6, 0.9];
        assert!((average_precision(&labels, &scores).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_labels() {
        let err = roc_auc(&[true, true], &[0.1, 0.2]);
        assert!(matches!(
            err,
            Err(Error::DegenerateLabels {
                positives: 2,
                negatives: 0
            })
        ));
        assert!(Evaluator::default().evaluate_scores(&[], &[1.0]).is_err());
    }

    #[test]
    fn test_apk_top_positives() {
        assert_eq!(apk(&[0, 1], &[0, 1, 2, 3], 2), 1.0);
    }

    #[test]
    fn test_apk_partial() {
        // Hits at ranks 1 and 3: (1/1 + 2/3) / 2
        let v = apk(&[7, 9], &[7, 4, 9], 10);
        assert!((v - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_apk_ignores_duplicates_and_cutoff() {
        assert_eq!(apk(&[1], &[1, 1, 1], 3), 1.0);
        assert_eq!(apk(&[5], &[1, 2, 5], 2), 0.0);
        assert_eq!(apk::<usize>(&[], &[1, 2], 2), 0.0);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let m = Evaluator::new(1)
            .unwrap()
            .evaluate_scores(&[1.0], &[f32::NAN])
            .unwrap();
        assert_eq!(m.auroc, 1.0);
        assert_eq!(m.apk, 1.0);
    }
}
