//! Evaluation metrics for binary classification.
//!
//! Undefined ratios (`0 / 0`) are reported as `NaN` rather than zero so a
//! degenerate classifier is visible in the printed report.

use serde::{Deserialize, Serialize};

/// Class index of negative examples in a [`ConfusionMatrix`].
pub const NEGATIVE: usize = 0;
/// Class index of positive examples in a [`ConfusionMatrix`].
pub const POSITIVE: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    /// Two-class matrix filled from boolean truths and predictions.
    pub fn binary(pairs: impl IntoIterator<Item = (bool, bool)>) -> Self {
        let mut cm = Self::new(2);
        for (truth, predicted) in pairs {
            cm.add(usize::from(truth), usize::from(predicted));
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`, `NaN` when nothing was predicted as the class.
    pub precision: f64,
    /// `TP / (TP + FN)`, `NaN` when the class never occurs.
    pub recall: f64,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Headline numbers for a binary classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub auc: f64,
    pub f1: f64,
    pub positive_precision: f64,
    pub positive_recall: f64,
    pub negative_precision: f64,
    pub negative_recall: f64,
}

impl EvaluationMetrics {
    /// Metrics from a two-class confusion matrix and the positive-class probabilities.
    pub fn from_parts(cm: &ConfusionMatrix, labels: &[bool], probabilities: &[f32]) -> Self {
        let stats = precision_recall_by_class(cm);
        let negative = stats[NEGATIVE];
        let positive = stats[POSITIVE];
        Self {
            accuracy: accuracy(cm),
            auc: auc(labels, probabilities),
            f1: f1_score(positive.precision, positive.recall),
            positive_precision: positive.precision,
            positive_recall: positive.recall,
            negative_precision: negative.precision,
            negative_recall: negative.recall,
        }
    }
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = f64::from(cm.get(class_idx, class_idx));
        let mut fp = 0f64;
        let mut fn_ = 0f64;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += f64::from(v);
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += f64::from(cm.get(i, class_idx));
            }
        }
        stats.push(PerClassStats {
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, tp + fn_),
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let mut correct = 0u64;
    for class_idx in 0..cm.n_classes {
        correct += u64::from(cm.get(class_idx, class_idx));
    }
    ratio(correct as f64, cm.total() as f64)
}

/// Harmonic mean of precision and recall.
///
/// `NaN` if either input is undefined; zero when both are zero.
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision.is_nan() || recall.is_nan() {
        return f64::NAN;
    }
    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Area under the ROC curve via the Mann-Whitney rank statistic.
///
/// Tied scores share their average rank. `NaN` when either class is absent.
pub fn auc(labels: &[bool], scores: &[f32]) -> f64 {
    let n = labels.len().min(scores.len());
    let n_pos = labels[..n].iter().filter(|&&l| l).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0f64;
    let mut i = 0usize;
    while i < n {
        let mut j = i + 1;
        while j < n && scores[order[j]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; the tie group i..j shares the mean of i+1..=j.
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let pos_in_group = order[i..j].iter().filter(|&&idx| labels[idx]).count();
        pos_rank_sum += avg_rank * pos_in_group as f64;
        i = j;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { f64::NAN } else { num / den }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_class_stats_from_counts() {
        // truth, predicted
        let cm = ConfusionMatrix::binary([
            (true, true),
            (true, true),
            (true, false),
            (false, false),
            (false, true),
            (false, false),
        ]);
        let stats = precision_recall_by_class(&cm);
        assert_eq!(stats[POSITIVE].precision, 2.0 / 3.0);
        assert_eq!(stats[POSITIVE].recall, 2.0 / 3.0);
        assert_eq!(stats[NEGATIVE].support, 3);
        assert_eq!(accuracy(&cm), 4.0 / 6.0);
    }

    #[test]
    fn undefined_ratios_are_nan() {
        let cm = ConfusionMatrix::binary([(false, false), (false, false)]);
        let stats = precision_recall_by_class(&cm);
        assert!(stats[POSITIVE].precision.is_nan());
        assert!(stats[POSITIVE].recall.is_nan());
        assert_eq!(stats[NEGATIVE].recall, 1.0);
        assert!(accuracy(&ConfusionMatrix::new(2)).is_nan());
    }

    #[test]
    fn f1_rules() {
        assert!(f1_score(f64::NAN, 0.0).is_nan());
        assert_eq!(f1_score(0.0, 0.0), 0.0);
        assert!((f1_score(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn auc_handles_ranking_and_ties() {
        assert_eq!(auc(&[false, false, true, true], &[0.1, 0.2, 0.8, 0.9]), 1.0);
        assert_eq!(auc(&[true, true, false, false], &[0.1, 0.2, 0.8, 0.9]), 0.0);
        assert_eq!(auc(&[false, true, false, true], &[0.5, 0.5, 0.5, 0.5]), 0.5);
        // One positive ties one negative, beats the other.
        assert_eq!(auc(&[true, false, false], &[0.7, 0.7, 0.1]), 0.75);
        assert!(auc(&[true, true], &[0.1, 0.9]).is_nan());
    }
}
