use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{MODEL_VERSION, Tree, TreeEnsemble, TreeNode, sigmoid};
use crate::features::SparseVector;

/// Training hyperparameters, read from the `[trainer]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Number of boosting rounds.
    pub num_trees: usize,
    /// Maximum leaves per tree.
    pub num_leaves: usize,
    /// Minimum training rows on each side of a split.
    pub min_datapoints_per_leaf: usize,
    /// Shrinkage applied to every leaf value.
    pub learning_rate: f32,
    /// Maximum histogram bins per feature.
    pub max_bins: usize,
    /// L2 penalty on leaf values.
    pub l2_regularization: f64,
    /// Share of features each tree may split on, in (0, 1].
    pub feature_fraction: f64,
    /// Seed for feature subsampling.
    pub seed: u64,
    /// Stop after this many rounds without validation improvement.
    pub early_stopping_rounds: Option<usize>,
    /// Log progress every this many trees (0 disables).
    pub log_every: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            num_leaves: 100,
            min_datapoints_per_leaf: 20,
            learning_rate: 0.2,
            max_bins: 255,
            l2_regularization: 1.0,
            feature_fraction: 1.0,
            seed: 42,
            early_stopping_rounds: None,
            log_every: 10,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.num_trees == 0 {
            return Err(invalid("num_trees must be at least 1"));
        }
        if self.num_leaves < 2 {
            return Err(invalid("num_leaves must be at least 2"));
        }
        if self.min_datapoints_per_leaf == 0 {
            return Err(invalid("min_datapoints_per_leaf must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate must be positive"));
        }
        if !(2..=usize::from(u16::MAX)).contains(&self.max_bins) {
            return Err(invalid("max_bins must lie in 2..=65535"));
        }
        if !(self.l2_regularization >= 0.0 && self.l2_regularization.is_finite()) {
            return Err(invalid("l2_regularization must be non-negative"));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(invalid("feature_fraction must lie in (0, 1]"));
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(invalid("early_stopping_rounds must be at least 1"));
        }
        Ok(())
    }
}

/// Feature vectors with aligned binary labels.
#[derive(Debug, Clone)]
pub struct TrainDataset {
    /// Dimension of every feature vector.
    pub feature_len: usize,
    pub x: Vec<SparseVector>,
    pub y: Vec<bool>,
}

impl TrainDataset {
    pub fn positives(&self) -> usize {
        self.y.iter().filter(|&&label| label).count()
    }

    fn check(&self) -> Result<(), TrainError> {
        if self.x.len() != self.y.len() {
            return Err(TrainError::Mismatched {
                features: self.x.len(),
                labels: self.y.len(),
            });
        }
        for (row, vector) in self.x.iter().enumerate() {
            if vector.dim != self.feature_len {
                return Err(TrainError::DimensionMismatch {
                    row,
                    expected: self.feature_len,
                    found: vector.dim,
                });
            }
            if vector.values.iter().any(|v| !v.is_finite()) {
                return Err(TrainError::NonFinite { row });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Training set is empty")]
    Empty,
    #[error("Mismatched training data: {features} feature rows, {labels} labels")]
    Mismatched { features: usize, labels: usize },
    #[error("Training set has {rows} rows, fewer than the {min} required per leaf")]
    TooFewRows { rows: usize, min: usize },
    #[error("Training labels contain a single class (positive = {positive})")]
    SingleClass { positive: bool },
    #[error("Invalid trainer hyperparameter: {0}")]
    InvalidHyperparameter(String),
    #[error("Row {row} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Row {row} contains a non-finite feature value")]
    NonFinite { row: usize },
}

fn invalid(message: &str) -> TrainError {
    TrainError::InvalidHyperparameter(message.to_string())
}

/// Train a binary logistic tree ensemble.
///
/// `validation`, when given, is scored after every tree; its log loss drives
/// early stopping and progress logging but never the fitted splits.
pub fn train_gbdt(
    dataset: &TrainDataset,
    config: &TrainerConfig,
    validation: Option<&TrainDataset>,
) -> Result<TreeEnsemble, TrainError> {
    config.validate()?;
    dataset.check()?;
    if dataset.x.is_empty() {
        return Err(TrainError::Empty);
    }
    let n = dataset.x.len();
    if n < config.min_datapoints_per_leaf {
        return Err(TrainError::TooFewRows {
            rows: n,
            min: config.min_datapoints_per_leaf,
        });
    }
    let positives = dataset.positives();
    if positives == 0 || positives == n {
        return Err(TrainError::SingleClass {
            positive: positives == n,
        });
    }
    if let Some(validation) = validation {
        validation.check()?;
        if validation.feature_len != dataset.feature_len {
            return Err(TrainError::DimensionMismatch {
                row: 0,
                expected: dataset.feature_len,
                found: validation.feature_len,
            });
        }
    }

    let binned = BinnedMatrix::build(&dataset.x, dataset.feature_len, config.max_bins);
    let targets: Vec<f64> = dataset.y.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();
    let base_score = ((positives as f64) / ((n - positives) as f64)).ln() as f32;
    let mut scores = vec![base_score; n];
    let mut val_scores: Option<Vec<f32>> = validation.map(|v| vec![base_score; v.x.len()]);

    tracing::info!(
        "Training {} trees on {} rows ({} positive), {} features, {} splittable",
        config.num_trees,
        n,
        positives,
        dataset.feature_len,
        binned.splittable_features()
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut grad = vec![0.0f64; n];
    let mut hess = vec![0.0f64; n];
    let mut trees: Vec<Tree> = Vec::with_capacity(config.num_trees);
    let mut best_round = 0usize;
    let mut best_val_loss = f64::INFINITY;

    for round in 0..config.num_trees {
        for i in 0..n {
            let p = f64::from(sigmoid(scores[i]));
            grad[i] = p - targets[i];
            hess[i] = (p * (1.0 - p)).max(1e-16);
        }
        let allowed = feature_mask(&binned, config.feature_fraction, &mut rng);
        let grower = TreeGrower {
            binned: &binned,
            grad: &grad,
            hess: &hess,
            allowed: allowed.as_deref(),
            config,
        };
        let (tree, leaves) = grower.grow();
        for (value, rows) in &leaves {
            for &row in rows {
                scores[row as usize] += *value;
            }
        }
        trees.push(tree);

        let train_loss = log_loss(&dataset.y, &scores);
        let mut val_loss = None;
        if let (Some(validation), Some(val_scores)) = (validation, val_scores.as_mut()) {
            let tree = &trees[round];
            for (score, x) in val_scores.iter_mut().zip(&validation.x) {
                *score += tree.predict(x);
            }
            let loss = log_loss(&validation.y, val_scores);
            if loss < best_val_loss {
                best_val_loss = loss;
                best_round = round;
            }
            val_loss = Some(loss);
        }

        if config.log_every > 0 && (round + 1) % config.log_every == 0 {
            match val_loss {
                Some(val) => tracing::info!(
                    "Tree {}/{}: train log loss {:.5}, validation log loss {:.5}",
                    round + 1,
                    config.num_trees,
                    train_loss,
                    val
                ),
                None => tracing::info!(
                    "Tree {}/{}: train log loss {:.5}",
                    round + 1,
                    config.num_trees,
                    train_loss
                ),
            }
        }

        if let (Some(patience), Some(_)) = (config.early_stopping_rounds, val_loss) {
            if round - best_round >= patience {
                tracing::info!(
                    "Early stopping after {} trees; best validation log loss {:.5} at tree {}",
                    round + 1,
                    best_val_loss,
                    best_round + 1
                );
                trees.truncate(best_round + 1);
                break;
            }
        }
    }

    Ok(TreeEnsemble {
        model_version: MODEL_VERSION,
        feature_len: dataset.feature_len,
        base_score,
        trees,
    })
}

/// Mean binary cross-entropy of log-odds `scores` against `labels`.
pub fn log_loss(labels: &[bool], scores: &[f32]) -> f64 {
    if labels.is_empty() {
        return f64::NAN;
    }
    let eps = 1e-15;
    let total: f64 = labels
        .iter()
        .zip(scores)
        .map(|(&label, &score)| {
            let p = f64::from(sigmoid(score)).clamp(eps, 1.0 - eps);
            if label { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    total / labels.len() as f64
}

fn feature_mask(binned: &BinnedMatrix, fraction: f64, rng: &mut StdRng) -> Option<Vec<bool>> {
    if fraction >= 1.0 {
        return None;
    }
    Some(
        (0..binned.features.len())
            .map(|_| rng.random_bool(fraction))
            .collect(),
    )
}

/// Split points for one feature. A value `v` falls in bin
/// `#{t in thresholds : t < v}`, so `bin <= b` exactly when `v <= thresholds[b]`.
#[derive(Debug, Clone, Default)]
struct FeatureBins {
    thresholds: Vec<f32>,
    zero_bin: u16,
    offset: usize,
}

impl FeatureBins {
    fn bin_of(&self, value: f32) -> u16 {
        self.thresholds.partition_point(|&t| t < value) as u16
    }

    fn n_bins(&self) -> usize {
        self.thresholds.len() + 1
    }
}

/// Sparse row-major bin indices; implicit entries sit in each feature's zero bin.
struct BinnedMatrix {
    features: Vec<FeatureBins>,
    rows: Vec<Vec<(u32, u16)>>,
    total_bins: usize,
}

impl BinnedMatrix {
    fn build(x: &[SparseVector], feature_len: usize, max_bins: usize) -> Self {
        let n = x.len();
        let mut columns: Vec<Vec<f32>> = vec![Vec::new(); feature_len];
        for row in x {
            for (idx, value) in row.iter() {
                columns[idx as usize].push(value);
            }
        }
        let mut features = Vec::with_capacity(feature_len);
        let mut total_bins = 0usize;
        for values in &columns {
            let thresholds = quantile_thresholds(values, n - values.len(), max_bins);
            let mut bins = FeatureBins {
                thresholds,
                zero_bin: 0,
                offset: total_bins,
            };
            bins.zero_bin = bins.bin_of(0.0);
            if !bins.thresholds.is_empty() {
                total_bins += bins.n_bins();
            }
            features.push(bins);
        }
        let rows = x
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|&(idx, _)| !features[idx as usize].thresholds.is_empty())
                    .map(|(idx, value)| (idx, features[idx as usize].bin_of(value)))
                    .collect()
            })
            .collect();
        Self {
            features,
            rows,
            total_bins,
        }
    }

    fn splittable_features(&self) -> usize {
        self.features
            .iter()
            .filter(|f| !f.thresholds.is_empty())
            .count()
    }

    fn bin(&self, row: u32, feature: u32) -> u16 {
        let entries = &self.rows[row as usize];
        match entries.binary_search_by_key(&feature, |&(f, _)| f) {
            Ok(pos) => entries[pos].1,
            Err(_) => self.features[feature as usize].zero_bin,
        }
    }
}

/// Midpoints between distinct values, thinned to equal-frequency cuts when
/// there are more than `max_bins` distinct values.
fn quantile_thresholds(nonzero: &[f32], zeros: usize, max_bins: usize) -> Vec<f32> {
    let mut counts: BTreeMap<OrderedFloat<f32>, usize> = BTreeMap::new();
    for &value in nonzero {
        *counts.entry(OrderedFloat(value)).or_default() += 1;
    }
    if zeros > 0 {
        *counts.entry(OrderedFloat(0.0)).or_default() += zeros;
    }
    let distinct: Vec<(f32, usize)> = counts.into_iter().map(|(v, c)| (v.0, c)).collect();
    if distinct.len() < 2 {
        return Vec::new();
    }
    let mut thresholds = Vec::new();
    let mut push = |a: f32, b: f32| {
        let mid = ((f64::from(a) + f64::from(b)) / 2.0) as f32;
        if thresholds.last().is_none_or(|&last| mid > last) {
            thresholds.push(mid);
        }
    };
    if distinct.len() <= max_bins {
        for pair in distinct.windows(2) {
            push(pair[0].0, pair[1].0);
        }
        return thresholds;
    }
    let total: usize = distinct.iter().map(|&(_, c)| c).sum();
    let per_bin = total as f64 / max_bins as f64;
    let mut cumulative = 0usize;
    let mut cuts = 0usize;
    for pair in distinct.windows(2) {
        cumulative += pair[0].1;
        if cuts + 1 >= max_bins {
            break;
        }
        if cumulative as f64 >= per_bin * (cuts + 1) as f64 {
            push(pair[0].0, pair[1].0);
            cuts += 1;
        }
    }
    thresholds
}

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    grad: f64,
    hess: f64,
    count: u32,
}

impl Stats {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    fn minus(self, other: Stats) -> Stats {
        Stats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }

    fn score(&self, lambda: f64) -> f64 {
        self.grad * self.grad / (self.hess + lambda)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    gain: f64,
    feature: u32,
    bin: u16,
}

struct LeafState {
    node: usize,
    rows: Vec<u32>,
    stats: Stats,
    best: Option<Candidate>,
}

struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    allowed: Option<&'a [bool]>,
    config: &'a TrainerConfig,
}

impl TreeGrower<'_> {
    /// Grow one tree best-first; returns it with each leaf's value and rows.
    fn grow(&self) -> (Tree, Vec<(f32, Vec<u32>)>) {
        let all_rows: Vec<u32> = (0..self.grad.len() as u32).collect();
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let mut leaves = vec![self.leaf(0, all_rows)];

        while leaves.len() < self.config.num_leaves {
            let mut pick: Option<(usize, Candidate)> = None;
            for (idx, leaf) in leaves.iter().enumerate() {
                if let Some(candidate) = leaf.best {
                    if pick.is_none_or(|(_, best)| candidate.gain > best.gain) {
                        pick = Some((idx, candidate));
                    }
                }
            }
            let Some((leaf_idx, candidate)) = pick else {
                break;
            };
            let leaf = leaves.swap_remove(leaf_idx);
            let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = leaf
                .rows
                .iter()
                .partition(|&&row| self.binned.bin(row, candidate.feature) <= candidate.bin);
            let feature = &self.binned.features[candidate.feature as usize];
            let left = nodes.len();
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[leaf.node] = TreeNode::Split {
                feature: candidate.feature,
                threshold: feature.thresholds[candidate.bin as usize],
                left: left as u32,
                right: (left + 1) as u32,
            };
            leaves.push(self.leaf(left, left_rows));
            leaves.push(self.leaf(left + 1, right_rows));
        }

        let lambda = self.config.l2_regularization;
        let mut out = Vec::with_capacity(leaves.len());
        leaves.sort_by_key(|leaf| leaf.node);
        for leaf in leaves {
            let raw = -leaf.stats.grad / (leaf.stats.hess + lambda);
            let value = (raw * f64::from(self.config.learning_rate)) as f32;
            nodes[leaf.node] = TreeNode::Leaf { value };
            out.push((value, leaf.rows));
        }
        (Tree { nodes }, out)
    }

    fn leaf(&self, node: usize, rows: Vec<u32>) -> LeafState {
        let mut stats = Stats::default();
        for &row in &rows {
            stats.add(self.grad[row as usize], self.hess[row as usize]);
        }
        let best = self.best_split(&rows, stats);
        LeafState {
            node,
            rows,
            stats,
            best,
        }
    }

    fn best_split(&self, rows: &[u32], total: Stats) -> Option<Candidate> {
        let min_leaf = self.config.min_datapoints_per_leaf as u32;
        if total.count < min_leaf.saturating_mul(2) {
            return None;
        }
        let binned = self.binned;
        let mut hist = vec![Stats::default(); binned.total_bins];
        let mut touched_sum: BTreeMap<u32, Stats> = BTreeMap::new();
        for &row in rows {
            let g = self.grad[row as usize];
            let h = self.hess[row as usize];
            for &(feature, bin) in &binned.rows[row as usize] {
                if let Some(allowed) = self.allowed {
                    if !allowed[feature as usize] {
                        continue;
                    }
                }
                let offset = binned.features[feature as usize].offset;
                hist[offset + bin as usize].add(g, h);
                touched_sum.entry(feature).or_default().add(g, h);
            }
        }

        let lambda = self.config.l2_regularization;
        let parent = total.score(lambda);
        let mut best: Option<Candidate> = None;
        for (&feature, explicit) in &touched_sum {
            let bins = &binned.features[feature as usize];
            let slots = &mut hist[bins.offset..bins.offset + bins.n_bins()];
            let implicit = total.minus(*explicit);
            let zero = &mut slots[bins.zero_bin as usize];
            zero.grad += implicit.grad;
            zero.hess += implicit.hess;
            zero.count += implicit.count;

            let mut left = Stats::default();
            for (bin, slot) in slots.iter().enumerate().take(bins.n_bins() - 1) {
                left.grad += slot.grad;
                left.hess += slot.hess;
                left.count += slot.count;
                if left.count < min_leaf {
                    continue;
                }
                let right = total.minus(left);
                if right.count < min_leaf {
                    break;
                }
                let gain = left.score(lambda) + right.score(lambda) - parent;
                if gain > 1e-12 && best.is_none_or(|b| gain > b.gain) {
                    best = Some(Candidate {
                        gain,
                        feature,
                        bin: bin as u16,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> TrainDataset {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let positive = i % 3 == 0;
            let signal = if positive { 1.0 + (i % 5) as f32 } else { 0.0 };
            let noise = (i % 7) as f32 * 0.1;
            x.push(SparseVector::from_dense(&[signal, noise, 0.0]));
            y.push(positive);
        }
        TrainDataset {
            feature_len: 3,
            x,
            y,
        }
    }

    fn small_config() -> TrainerConfig {
        TrainerConfig {
            num_trees: 20,
            num_leaves: 8,
            min_datapoints_per_leaf: 5,
            log_every: 0,
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn learns_separable_signal() {
        let data = separable(120);
        let model = train_gbdt(&data, &small_config(), None).unwrap();
        assert_eq!(model.trees.len(), 20);
        assert!(model.validate().is_ok());
        let correct = data
            .x
            .iter()
            .zip(&data.y)
            .filter(|&(x, &y)| model.predict(x).predicted_label == y)
            .count();
        assert_eq!(correct, data.x.len());
        assert!(model.trees.iter().all(|t| t.num_leaves() <= 8));
    }

    #[test]
    fn training_is_deterministic() {
        let data = separable(90);
        let config = TrainerConfig {
            feature_fraction: 0.7,
            ..small_config()
        };
        let a = train_gbdt(&data, &config, None).unwrap();
        let b = train_gbdt(&data, &config, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn base_score_is_log_odds() {
        let data = separable(90);
        let model = train_gbdt(&data, &small_config(), None).unwrap();
        let expected = (30.0f64 / 60.0).ln() as f32;
        assert_eq!(model.base_score, expected);
    }

    #[test]
    fn leaves_respect_minimum_size() {
        let data = separable(60);
        let config = TrainerConfig {
            num_trees: 1,
            min_datapoints_per_leaf: 25,
            ..small_config()
        };
        let model = train_gbdt(&data, &config, None).unwrap();
        let mut per_leaf: BTreeMap<u32, usize> = BTreeMap::new();
        for x in &data.x {
            *per_leaf.entry(model.trees[0].predict(x).to_bits()).or_default() += 1;
        }
        assert!(per_leaf.values().all(|&count| count >= 25));
    }

    #[test]
    fn early_stopping_truncates_to_best_round() {
        let data = separable(120);
        let validation = separable(60);
        let config = TrainerConfig {
            num_trees: 200,
            early_stopping_rounds: Some(3),
            ..small_config()
        };
        let model = train_gbdt(&data, &config, Some(&validation)).unwrap();
        assert!(!model.trees.is_empty());
        assert!(model.trees.len() <= 200);
    }

    #[test]
    fn rejects_single_class_and_tiny_sets() {
        let mut data = separable(60);
        data.y.iter_mut().for_each(|y| *y = false);
        assert!(matches!(
            train_gbdt(&data, &small_config(), None),
            Err(TrainError::SingleClass { positive: false })
        ));

        let tiny = separable(3);
        assert!(matches!(
            train_gbdt(&tiny, &small_config(), None),
            Err(TrainError::TooFewRows { rows: 3, min: 5 })
        ));

        let empty = TrainDataset {
            feature_len: 3,
            x: Vec::new(),
            y: Vec::new(),
        };
        assert!(matches!(
            train_gbdt(&empty, &small_config(), None),
            Err(TrainError::Empty)
        ));
    }

    #[test]
    fn rejects_invalid_hyperparameters() {
        let data = separable(60);
        for config in [
            TrainerConfig {
                num_trees: 0,
                ..small_config()
            },
            TrainerConfig {
                num_leaves: 1,
                ..small_config()
            },
            TrainerConfig {
                learning_rate: 0.0,
                ..small_config()
            },
            TrainerConfig {
                feature_fraction: 1.5,
                ..small_config()
            },
        ] {
            assert!(matches!(
                train_gbdt(&data, &config, None),
                Err(TrainError::InvalidHyperparameter(_))
            ));
        }
    }

    #[test]
    fn thresholds_thin_to_max_bins() {
        let values: Vec<f32> = (1..=1000).map(|v| v as f32).collect();
        let thresholds = quantile_thresholds(&values, 0, 10);
        assert!(thresholds.len() <= 9);
        assert!(thresholds.windows(2).all(|w| w[0] < w[1]));

        let few = quantile_thresholds(&[2.0, 2.0, 4.0], 5, 255);
        assert_eq!(few, vec![1.0, 3.0]);
    }
}
