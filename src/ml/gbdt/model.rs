use serde::{Deserialize, Serialize};

use crate::dataset::Prediction;
use crate::features::SparseVector;

/// Ensemble format version written into every model.
pub const MODEL_VERSION: i64 = 1;

/// Node of a binary regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// `feature <= threshold` goes left, everything else right.
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        value: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Single-leaf tree.
    pub fn constant(value: f32) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    /// Leaf value reached by `features`.
    pub fn predict(&self, features: &SparseVector) -> f32 {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if features.get(*feature as usize) <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                Some(TreeNode::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    fn validate(&self, feature_len: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature as usize >= feature_len {
                        return Err(format!(
                            "node {idx} splits on feature {feature} but vectors have {feature_len}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [*left as usize, *right as usize] {
                        if child <= idx || child >= len {
                            return Err(format!("node {idx} points at invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {idx} has a non-finite value"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Boosted tree ensemble producing a log-odds score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    /// Model format version.
    pub model_version: i64,
    /// Number of values in each feature vector.
    pub feature_len: usize,
    /// Initial log-odds before any tree.
    pub base_score: f32,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    /// Validate structural invariants of the ensemble.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_version != MODEL_VERSION {
            return Err(format!(
                "Unsupported ensemble version {} (expected {MODEL_VERSION})",
                self.model_version
            ));
        }
        if !self.base_score.is_finite() {
            return Err("base_score must be finite".to_string());
        }
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_len)
                .map_err(|err| format!("Tree {tree_idx}: {err}"))?;
        }
        Ok(())
    }

    /// Raw log-odds: base score plus every tree in order.
    pub fn predict_raw(&self, features: &SparseVector) -> f32 {
        let mut score = self.base_score;
        for tree in &self.trees {
            score += tree.predict(features);
        }
        score
    }

    pub fn predict(&self, features: &SparseVector) -> Prediction {
        let score = self.predict_raw(features);
        Prediction {
            predicted_label: score > 0.0,
            probability: sigmoid(score),
            score,
        }
    }
}

/// Logistic function, stable for large magnitudes.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
