//! Machine learning building blocks: the boosted-tree classifier and its evaluation.

pub mod evaluate;
pub mod gbdt;
pub mod metrics;

pub use evaluate::{EvaluationReport, evaluate, evaluate_predictions};
pub use metrics::{ConfusionMatrix, EvaluationMetrics};
