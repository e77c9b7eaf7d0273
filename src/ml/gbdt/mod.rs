//! Gradient-boosted regression trees for binary classification.
//!
//! - Logistic loss with log-odds initialization.
//! - Leaf-wise tree growth over quantile-binned sparse features.
//! - Optional validation monitoring with early stopping.
//! - JSON-serializable ensembles that score without any training state.

mod model;
mod train;

pub use model::{MODEL_VERSION, Tree, TreeEnsemble, TreeNode, sigmoid};
pub use train::{TrainDataset, TrainError, TrainerConfig, log_loss, train_gbdt};
