//! Training and consumption workflows shared by the binaries and integration tests.

pub mod consume;
pub mod train;

pub use consume::{ConsumeOutcome, ScoreSummary, load_trained_model, run_consumption, score_file};
pub use train::{TrainedRun, run_training, train_and_evaluate};

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dataset::{LoadError, SplitError};
use crate::features::PipelineError;
use crate::ml::gbdt::TrainError;
use crate::model::ModelIoError;
use crate::paths::PathError;

/// Any failure that ends a training or consumption run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Feature pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Split failed: {0}")]
    Split(#[from] SplitError),
    #[error("Training failed: {0}")]
    Training(#[from] TrainError),
    #[error(transparent)]
    Model(#[from] ModelIoError),
    #[error("Failed to write predictions to {path}: {source}")]
    WritePredictions {
        path: PathBuf,
        source: std::io::Error,
    },
}
