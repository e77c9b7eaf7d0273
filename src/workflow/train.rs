//! Load, featurize, split, train, evaluate, save.

use std::path::Path;

use crate::config::RunConfig;
use crate::dataset::{LoaderOptions, QueryRecord, load_records, split_with_validation};
use crate::features::FittedPipeline;
use crate::ml::evaluate::{EvaluationReport, evaluate};
use crate::ml::gbdt::{TrainDataset, train_gbdt};
use crate::model::{TrainedModel, save_model};

use super::RunError;

/// Result of one training run.
#[derive(Debug, Clone)]
pub struct TrainedRun {
    pub model: TrainedModel,
    /// Metrics on the held-out test rows.
    pub report: EvaluationReport,
    /// Metrics on the validation rows, when a validation share was configured.
    pub validation_report: Option<EvaluationReport>,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,
}

/// Fit the pipeline on every record, split, train on the train side and
/// evaluate on the test side.
pub fn train_and_evaluate(config: &RunConfig, records: Vec<QueryRecord>) -> Result<TrainedRun, RunError> {
    config.validate()?;
    let pipeline = config.pipeline.fit(&records)?;
    let split = split_with_validation(
        records,
        config.split.test_fraction,
        config.split.validation_fraction,
        config.split.seed,
    )?;
    tracing::info!(
        "Split {} train / {} validation / {} test rows",
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );

    let train = to_dataset(&pipeline, &split.train)?;
    let validation = if split.validation.is_empty() {
        None
    } else {
        Some(to_dataset(&pipeline, &split.validation)?)
    };
    let ensemble = train_gbdt(&train, &config.trainer, validation.as_ref())?;
    tracing::info!("Trained {} trees", ensemble.trees.len());

    let model = TrainedModel::new(pipeline, ensemble, split.train.len(), config.trainer.clone())?;
    let report = evaluate(&model, &split.test)?;
    let validation_report = if split.validation.is_empty() {
        None
    } else {
        Some(evaluate(&model, &split.validation)?)
    };
    tracing::info!(
        "Test accuracy {:.4}, AUC {:.4}, F1 {:.4}",
        report.metrics.accuracy,
        report.metrics.auc,
        report.metrics.f1
    );
    Ok(TrainedRun {
        model,
        report,
        validation_report,
        train_rows: split.train.len(),
        validation_rows: split.validation.len(),
        test_rows: split.test.len(),
    })
}

/// Full training run against the data folder: load, train, evaluate, save.
pub fn run_training(config: &RunConfig, data_dir: &Path) -> Result<TrainedRun, RunError> {
    let train_path = RunConfig::resolve(data_dir, &config.train_file);
    let model_path = RunConfig::resolve(data_dir, &config.model_file);
    let records = load_records(&train_path, &LoaderOptions::labelled(config.has_header))?;

    let mut resolved = config.clone();
    resolved.pipeline = config.pipeline.resolve_paths(data_dir);
    let run = train_and_evaluate(&resolved, records)?;
    save_model(&model_path, &run.model)?;
    Ok(run)
}

fn to_dataset(pipeline: &FittedPipeline, records: &[QueryRecord]) -> Result<TrainDataset, RunError> {
    Ok(TrainDataset {
        feature_len: pipeline.feature_dim,
        x: pipeline.featurize(records)?,
        y: records.iter().map(|r| r.label).collect(),
    })
}
