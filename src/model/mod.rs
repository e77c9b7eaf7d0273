//! The composed model: fitted feature pipeline plus tree ensemble.

pub mod container;

pub use container::{ModelIoError, load_model, read_model, save_model, write_model};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::dataset::{Prediction, RecordView, ScoredRecord};
use crate::features::{FittedPipeline, PipelineError};
use crate::ml::gbdt::{TrainerConfig, TreeEnsemble};

/// Version of the serialized [`TrainedModel`] layout.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Provenance stored alongside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub format_version: u32,
    pub feature_len: usize,
    pub train_rows: usize,
    pub trainer: TrainerConfig,
    /// RFC 3339 timestamp; empty when the clock could not be formatted.
    pub created_at: String,
}

/// Everything needed to score a record; immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub meta: ModelMeta,
    pub pipeline: FittedPipeline,
    pub ensemble: TreeEnsemble,
}

impl TrainedModel {
    pub fn new(
        pipeline: FittedPipeline,
        ensemble: TreeEnsemble,
        train_rows: usize,
        trainer: TrainerConfig,
    ) -> Result<Self, ModelIoError> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let model = Self {
            meta: ModelMeta {
                format_version: MODEL_FORMAT_VERSION,
                feature_len: pipeline.feature_dim,
                train_rows,
                trainer,
                created_at,
            },
            pipeline,
            ensemble,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check that the pipeline and ensemble agree with each other and the metadata.
    pub fn validate(&self) -> Result<(), ModelIoError> {
        if self.meta.format_version != MODEL_FORMAT_VERSION {
            return Err(ModelIoError::Invalid(format!(
                "model format version {} is not supported",
                self.meta.format_version
            )));
        }
        self.pipeline
            .validate()
            .map_err(|err| ModelIoError::Invalid(err.to_string()))?;
        self.ensemble.validate().map_err(ModelIoError::Invalid)?;
        if self.ensemble.feature_len != self.pipeline.feature_dim
            || self.meta.feature_len != self.pipeline.feature_dim
        {
            return Err(ModelIoError::Invalid(format!(
                "pipeline yields {} features, ensemble expects {}, metadata records {}",
                self.pipeline.feature_dim, self.ensemble.feature_len, self.meta.feature_len
            )));
        }
        Ok(())
    }

    pub fn predict<R: RecordView>(&self, record: &R) -> Result<Prediction, PipelineError> {
        let features = self.pipeline.featurize_one(record)?;
        Ok(self.ensemble.predict(&features))
    }

    pub fn predict_batch<R: RecordView>(&self, records: &[R]) -> Result<Vec<Prediction>, PipelineError> {
        let features = self.pipeline.featurize(records)?;
        Ok(features.iter().map(|x| self.ensemble.predict(x)).collect())
    }

    /// Predictions joined with each record's identifiers.
    pub fn score<R: RecordView>(&self, records: &[R]) -> Result<Vec<ScoredRecord>, PipelineError> {
        let predictions = self.predict_batch(records)?;
        Ok(records
            .iter()
            .zip(predictions)
            .map(|(record, prediction)| ScoredRecord {
                query_id: record.query_id(),
                passage_id: record.passage_id(),
                prediction,
            })
            .collect())
    }
}
