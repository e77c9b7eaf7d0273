//! Scoring a trained model against labelled records.

use serde::{Deserialize, Serialize};

use super::metrics::{ConfusionMatrix, EvaluationMetrics};
use crate::dataset::{Prediction, QueryRecord};
use crate::features::PipelineError;
use crate::model::TrainedModel;

/// Metrics plus the counts they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: EvaluationMetrics,
    pub confusion: ConfusionMatrix,
    pub rows: usize,
    pub positives: usize,
}

impl EvaluationReport {
    /// Human-readable report: headline metrics, then the confusion matrix.
    pub fn summary_lines(&self) -> Vec<String> {
        let m = &self.metrics;
        let cm = &self.confusion;
        vec![
            format!("rows: {} ({} positive)", self.rows, self.positives),
            format!("accuracy: {:.4}", m.accuracy),
            format!("auc: {:.4}", m.auc),
            format!("f1: {:.4}", m.f1),
            format!(
                "positive  precision={:.4}  recall={:.4}",
                m.positive_precision, m.positive_recall
            ),
            format!(
                "negative  precision={:.4}  recall={:.4}",
                m.negative_precision, m.negative_recall
            ),
            "confusion matrix (rows=true, cols=pred; 0=negative, 1=positive):".to_string(),
            format!("{:6}{:6}", cm.get(0, 0), cm.get(0, 1)),
            format!("{:6}{:6}", cm.get(1, 0), cm.get(1, 1)),
        ]
    }
}

/// Run `model` over `records` and aggregate the binary metrics.
pub fn evaluate(model: &TrainedModel, records: &[QueryRecord]) -> Result<EvaluationReport, PipelineError> {
    let predictions = model.predict_batch(records)?;
    let labels: Vec<bool> = records.iter().map(|r| r.label).collect();
    Ok(evaluate_predictions(&labels, &predictions))
}

/// Aggregate metrics for precomputed predictions aligned with `labels`.
pub fn evaluate_predictions(labels: &[bool], predictions: &[Prediction]) -> EvaluationReport {
    let confusion = ConfusionMatrix::binary(
        labels
            .iter()
            .zip(predictions)
            .map(|(&truth, prediction)| (truth, prediction.predicted_label)),
    );
    let probabilities: Vec<f32> = predictions.iter().map(|p| p.probability).collect();
    let rows = labels.len().min(predictions.len());
    let metrics = EvaluationMetrics::from_parts(&confusion, &labels[..rows], &probabilities[..rows]);
    EvaluationReport {
        metrics,
        confusion,
        rows,
        positives: labels[..rows].iter().filter(|&&l| l).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::PipelineConfig;
    use crate::ml::gbdt::{MODEL_VERSION, TreeEnsemble};
    use crate::ml::metrics::POSITIVE;

    fn majority_records() -> Vec<QueryRecord> {
        (0..10)
            .map(|i| {
                QueryRecord::new(
                    i,
                    format!("query {i}"),
                    format!("passage text {i}"),
                    i >= 7,
                    100 + i,
                )
            })
            .collect()
    }

    #[test]
    fn majority_class_model_scores_seventy_percent() {
        let records = majority_records();
        let pipeline = PipelineConfig::default().fit(&records).unwrap();
        let ensemble = TreeEnsemble {
            model_version: MODEL_VERSION,
            feature_len: pipeline.feature_dim,
            base_score: (3.0f32 / 7.0).ln(),
            trees: Vec::new(),
        };
        let model = TrainedModel::new(pipeline, ensemble, records.len(), Default::default()).unwrap();

        let report = evaluate(&model, &records).unwrap();
        assert_eq!(report.rows, 10);
        assert_eq!(report.positives, 3);
        assert!((report.metrics.accuracy - 0.7).abs() < 1e-12);
        assert_eq!(report.metrics.positive_recall, 0.0);
        assert!(report.metrics.positive_precision.is_nan());
        assert!(report.metrics.f1.is_nan());
        assert_eq!(report.metrics.negative_recall, 1.0);
        assert_eq!(report.metrics.auc, 0.5);
        assert_eq!(report.confusion.get(POSITIVE, 0), 3);
    }

    #[test]
    fn precomputed_predictions() {
        let prediction = |label: bool, probability: f32| Prediction {
            predicted_label: label,
            probability,
            score: 0.0,
        };
        let report = evaluate_predictions(
            &[true, false, true, false],
            &[
                prediction(true, 0.9),
                prediction(false, 0.2),
                prediction(false, 0.4),
                prediction(true, 0.6),
            ],
        );
        assert_eq!(report.metrics.accuracy, 0.5);
        assert_eq!(report.metrics.positive_precision, 0.5);
        assert_eq!(report.metrics.positive_recall, 0.5);
        assert_eq!(report.metrics.f1, 0.5);
        assert_eq!(report.metrics.auc, 0.75);
        assert_eq!(report.summary_lines().len(), 9);
    }
}
