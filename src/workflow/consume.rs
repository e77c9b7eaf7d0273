//! Load a saved model and, optionally, score an unlabelled table with it.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::dataset::{LoaderOptions, ScoredRecord, UnlabelledRecord, read_rows_lenient};
use crate::model::{TrainedModel, load_model};

use super::RunError;

/// Header of the predictions table.
pub const PREDICTIONS_HEADER: &str = "query_id\tpassage_id\tpredicted_label\tprobability\tscore";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSummary {
    pub scored: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ConsumeOutcome {
    pub model: TrainedModel,
    pub model_path: PathBuf,
    /// Present when a table was scored.
    pub scoring: Option<(PathBuf, ScoreSummary)>,
}

/// Load the configured model file; a missing file is fatal.
pub fn load_trained_model(config: &RunConfig, data_dir: &Path) -> Result<TrainedModel, RunError> {
    let path = RunConfig::resolve(data_dir, &config.model_file);
    Ok(load_model(&path)?)
}

/// Score every well-formed row of `input` and write the predictions table to `output`.
///
/// Malformed rows are logged and skipped.
pub fn score_file(
    model: &TrainedModel,
    input: &Path,
    output: &Path,
    has_header: bool,
) -> Result<ScoreSummary, RunError> {
    let rows = read_rows_lenient::<UnlabelledRecord>(input, &LoaderOptions::unlabelled(has_header))?;
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for result in rows {
        match result.row {
            Ok(record) => records.push(record),
            Err(kind) => {
                skipped += 1;
                tracing::warn!("Skipping {} line {}: {}", input.display(), result.line, kind);
            }
        }
    }
    let scored = model.score(&records)?;
    write_predictions(output, &scored)?;
    tracing::info!(
        "Scored {} rows from {} into {} ({} skipped)",
        scored.len(),
        input.display(),
        output.display(),
        skipped
    );
    Ok(ScoreSummary {
        scored: scored.len(),
        skipped,
    })
}

/// Load the model, then score `input` (or the configured score file when it exists).
pub fn run_consumption(
    config: &RunConfig,
    data_dir: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<ConsumeOutcome, RunError> {
    let model_path = RunConfig::resolve(data_dir, &config.model_file);
    let model = load_model(&model_path)?;

    let input = match input {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = RunConfig::resolve(data_dir, &config.score_file);
            default.exists().then_some(default)
        }
    };
    let scoring = match input {
        Some(input) => {
            let output = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| RunConfig::resolve(data_dir, &config.predictions_file));
            let summary = score_file(&model, &input, &output, config.has_header)?;
            Some((output, summary))
        }
        None => {
            tracing::info!("No scoring input found; model loaded only");
            None
        }
    };
    Ok(ConsumeOutcome {
        model,
        model_path,
        scoring,
    })
}

fn write_predictions(path: &Path, rows: &[ScoredRecord]) -> Result<(), RunError> {
    let write_err = |source: std::io::Error| RunError::WritePredictions {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".predictions")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        writeln!(writer, "{PREDICTIONS_HEADER}").map_err(write_err)?;
        for row in rows {
            let p = &row.prediction;
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                row.query_id, row.passage_id, p.predicted_label, p.probability, p.score
            )
            .map_err(write_err)?;
        }
        writer.flush().map_err(write_err)?;
    }
    temp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}
