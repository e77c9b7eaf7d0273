//! Load a trained relevance model and score an unlabelled table with it.

use std::path::PathBuf;

use passage_relevance::config;
use passage_relevance::{logging, paths, workflow};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Some(dir) = options.data_dir.clone() {
        paths::set_data_dir_override(Some(dir));
    }
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let data_dir = paths::data_dir().map_err(|err| err.to_string())?;
    let config = match &options.config_path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(&data_dir),
    }
    .map_err(|err| err.to_string())?;

    let outcome = workflow::run_consumption(
        &config,
        &data_dir,
        options.input.as_deref(),
        options.output.as_deref(),
    )
    .map_err(|err| err.to_string())?;

    let meta = &outcome.model.meta;
    println!("model: {}", outcome.model_path.display());
    println!(
        "  {} trees, {} features, trained on {} rows at {}",
        outcome.model.ensemble.trees.len(),
        meta.feature_len,
        meta.train_rows,
        if meta.created_at.is_empty() { "unknown time" } else { meta.created_at.as_str() }
    );
    match &outcome.scoring {
        Some((output, summary)) => println!(
            "scored {} rows ({} skipped) -> {}",
            summary.scored,
            summary.skipped,
            output.display()
        ),
        None => println!("no input table; nothing scored"),
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--config" | "--data-dir" | "--input" | "--output" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .map(PathBuf::from)
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                match flag {
                    "--config" => options.config_path = Some(value),
                    "--data-dir" => options.data_dir = Some(value),
                    "--input" => options.input = Some(value),
                    _ => options.output = Some(value),
                }
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "relevance-consume",
        "",
        "Load the saved relevance model and score a tab-separated table of",
        "query_id, query, passage_text, passage_id rows.",
        "",
        "Usage:",
        "  relevance-consume [--config <path>] [--data-dir <dir>] [--input <tsv>] [--output <tsv>]",
        "",
        "Options:",
        "  --config <path>    TOML run configuration (default: <data dir>/config.toml if present).",
        "  --data-dir <dir>   Data folder (default: $RELEVANCE_DATA_DIR or ./Data).",
        "  --input <tsv>      Table to score (default: <data dir>/eval1_unlabelled.tsv if present).",
        "  --output <tsv>     Predictions table (default: <data dir>/predictions.tsv).",
        "  -h, --help         Show this help text.",
    ]
    .join("\n")
}
