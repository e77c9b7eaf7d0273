//! Train the relevance classifier on `<Data>/data.tsv` and save `<Data>/model.bin`.

use std::path::PathBuf;

use passage_relevance::config::{self, RunConfig};
use passage_relevance::ml::EvaluationReport;
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
    write_config: Option<PathBuf>,
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

    if let Some(path) = &options.write_config {
        config::save_to_path(&config, path).map_err(|err| err.to_string())?;
        println!("config written: {}", path.display());
        return Ok(());
    }

    let run = workflow::run_training(&config, &data_dir).map_err(|err| err.to_string())?;

    println!(
        "rows: {} train / {} validation / {} test",
        run.train_rows, run.validation_rows, run.test_rows
    );
    println!("trees: {}", run.model.ensemble.trees.len());
    println!(
        "model: {}",
        RunConfig::resolve(&data_dir, &config.model_file).display()
    );
    if let Some(report) = &run.validation_report {
        println!();
        println!("validation:");
        print_report(report);
    }
    println!();
    println!("test:");
    print_report(&run.report);
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    for line in report.summary_lines() {
        println!("  {line}");
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--data-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--data-dir requires a value".to_string())?;
                options.data_dir = Some(PathBuf::from(value));
            }
            "--write-config" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--write-config requires a value".to_string())?;
                options.write_config = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "relevance-train",
        "",
        "Train the query/passage relevance classifier and save it as a single model file.",
        "",
        "Usage:",
        "  relevance-train [--config <path>] [--data-dir <dir>] [--write-config <path>]",
        "",
        "Options:",
        "  --config <path>    TOML run configuration (default: <data dir>/config.toml if present).",
        "  --data-dir <dir>   Data folder (default: $RELEVANCE_DATA_DIR or ./Data).",
        "  --write-config <path>  Save the effective configuration as TOML and exit.",
        "  -h, --help         Show this help text.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let options = parse_args(vec![
            "--config".into(),
            "run.toml".into(),
            "--data-dir".into(),
            "/tmp/data".into(),
            "--write-config".into(),
            "out.toml".into(),
        ])
        .unwrap();
        assert_eq!(options.config_path, Some(PathBuf::from("run.toml")));
        assert_eq!(options.data_dir, Some(PathBuf::from("/tmp/data")));
        assert_eq!(options.write_config, Some(PathBuf::from("out.toml")));
    }

    #[test]
    fn rejects_unknown_and_incomplete_flags() {
        assert!(parse_args(vec!["--bogus".into()]).is_err());
        assert!(parse_args(vec!["--config".into()]).is_err());
        assert!(parse_args(vec!["--help".into()]).unwrap_err().contains("Usage"));
    }
}
