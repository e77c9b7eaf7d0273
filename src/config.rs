//! Run configuration.
//!
//! `RunConfig` is read from `<Data>/config.toml` (defaults when absent) or an
//! explicit path. Every section is `#[serde(default)]`, so a file only needs
//! the keys it changes:
//!
//! ```toml
//! train_file = "data.tsv"
//!
//! [split]
//! test_fraction = 0.25
//!
//! [pipeline.word_hash_bag]
//! hash_bits = 16
//!
//! [trainer]
//! num_trees = 200
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::SplitConfig;
use crate::features::PipelineConfig;
use crate::ml::gbdt::TrainerConfig;

/// File name looked up inside the data folder.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that may occur while loading or saving the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// A value is out of range or inconsistent with another.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a training or consuming run needs besides the data itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Labelled training table, relative to the data folder.
    pub train_file: PathBuf,
    /// Unlabelled table scored by the consumer.
    pub score_file: PathBuf,
    pub model_file: PathBuf,
    pub predictions_file: PathBuf,
    /// Whether input tables start with a header row.
    pub has_header: bool,
    pub split: SplitConfig,
    pub pipeline: PipelineConfig,
    pub trainer: TrainerConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_file: PathBuf::from("data.tsv"),
            score_file: PathBuf::from("eval1_unlabelled.tsv"),
            model_file: PathBuf::from("model.bin"),
            predictions_file: PathBuf::from("predictions.tsv"),
            has_header: true,
            split: SplitConfig::default(),
            pipeline: PipelineConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl RunConfig {
    /// Check ranges and cross-section consistency before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let split = &self.split;
        if !(split.test_fraction > 0.0 && split.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "split.test_fraction must lie in (0, 1), got {}",
                split.test_fraction
            )));
        }
        if !(0.0..1.0).contains(&split.validation_fraction)
            || split.test_fraction + split.validation_fraction >= 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "split.validation_fraction {} leaves no training rows",
                split.validation_fraction
            )));
        }
        if self.trainer.early_stopping_rounds.is_some() && split.validation_fraction == 0.0 {
            return Err(ConfigError::Invalid(
                "trainer.early_stopping_rounds needs split.validation_fraction > 0".to_string(),
            ));
        }
        self.pipeline
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        self.trainer
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        for (name, path) in [
            ("train_file", &self.train_file),
            ("score_file", &self.score_file),
            ("model_file", &self.model_file),
            ("predictions_file", &self.predictions_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// `path` joined onto `data_dir` unless it is already absolute.
    pub fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }
}

/// Load `<data_dir>/config.toml`, returning defaults if it is missing.
pub fn load_or_default(data_dir: &Path) -> Result<RunConfig, ConfigError> {
    let path = data_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::debug!("No config at {}; using defaults", path.display());
        return Ok(RunConfig::default());
    }
    load_from_path(&path)
}

/// Load configuration from a specific TOML file.
pub fn load_from_path(path: &Path) -> Result<RunConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RunConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &RunConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, data.as_bytes())
}

/// Write through a temp file in the destination folder and persist it over `path`.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".config-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    temp.write_all(data)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(write_err)?;
    temp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::IdColumns;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_or_default(dir.path()).unwrap();
        assert_eq!(config, RunConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.trainer.num_trees, 100);
        assert_eq!(config.trainer.num_leaves, 100);
        assert_eq!(config.trainer.min_datapoints_per_leaf, 20);
        assert_eq!(config.split.seed, Some(42));
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "has_header = false\n\n[split]\ntest_fraction = 0.3\n\n[pipeline]\nid_columns = \"keep_as_features\"\n\n[pipeline.word_hash_bag]\nhash_bits = 8\n\n[trainer]\nnum_trees = 7\n",
        )
        .unwrap();
        let config = load_or_default(dir.path()).unwrap();
        assert!(!config.has_header);
        assert_eq!(config.split.test_fraction, 0.3);
        assert_eq!(config.split.seed, Some(42));
        assert_eq!(config.pipeline.id_columns, IdColumns::KeepAsFeatures);
        assert_eq!(config.pipeline.word_hash_bag.hash_bits, 8);
        assert!(config.pipeline.word_hash_bag.enabled);
        assert_eq!(config.trainer.num_trees, 7);
        assert_eq!(config.trainer.learning_rate, 0.2);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("run.toml");
        let mut config = RunConfig::default();
        config.trainer.early_stopping_rounds = Some(5);
        config.split.validation_fraction = 0.1;
        save_to_path(&config, &path).unwrap();
        assert_eq!(load_from_path(&path).unwrap(), config);
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["run.toml".to_string()]);

        config.trainer.num_trees = 7;
        save_to_path(&config, &path).unwrap();
        assert_eq!(load_from_path(&path).unwrap().trainer.num_trees, 7);
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[trainer\nnum_trees = ").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn validate_catches_inconsistent_sections() {
        let mut config = RunConfig::default();
        config.split.test_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.trainer.early_stopping_rounds = Some(3);
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.trainer.num_trees = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/data");
        assert_eq!(RunConfig::resolve(base, Path::new("x.tsv")), PathBuf::from("/data/x.tsv"));
        assert_eq!(RunConfig::resolve(base, Path::new("/abs/x.tsv")), PathBuf::from("/abs/x.tsv"));
    }
}
