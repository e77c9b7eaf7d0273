//! Data folder helpers anchored to a working-directory-relative `Data` folder.
//!
//! The training and consuming binaries read their inputs from, and write the
//! model into, the same folder. `RELEVANCE_DATA_DIR` overrides the location for
//! tests or alternate layouts, and the binaries' `--data-dir` flag installs a
//! process-level override on top of that.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use thiserror::Error;

/// Name of the data folder resolved against the working directory.
pub const DATA_DIR_NAME: &str = "Data";
/// Environment variable that replaces the default data folder.
pub const DATA_DIR_ENV: &str = "RELEVANCE_DATA_DIR";

static DATA_DIR_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors that can occur while resolving or preparing the data folder.
#[derive(Debug, Error)]
pub enum PathError {
    /// The working directory could not be determined.
    #[error("Unable to resolve the current working directory: {0}")]
    NoWorkingDir(std::io::Error),
    /// Failed to create a directory below the data folder.
    #[error("Failed to create data directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the data folder, creating it if needed.
pub fn data_dir() -> Result<PathBuf, PathError> {
    let path = data_base_dir()?;
    std::fs::create_dir_all(&path).map_err(|source| PathError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Return the logs directory inside the data folder, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, PathError> {
    let path = data_dir()?.join("logs");
    std::fs::create_dir_all(&path).map_err(|source| PathError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Replace the data folder for the rest of the process (`None` restores the default lookup).
pub fn set_data_dir_override(path: Option<PathBuf>) {
    let mut guard = DATA_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|err| err.into_inner());
    *guard = path;
}

fn data_base_dir() -> Result<PathBuf, PathError> {
    if let Some(path) = DATA_DIR_OVERRIDE
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
    {
        return Ok(path);
    }
    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let cwd = std::env::current_dir().map_err(PathError::NoWorkingDir)?;
    Ok(cwd.join(DATA_DIR_NAME))
}
