//! Tracing setup for the training and consuming binaries.
//!
//! Events go to stderr (stdout carries the metrics report) and to a per-run
//! file `relevance_<timestamp>.log` under `<Data>/logs`. Only the newest
//! [`MAX_LOG_FILES`] run logs are kept.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::paths;

/// Run logs retained after pruning.
pub const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "relevance_";
const LOG_FILE_SUFFIX: &str = ".log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The data folder holding the logs could not be prepared.
    #[error("Log directory unavailable: {0}")]
    LogDir(#[from] paths::PathError),
    #[error("Failed to read log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove old log file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log filename time: {0}")]
    FormatTime(time::error::Format),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Directory receiving the per-run log file.
    pub dir: PathBuf,
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    /// Mirror events to stderr.
    pub console: bool,
    pub keep_files: usize,
}

impl LogSettings {
    /// `<Data>/logs`, `info` level, console on.
    pub fn for_data_dir() -> Result<Self, LoggingError> {
        Ok(Self {
            dir: paths::logs_dir()?,
            default_filter: "info".to_string(),
            console: true,
            keep_files: MAX_LOG_FILES,
        })
    }
}

/// Install logging with [`LogSettings::for_data_dir`].
///
/// Failures are returned so the binaries can carry on with plain stderr output.
pub fn init() -> Result<PathBuf, LoggingError> {
    init_with(&LogSettings::for_data_dir()?)
}

/// Install the global subscriber and return the log file path.
///
/// Only the first successful call installs anything; later calls report the
/// file they would have used.
pub fn init_with(settings: &LogSettings) -> Result<PathBuf, LoggingError> {
    let file_name = format_log_file_name(now_local_or_utc())?;
    let log_path = settings.dir.join(&file_name);
    if LOG_GUARD.get().is_some() {
        return Ok(log_path);
    }
    fs::create_dir_all(&settings.dir).map_err(|source| LoggingError::CreateLogFile {
        path: log_path.clone(),
        source,
    })?;
    touch(&log_path)?;
    prune_old_logs(&settings.dir, settings.keep_files)?;

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(&settings.dir, &file_name));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.default_filter));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(local_timer())
        .with_writer(file_writer);
    let console_layer = settings.console.then(|| {
        fmt::layer()
            .with_timer(local_timer())
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let subscriber = Registry::default()
        .with(filter)
        .with(file_layer)
        .with(console_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("Logging to {}", log_path.display());
    Ok(log_path)
}

fn touch(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn is_run_log(name: &str) -> bool {
    name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX)
}

/// Delete the oldest run logs beyond `keep`; other files are left alone.
fn prune_old_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let mut logs: Vec<(SystemTime, String, PathBuf)> = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_run_log(&name) {
                return None;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, name, entry.path()))
        })
        .collect();

    // Timestamped names sort chronologically; mtime breaks same-second ties.
    logs.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
    let excess = logs.len().saturating_sub(keep);
    for (_, _, path) in logs.into_iter().take(excess) {
        fs::remove_file(&path).map_err(|source| LoggingError::RemoveFile { path, source })?;
    }
    Ok(())
}

fn format_log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let stamp = now.format(NAME_FORMAT).map_err(LoggingError::FormatTime)?;
    Ok(format!("{LOG_FILE_PREFIX}{stamp}{LOG_FILE_SUFFIX}"))
}

fn local_timer() -> fmt::time::OffsetTime<&'static [FormatItem<'static>]> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT)
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_filename_has_timestamp_and_prefix() {
        let fixed = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let name = format_log_file_name(fixed).unwrap();
        assert_eq!(name, "relevance_2023-11-14_22-13-20.log");
        assert!(is_run_log(&name));
        assert!(!is_run_log("relevance_notes.txt"));
        assert!(!is_run_log("other.log"));
    }

    #[test]
    fn prune_keeps_newest_run_logs_only() {
        let dir = tempdir().unwrap();
        for day in 1..=5 {
            let name = format!("relevance_2024-01-0{day}_00-00-00.log");
            touch(&dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("notes.log"), b"keep").unwrap();
        fs::write(dir.path().join("model.bin"), b"keep").unwrap();

        prune_old_logs(dir.path(), 3).unwrap();

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec![
                "model.bin",
                "notes.log",
                "relevance_2024-01-03_00-00-00.log",
                "relevance_2024-01-04_00-00-00.log",
                "relevance_2024-01-05_00-00-00.log",
            ]
        );
    }
}
