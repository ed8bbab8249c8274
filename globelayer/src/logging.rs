//! Logging setup.
//!
//! Events go to a log file through a non-blocking writer and optionally to
//! stderr. `RUST_LOG` takes precedence over the configured level.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Errors setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid log file path: {0}")]
    InvalidPath(PathBuf),

    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to install logger: {0}")]
    Init(String),
}

/// Keeps the file writer flushing. Drop it last, at process exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

impl LoggingGuard {
    pub fn has_file(&self) -> bool {
        self._file.is_some()
    }
}

/// Installs the global subscriber.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level)
            .map_err(|_| LoggingError::InvalidFilter(settings.level.clone()))?,
    };

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = settings.stderr.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_timer(LocalTime::rfc_3339())
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError> {
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("/var/log/globelayer.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(name, PathBuf::from("globelayer.log"));

        let (dir, _) = split_log_path(Path::new("plain.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));

        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_file_logging() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/test.log");
        let settings = LoggingSettings {
            level: "info".to_string(),
            file: Some(path.clone()),
            stderr: false,
        };

        let guard = init_logging(&settings).unwrap();
        assert!(guard.has_file());
        tracing::info!(target: "globelayer", "hello from the tile engine");
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("hello from the tile engine"));

        // A second global subscriber is refused.
        assert!(matches!(
            init_logging(&LoggingSettings { file: None, ..settings }),
            Err(LoggingError::Init(_))
        ));
    }
}
