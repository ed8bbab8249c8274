//! Configuration.
//!
//! [`PyramidConfig`] holds the engine tunables consumed by
//! [`TilePyramidBuilder`](crate::pyramid::TilePyramidBuilder). [`ConfigFile`]
//! is the INI file users edit (through `globelayer config set` or by hand),
//! which also describes the imagery layer and logging.
//!
//! ```ini
//! [cache]
//! memory_size = 512MB
//! retain_level_zero = true
//!
//! [fetch]
//! workers = 8
//! max_dispatch_per_frame = 16
//!
//! [layer]
//! url_template = https://tiles.example.com/{level}/{row}/{col}.png
//! ```

mod file;
mod keys;
mod size;

pub use file::{
    CacheSettings, ConfigFile, FetchSettings, LayerSettings, LoggingSettings, TraversalSettings,
};
pub use keys::ConfigKey;
pub use size::{format_size, parse_size};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::absent::AbsentResourceConfig;
use crate::cache::DEFAULT_MEMORY_CACHE_BYTES;
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::scheduler::{DEFAULT_MAX_DISPATCH_PER_FRAME, DEFAULT_WORKER_THREADS};
use crate::traversal::LodPolicy;

/// Directory name used under the platform config and cache directories.
pub const APP_DIR_NAME: &str = "globelayer";

/// Errors loading, saving or editing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid size '{0}' (expected e.g. 512MB or 2GB)")]
    InvalidSize(String),

    #[error("Invalid layer definition: {0}")]
    Layer(#[from] crate::error::PyramidError),
}

/// Path of the user's config file.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// Directory holding the config file.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Per-user cache directory holding the tile store and the log file.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidConfig {
    /// Byte budget of the in-memory resource cache.
    pub memory_cache_bytes: u64,
    /// Keep level-zero textures outside the budget.
    pub retain_level_zero: bool,
    /// Concurrent fetch workers.
    pub workers: usize,
    /// Upper bound on tasks handed to workers per frame.
    pub max_dispatch_per_frame: usize,
    pub fetch_timeout: Duration,
    /// When false only the local store is consulted.
    pub network_enabled: bool,
    /// Draw and request only level zero until it is fully resident.
    pub force_level_zero_loads: bool,
    pub lod: LodPolicy,
    pub absent: AbsentResourceConfig,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            memory_cache_bytes: DEFAULT_MEMORY_CACHE_BYTES,
            retain_level_zero: true,
            workers: DEFAULT_WORKER_THREADS,
            max_dispatch_per_frame: DEFAULT_MAX_DISPATCH_PER_FRAME,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            network_enabled: true,
            force_level_zero_loads: false,
            lod: LodPolicy::default(),
            absent: AbsentResourceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_defaults() {
        let config = PyramidConfig::default();
        assert_eq!(config.memory_cache_bytes, 512 * 1024 * 1024);
        assert!(config.retain_level_zero);
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_dispatch_per_frame, 16);
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert!(config.network_enabled);
        assert!(!config.force_level_zero_loads);
        assert_eq!(config.lod.split_scale, 0.9);
        assert_eq!(config.lod.cell_size_divisor, 20.0);
        assert_eq!(config.absent.max_attempts, 3);
        assert_eq!(config.absent.min_check_interval, Duration::from_secs(10));
        assert_eq!(config.absent.cooldown, Duration::from_secs(60));
        assert_eq!(config.absent.max_records, 10_000);
    }

    #[test]
    fn test_config_path_ends_with_app_dir() {
        let path = config_file_path();
        assert!(path.ends_with("globelayer/config.ini"));
    }
}
