//! Addressable configuration keys.
//!
//! Every setting in `config.ini` has a `section.key` name used by
//! `globelayer config get/set`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::{format_size, parse_size, ConfigError, ConfigFile};
use crate::geo::{LatLon, Sector};
use crate::level::Projection;

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    CacheMemorySize,
    CacheRetainLevelZero,
    CacheDirectory,
    CachePersist,
    FetchWorkers,
    FetchMaxDispatchPerFrame,
    FetchTimeout,
    FetchNetworkEnabled,
    FetchUserAgent,
    LodSplitScale,
    LodCellSizeDivisor,
    AbsentMaxAttempts,
    AbsentMinCheckInterval,
    AbsentCooldown,
    AbsentMaxRecords,
    TraversalForceLevelZeroLoads,
    LayerName,
    LayerUrlTemplate,
    LayerFormatSuffix,
    LayerSector,
    LayerTileOrigin,
    LayerLevelZeroDelta,
    LayerNumLevels,
    LayerNumEmptyLevels,
    LayerTileSize,
    LayerProjection,
    LayerExpiry,
    LoggingLevel,
    LoggingFile,
    LoggingStderr,
}

const ALL_KEYS: &[ConfigKey] = &[
    ConfigKey::CacheMemorySize,
    ConfigKey::CacheRetainLevelZero,
    ConfigKey::CacheDirectory,
    ConfigKey::CachePersist,
    ConfigKey::FetchWorkers,
    ConfigKey::FetchMaxDispatchPerFrame,
    ConfigKey::FetchTimeout,
    ConfigKey::FetchNetworkEnabled,
    ConfigKey::FetchUserAgent,
    ConfigKey::LodSplitScale,
    ConfigKey::LodCellSizeDivisor,
    ConfigKey::AbsentMaxAttempts,
    ConfigKey::AbsentMinCheckInterval,
    ConfigKey::AbsentCooldown,
    ConfigKey::AbsentMaxRecords,
    ConfigKey::TraversalForceLevelZeroLoads,
    ConfigKey::LayerName,
    ConfigKey::LayerUrlTemplate,
    ConfigKey::LayerFormatSuffix,
    ConfigKey::LayerSector,
    ConfigKey::LayerTileOrigin,
    ConfigKey::LayerLevelZeroDelta,
    ConfigKey::LayerNumLevels,
    ConfigKey::LayerNumEmptyLevels,
    ConfigKey::LayerTileSize,
    ConfigKey::LayerProjection,
    ConfigKey::LayerExpiry,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingFile,
    ConfigKey::LoggingStderr,
];

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        ALL_KEYS
    }

    /// Full `section.key` name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::CacheMemorySize => "cache.memory_size",
            ConfigKey::CacheRetainLevelZero => "cache.retain_level_zero",
            ConfigKey::CacheDirectory => "cache.directory",
            ConfigKey::CachePersist => "cache.persist",
            ConfigKey::FetchWorkers => "fetch.workers",
            ConfigKey::FetchMaxDispatchPerFrame => "fetch.max_dispatch_per_frame",
            ConfigKey::FetchTimeout => "fetch.timeout",
            ConfigKey::FetchNetworkEnabled => "fetch.network_enabled",
            ConfigKey::FetchUserAgent => "fetch.user_agent",
            ConfigKey::LodSplitScale => "lod.split_scale",
            ConfigKey::LodCellSizeDivisor => "lod.cell_size_divisor",
            ConfigKey::AbsentMaxAttempts => "absent.max_attempts",
            ConfigKey::AbsentMinCheckInterval => "absent.min_check_interval",
            ConfigKey::AbsentCooldown => "absent.cooldown",
            ConfigKey::AbsentMaxRecords => "absent.max_records",
            ConfigKey::TraversalForceLevelZeroLoads => "traversal.force_level_zero_loads",
            ConfigKey::LayerName => "layer.name",
            ConfigKey::LayerUrlTemplate => "layer.url_template",
            ConfigKey::LayerFormatSuffix => "layer.format_suffix",
            ConfigKey::LayerSector => "layer.sector",
            ConfigKey::LayerTileOrigin => "layer.tile_origin",
            ConfigKey::LayerLevelZeroDelta => "layer.level_zero_delta",
            ConfigKey::LayerNumLevels => "layer.num_levels",
            ConfigKey::LayerNumEmptyLevels => "layer.num_empty_levels",
            ConfigKey::LayerTileSize => "layer.tile_size",
            ConfigKey::LayerProjection => "layer.projection",
            ConfigKey::LayerExpiry => "layer.expiry",
            ConfigKey::LoggingLevel => "logging.level",
            ConfigKey::LoggingFile => "logging.file",
            ConfigKey::LoggingStderr => "logging.stderr",
        }
    }

    /// INI section.
    pub fn section(&self) -> &'static str {
        self.name().split_once('.').map(|(s, _)| s).unwrap_or("")
    }

    /// Key within the section.
    pub fn key_name(&self) -> &'static str {
        self.name().split_once('.').map(|(_, k)| k).unwrap_or("")
    }

    /// Short description for `config list`.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigKey::CacheMemorySize => "Memory budget for decoded textures (e.g. 512MB)",
            ConfigKey::CacheRetainLevelZero => "Keep level-zero textures outside the budget",
            ConfigKey::CacheDirectory => "Root directory of the on-disk tile store",
            ConfigKey::CachePersist => "Write fetched tiles to disk",
            ConfigKey::FetchWorkers => "Concurrent fetch workers",
            ConfigKey::FetchMaxDispatchPerFrame => "Fetch tasks started per frame",
            ConfigKey::FetchTimeout => "Network timeout in seconds",
            ConfigKey::FetchNetworkEnabled => "Fetch missing tiles from the network",
            ConfigKey::FetchUserAgent => "HTTP User-Agent header",
            ConfigKey::LodSplitScale => "Refinement bias; higher splits sooner",
            ConfigKey::LodCellSizeDivisor => "Texels per tile edge used for cell size",
            ConfigKey::AbsentMaxAttempts => "Failures before a tile is held back",
            ConfigKey::AbsentMinCheckInterval => "Seconds between retries of a failing tile",
            ConfigKey::AbsentCooldown => "Seconds before a held-back tile is retried",
            ConfigKey::AbsentMaxRecords => "Failing tiles remembered before the oldest are forgotten",
            ConfigKey::TraversalForceLevelZeroLoads => "Load all of level zero before refining",
            ConfigKey::LayerName => "Cache name of the imagery layer",
            ConfigKey::LayerUrlTemplate => "Tile URL template, e.g. https://host/{level}/{row}/{col}.png",
            ConfigKey::LayerFormatSuffix => "File suffix of stored tiles",
            ConfigKey::LayerSector => "Coverage as min_lat,max_lat,min_lon,max_lon",
            ConfigKey::LayerTileOrigin => "Tiling origin as lat,lon",
            ConfigKey::LayerLevelZeroDelta => "Level-zero tile size in degrees",
            ConfigKey::LayerNumLevels => "Number of pyramid levels",
            ConfigKey::LayerNumEmptyLevels => "Leading levels without imagery",
            ConfigKey::LayerTileSize => "Tile edge length in pixels",
            ConfigKey::LayerProjection => "geographic or mercator",
            ConfigKey::LayerExpiry => "Seconds before stored tiles are refetched; blank for never",
            ConfigKey::LoggingLevel => "Log filter, overridden by RUST_LOG",
            ConfigKey::LoggingFile => "Log file path; blank disables file logging",
            ConfigKey::LoggingStderr => "Also log to stderr",
        }
    }

    /// Current value, as written to the file.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::CacheMemorySize => format_size(config.cache.memory_size),
            ConfigKey::CacheRetainLevelZero => config.cache.retain_level_zero.to_string(),
            ConfigKey::CacheDirectory => config.cache.directory.display().to_string(),
            ConfigKey::CachePersist => config.cache.persist.to_string(),
            ConfigKey::FetchWorkers => config.fetch.workers.to_string(),
            ConfigKey::FetchMaxDispatchPerFrame => config.fetch.max_dispatch_per_frame.to_string(),
            ConfigKey::FetchTimeout => config.fetch.timeout.as_secs().to_string(),
            ConfigKey::FetchNetworkEnabled => config.fetch.network_enabled.to_string(),
            ConfigKey::FetchUserAgent => config.fetch.user_agent.clone(),
            ConfigKey::LodSplitScale => config.lod.split_scale.to_string(),
            ConfigKey::LodCellSizeDivisor => config.lod.cell_size_divisor.to_string(),
            ConfigKey::AbsentMaxAttempts => config.absent.max_attempts.to_string(),
            ConfigKey::AbsentMinCheckInterval => {
                config.absent.min_check_interval.as_secs().to_string()
            }
            ConfigKey::AbsentCooldown => config.absent.cooldown.as_secs().to_string(),
            ConfigKey::AbsentMaxRecords => config.absent.max_records.to_string(),
            ConfigKey::TraversalForceLevelZeroLoads => {
                config.traversal.force_level_zero_loads.to_string()
            }
            ConfigKey::LayerName => config.layer.name.clone(),
            ConfigKey::LayerUrlTemplate => config.layer.url_template.clone(),
            ConfigKey::LayerFormatSuffix => config.layer.format_suffix.clone(),
            ConfigKey::LayerSector => {
                let s = &config.layer.sector;
                format!("{},{},{},{}", s.min_lat, s.max_lat, s.min_lon, s.max_lon)
            }
            ConfigKey::LayerTileOrigin => {
                let o = config.layer.tile_origin;
                format!("{},{}", o.lat, o.lon)
            }
            ConfigKey::LayerLevelZeroDelta => config.layer.level_zero_delta.to_string(),
            ConfigKey::LayerNumLevels => config.layer.num_levels.to_string(),
            ConfigKey::LayerNumEmptyLevels => config.layer.num_empty_levels.to_string(),
            ConfigKey::LayerTileSize => config.layer.tile_size.to_string(),
            ConfigKey::LayerProjection => config.layer.projection.name().to_string(),
            ConfigKey::LayerExpiry => config
                .layer
                .expiry
                .map(|d| d.as_secs().to_string())
                .unwrap_or_default(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ConfigKey::LoggingStderr => config.logging.stderr.to_string(),
        }
    }

    /// Parses and stores a value.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::CacheMemorySize => {
                config.cache.memory_size = parse_size(value).map_err(|_| {
                    self.invalid(value, "expected a size such as 512MB or 2GB")
                })?
            }
            ConfigKey::CacheRetainLevelZero => config.cache.retain_level_zero = self.bool(value)?,
            ConfigKey::CacheDirectory => {
                if value.is_empty() {
                    return Err(self.invalid(value, "directory must not be empty"));
                }
                config.cache.directory = expand_home(value)
            }
            ConfigKey::CachePersist => config.cache.persist = self.bool(value)?,
            ConfigKey::FetchWorkers => config.fetch.workers = self.positive(value)?,
            ConfigKey::FetchMaxDispatchPerFrame => {
                config.fetch.max_dispatch_per_frame = self.positive(value)?
            }
            ConfigKey::FetchTimeout => {
                config.fetch.timeout = Duration::from_secs(self.positive(value)?)
            }
            ConfigKey::FetchNetworkEnabled => config.fetch.network_enabled = self.bool(value)?,
            ConfigKey::FetchUserAgent => config.fetch.user_agent = value.to_string(),
            ConfigKey::LodSplitScale => config.lod.split_scale = self.finite(value)?,
            ConfigKey::LodCellSizeDivisor => {
                let divisor = self.finite(value)?;
                if divisor <= 0.0 {
                    return Err(self.invalid(value, "must be greater than zero"));
                }
                config.lod.cell_size_divisor = divisor;
            }
            ConfigKey::AbsentMaxAttempts => config.absent.max_attempts = self.positive(value)?,
            ConfigKey::AbsentMinCheckInterval => {
                config.absent.min_check_interval = Duration::from_secs(self.number(value)?)
            }
            ConfigKey::AbsentCooldown => {
                config.absent.cooldown = Duration::from_secs(self.number(value)?)
            }
            ConfigKey::AbsentMaxRecords => config.absent.max_records = self.positive(value)?,
            ConfigKey::TraversalForceLevelZeroLoads => {
                config.traversal.force_level_zero_loads = self.bool(value)?
            }
            ConfigKey::LayerName => {
                if value.is_empty() || value.contains(['/', '\\']) {
                    return Err(self.invalid(value, "must be a non-empty name without slashes"));
                }
                config.layer.name = value.to_string()
            }
            ConfigKey::LayerUrlTemplate => config.layer.url_template = value.to_string(),
            ConfigKey::LayerFormatSuffix => config.layer.format_suffix = value.to_string(),
            ConfigKey::LayerSector => {
                let [min_lat, max_lat, min_lon, max_lon] = self.floats::<4>(value)?;
                config.layer.sector = Sector::new(min_lat, max_lat, min_lon, max_lon)
                    .map_err(|e| self.invalid(value, &e.to_string()))?;
            }
            ConfigKey::LayerTileOrigin => {
                let [lat, lon] = self.floats::<2>(value)?;
                config.layer.tile_origin = LatLon::new(lat, lon);
            }
            ConfigKey::LayerLevelZeroDelta => {
                let delta = self.finite(value)?;
                if delta <= 0.0 {
                    return Err(self.invalid(value, "must be greater than zero"));
                }
                config.layer.level_zero_delta = delta;
            }
            ConfigKey::LayerNumLevels => config.layer.num_levels = self.positive(value)?,
            ConfigKey::LayerNumEmptyLevels => config.layer.num_empty_levels = self.number(value)?,
            ConfigKey::LayerTileSize => config.layer.tile_size = self.positive(value)?,
            ConfigKey::LayerProjection => {
                config.layer.projection = Projection::from_name(value)
                    .ok_or_else(|| self.invalid(value, "expected geographic or mercator"))?
            }
            ConfigKey::LayerExpiry => {
                config.layer.expiry = if value.is_empty() {
                    None
                } else {
                    Some(Duration::from_secs(self.positive(value)?))
                }
            }
            ConfigKey::LoggingLevel => config.logging.level = value.to_string(),
            ConfigKey::LoggingFile => {
                config.logging.file = if value.is_empty() {
                    None
                } else {
                    Some(expand_home(value))
                }
            }
            ConfigKey::LoggingStderr => config.logging.stderr = self.bool(value)?,
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name().to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn bool(&self, value: &str) -> Result<bool, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid(value, "expected true or false")),
        }
    }

    fn number<T: FromStr>(&self, value: &str) -> Result<T, ConfigError> {
        value
            .parse()
            .map_err(|_| self.invalid(value, "expected a whole number"))
    }

    fn positive<T: FromStr + PartialOrd + Default>(&self, value: &str) -> Result<T, ConfigError> {
        let number: T = self.number(value)?;
        if number <= T::default() {
            return Err(self.invalid(value, "must be greater than zero"));
        }
        Ok(number)
    }

    fn finite(&self, value: &str) -> Result<f64, ConfigError> {
        match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            _ => Err(self.invalid(value, "expected a number")),
        }
    }

    fn floats<const N: usize>(&self, value: &str) -> Result<[f64; N], ConfigError> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() != N {
            return Err(self.invalid(value, &format!("expected {} comma-separated numbers", N)));
        }
        let mut out = [0.0; N];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = self.finite(part)?;
        }
        Ok(out)
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    }
}
