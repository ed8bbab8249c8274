//! INI configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ini::Ini;

use super::{config_file_path, default_cache_dir, ConfigError, ConfigKey, PyramidConfig};
use crate::absent::AbsentResourceConfig;
use crate::cache::DEFAULT_MEMORY_CACHE_BYTES;
use crate::fetch::{DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
use crate::geo::{LatLon, Sector};
use crate::level::{LevelSet, LevelSetConfig, Projection, TemplateUrlBuilder};
use crate::scheduler::{DEFAULT_MAX_DISPATCH_PER_FRAME, DEFAULT_WORKER_THREADS};
use crate::traversal::LodPolicy;

/// `[cache]`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub memory_size: u64,
    pub retain_level_zero: bool,
    /// Root of the persistent tile store.
    pub directory: PathBuf,
    /// Keep fetched tiles on disk. When false an in-memory store is used.
    pub persist: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_CACHE_BYTES,
            retain_level_zero: true,
            directory: default_cache_dir().join("tiles"),
            persist: true,
        }
    }
}

/// `[fetch]`
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub workers: usize,
    pub max_dispatch_per_frame: usize,
    pub timeout: Duration,
    pub network_enabled: bool,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_THREADS,
            max_dispatch_per_frame: DEFAULT_MAX_DISPATCH_PER_FRAME,
            timeout: DEFAULT_FETCH_TIMEOUT,
            network_enabled: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// `[traversal]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraversalSettings {
    pub force_level_zero_loads: bool,
}

/// `[layer]`: the imagery pyramid to stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSettings {
    /// Cache namespace of the layer's tiles.
    pub name: String,
    /// Resource URL template; empty when the layer is only read from disk.
    pub url_template: String,
    pub format_suffix: String,
    /// Coverage in addressing space.
    pub sector: Sector,
    pub tile_origin: LatLon,
    /// Level-zero tile size in degrees, both axes.
    pub level_zero_delta: f64,
    pub num_levels: usize,
    pub num_empty_levels: usize,
    pub tile_size: u32,
    pub projection: Projection,
    pub expiry: Option<Duration>,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            name: "earth".to_string(),
            url_template: String::new(),
            format_suffix: ".png".to_string(),
            sector: Sector::FULL_SPHERE,
            tile_origin: LatLon::new(-90.0, -180.0),
            level_zero_delta: 36.0,
            num_levels: 10,
            num_empty_levels: 0,
            tile_size: 256,
            projection: Projection::Geographic,
            expiry: None,
        }
    }
}

impl LayerSettings {
    /// Builds the layer's level set, with a URL builder when a template is
    /// configured.
    pub fn level_set(&self) -> Result<LevelSet, ConfigError> {
        let mut config = LevelSetConfig::new(
            self.name.as_str(),
            self.sector,
            LatLon::new(self.level_zero_delta, self.level_zero_delta),
            self.num_levels,
        )
        .with_tile_origin(self.tile_origin)
        .with_projection(self.projection)
        .with_empty_levels(self.num_empty_levels)
        .with_tile_size(self.tile_size, self.tile_size)
        .with_format_suffix(self.format_suffix.as_str());
        if let Some(expiry) = self.expiry {
            config = config.with_expiry(expiry);
        }

        let level_set = config.build()?;
        if self.url_template.trim().is_empty() {
            return Ok(level_set);
        }
        let builder = TemplateUrlBuilder::new(self.url_template.trim())?;
        Ok(level_set.with_url_builder(Arc::new(builder)))
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Log file; `None` disables file logging.
    pub file: Option<PathBuf>,
    /// Also log to stderr.
    pub stderr: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(default_cache_dir().join("globelayer.log")),
            stderr: false,
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub lod: LodPolicy,
    pub absent: AbsentResourceConfig,
    pub traversal: TraversalSettings,
    pub layer: LayerSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads the user's config file, or defaults when it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads a config file, or defaults when it does not exist.
    ///
    /// Keys missing from the file keep their defaults. Unknown keys are
    /// logged and ignored.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses config text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (section, properties) in ini.iter() {
            let Some(section) = section else {
                continue;
            };
            for (key, value) in properties.iter() {
                let name = format!("{}.{}", section, key);
                match name.parse::<ConfigKey>() {
                    Ok(config_key) => config_key.set(&mut config, value)?,
                    Err(_) => tracing::warn!(key = %name, "Ignoring unknown configuration key"),
                }
            }
        }
        Ok(config)
    }

    /// Saves to the user's config file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Writes every key, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini.write_to_file(path).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Engine tunables from the `[cache]`, `[fetch]`, `[lod]`, `[absent]` and
    /// `[traversal]` sections.
    pub fn pyramid_config(&self) -> PyramidConfig {
        PyramidConfig {
            memory_cache_bytes: self.cache.memory_size,
            retain_level_zero: self.cache.retain_level_zero,
            workers: self.fetch.workers,
            max_dispatch_per_frame: self.fetch.max_dispatch_per_frame,
            fetch_timeout: self.fetch.timeout,
            network_enabled: self.fetch.network_enabled,
            force_level_zero_loads: self.traversal.force_level_zero_loads,
            lod: self.lod,
            absent: self.absent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.ini");

        let mut config = ConfigFile::default();
        config.cache.memory_size = 2 * 1024 * 1024 * 1024;
        config.fetch.workers = 3;
        config.layer.url_template = "https://tiles.test/{level}/{row}/{col}.jpg".to_string();
        config.layer.expiry = Some(Duration::from_secs(86_400));
        config.logging.file = None;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ConfigFile::parse(
            "[cache]\nmemory_size = 64MB\n\n[lod]\nsplit_scale = 1.2\n\n[extra]\nwhatever = 1\n",
        )
        .unwrap();
        assert_eq!(config.cache.memory_size, 64 * 1024 * 1024);
        assert_eq!(config.lod.split_scale, 1.2);
        assert_eq!(config.fetch, FetchSettings::default());
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let result = ConfigFile::parse("[fetch]\nworkers = many\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_pyramid_config_translation() {
        let mut config = ConfigFile::default();
        config.fetch.network_enabled = false;
        config.traversal.force_level_zero_loads = true;
        config.absent.max_attempts = 7;

        let pyramid = config.pyramid_config();
        assert!(!pyramid.network_enabled);
        assert!(pyramid.force_level_zero_loads);
        assert_eq!(pyramid.absent.max_attempts, 7);
        assert_eq!(pyramid.memory_cache_bytes, config.cache.memory_size);
    }

    #[test]
    fn test_layer_level_set() {
        let mut layer = LayerSettings {
            num_levels: 4,
            ..Default::default()
        };
        let level_set = layer.level_set().unwrap();
        assert_eq!(level_set.num_levels(), 4);
        assert_eq!(level_set.top_level_tiles().len(), 50);
        assert!(level_set.resource_url(&level_set.top_level_tiles()[0]).is_err());

        layer.url_template = "https://t/{level}/{row}/{col}".to_string();
        let level_set = layer.level_set().unwrap();
        assert!(level_set.resource_url(&level_set.top_level_tiles()[0]).is_ok());

        layer.url_template = "https://t/{bogus}".to_string();
        assert!(matches!(layer.level_set(), Err(ConfigError::Layer(_))));
    }
}
