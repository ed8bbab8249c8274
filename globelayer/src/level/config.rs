//! Builder for regular level sets whose tile delta halves per level.

use std::sync::Arc;
use std::time::Duration;

use super::{Level, LevelSet, Projection};
use crate::error::PyramidError;
use crate::geo::{LatLon, Sector};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default resource file suffix.
pub const DEFAULT_FORMAT_SUFFIX: &str = ".png";

/// Default tiling origin shared by every pyramid that does not override it.
pub const DEFAULT_TILE_ORIGIN: LatLon = LatLon::new(-90.0, -180.0);

/// Description of a regular pyramid.
///
/// Level `i` has tile delta `level_zero_delta / 2^i`. The first
/// `num_empty_levels` levels are declared but carry no data.
#[derive(Debug, Clone)]
pub struct LevelSetConfig {
    pub cache_name: String,
    pub sector: Sector,
    pub tile_origin: LatLon,
    pub projection: Projection,
    pub level_zero_delta: LatLon,
    pub num_levels: usize,
    pub num_empty_levels: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    pub format_suffix: String,
    pub expiry: Option<Duration>,
}

impl LevelSetConfig {
    /// Creates a config with default origin, tile size and suffix.
    pub fn new(
        cache_name: impl Into<String>,
        sector: Sector,
        level_zero_delta: LatLon,
        num_levels: usize,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            sector,
            tile_origin: DEFAULT_TILE_ORIGIN,
            projection: Projection::Geographic,
            level_zero_delta,
            num_levels,
            num_empty_levels: 0,
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            format_suffix: DEFAULT_FORMAT_SUFFIX.to_string(),
            expiry: None,
        }
    }

    pub fn with_tile_origin(mut self, origin: LatLon) -> Self {
        self.tile_origin = origin;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_empty_levels(mut self, count: usize) -> Self {
        self.num_empty_levels = count;
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    pub fn with_format_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.format_suffix = suffix.into();
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Builds the level set.
    pub fn build(self) -> Result<LevelSet, PyramidError> {
        if self.num_empty_levels >= self.num_levels && self.num_levels > 0 {
            return Err(PyramidError::InvalidLevelSet(format!(
                "all {} levels are declared empty",
                self.num_levels
            )));
        }

        let cache_name: Arc<str> = Arc::from(self.cache_name.as_str());
        let levels = (0..self.num_levels)
            .map(|index| {
                let divisor = (1u64 << index.min(62)) as f64;
                Level {
                    index,
                    tile_delta: LatLon::new(
                        self.level_zero_delta.lat / divisor,
                        self.level_zero_delta.lon / divisor,
                    ),
                    tile_width: self.tile_width,
                    tile_height: self.tile_height,
                    cache_name: Arc::clone(&cache_name),
                    format_suffix: self.format_suffix.clone(),
                    expiry: self.expiry,
                    empty: index < self.num_empty_levels,
                }
            })
            .collect();

        LevelSet::new(self.sector, self.tile_origin, self.projection, levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_halve_per_level() {
        let set = LevelSetConfig::new("t", Sector::FULL_SPHERE, LatLon::new(36.0, 36.0), 4)
            .build()
            .unwrap();
        let deltas: Vec<f64> = set.levels().map(|l| l.tile_delta.lat).collect();
        assert_eq!(deltas, vec![36.0, 18.0, 9.0, 4.5]);
    }

    #[test]
    fn test_empty_levels_are_flagged() {
        let set = LevelSetConfig::new("t", Sector::FULL_SPHERE, LatLon::new(36.0, 36.0), 4)
            .with_empty_levels(2)
            .build()
            .unwrap();
        assert!(set.is_level_empty(0));
        assert!(set.is_level_empty(1));
        assert!(!set.is_level_empty(2));
        assert!(set.is_level_empty(99));
    }

    #[test]
    fn test_all_levels_empty_is_rejected() {
        let result = LevelSetConfig::new("t", Sector::FULL_SPHERE, LatLon::new(36.0, 36.0), 2)
            .with_empty_levels(2)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_options_propagate() {
        let set = LevelSetConfig::new("t", Sector::FULL_SPHERE, LatLon::new(36.0, 36.0), 2)
            .with_tile_size(512, 256)
            .with_format_suffix(".jpg")
            .with_expiry(Duration::from_secs(3600))
            .build()
            .unwrap();
        let level = set.last_level();
        assert_eq!((level.tile_width, level.tile_height), (512, 256));
        assert_eq!(level.format_suffix, ".jpg");
        assert_eq!(level.expiry, Some(Duration::from_secs(3600)));
    }
}
