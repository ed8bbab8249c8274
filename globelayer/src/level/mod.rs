//! Resolution pyramid: levels, level sets and tile addressing.
//!
//! A [`LevelSet`] is an ordered list of [`Level`]s, each finer than the
//! previous one, covering a bounding sector. Every tile-key computation is
//! made relative to a shared tile origin so pyramids built independently with
//! the same origin align on common boundaries.
//!
//! # Addressing
//!
//! Rows and columns are the integer quotient of the angular offset from the
//! origin by the level's tile delta. Boundaries are lower-inclusive and
//! upper-exclusive: a position exactly on a tile's minimum edge belongs to that
//! tile. Quotients within [`SNAP_EPSILON`] of an integer are snapped so that
//! boundary positions produced by `sector_for` address back to the same key.
//!
//! Mercator pyramids address rows in projected degrees (Mercator percent
//! scaled by 90), so the arithmetic is identical for both projections.

mod config;
mod url;

pub use config::LevelSetConfig;
pub use url::{TemplateUrlBuilder, UrlBuilder};

use std::sync::Arc;
use std::time::Duration;

use crate::error::PyramidError;
use crate::geo::{gudermannian_inverse, LatLon, MercatorSector, Sector, TileSector};
use crate::tile::{Tile, TileKey};

/// Quotients closer than this to an integer are treated as exact.
pub const SNAP_EPSILON: f64 = 1e-9;

/// How a level set's latitude axis is parameterised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Latitude is linear in degrees.
    #[default]
    Geographic,
    /// Latitude is linear in Mercator percent space.
    Mercator,
}

impl Projection {
    pub fn name(&self) -> &'static str {
        match self {
            Projection::Geographic => "geographic",
            Projection::Mercator => "mercator",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "geographic" | "latlon" | "epsg4326" => Some(Projection::Geographic),
            "mercator" | "webmercator" | "epsg3857" => Some(Projection::Mercator),
            _ => None,
        }
    }
}

/// One entry in the resolution pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub index: usize,
    /// Angular size of one tile (projected degrees for Mercator latitude).
    pub tile_delta: LatLon,
    pub tile_width: u32,
    pub tile_height: u32,
    pub cache_name: Arc<str>,
    /// File suffix including the dot, e.g. `.png`.
    pub format_suffix: String,
    /// Data older than this is refetched. `None` never expires.
    pub expiry: Option<Duration>,
    /// Declared but not populated; tiles of empty levels are never fetched.
    pub empty: bool,
}

impl Level {
    /// Store path prefix for tiles of this level.
    pub fn path(&self) -> String {
        format!("{}/{}", self.cache_name, self.index)
    }

    /// Approximate ground size of one texel in metres.
    pub fn texel_size(&self, radius: f64) -> f64 {
        self.tile_delta.lat.to_radians() * radius / self.tile_height.max(1) as f64
    }
}

/// Ordered collection of levels covering a region.
#[derive(Clone)]
pub struct LevelSet {
    sector: Sector,
    tile_origin: LatLon,
    projection: Projection,
    levels: Vec<Arc<Level>>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    top_level: Arc<[Tile]>,
}

impl std::fmt::Debug for LevelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelSet")
            .field("sector", &self.sector)
            .field("tile_origin", &self.tile_origin)
            .field("projection", &self.projection)
            .field("levels", &self.levels.len())
            .finish_non_exhaustive()
    }
}

impl LevelSet {
    /// Creates a level set.
    ///
    /// `sector` and `tile_origin` are in addressing space: degrees for
    /// geographic pyramids, projected degrees for Mercator pyramids.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::InvalidLevelSet`] if there are no levels, the
    /// level indices are not `0..n`, the sector is empty, or tile deltas do not
    /// strictly decrease.
    pub fn new(
        sector: Sector,
        tile_origin: LatLon,
        projection: Projection,
        levels: Vec<Level>,
    ) -> Result<Self, PyramidError> {
        if levels.is_empty() {
            return Err(PyramidError::InvalidLevelSet("no levels".to_string()));
        }
        if sector.is_empty() {
            return Err(PyramidError::InvalidLevelSet(format!(
                "sector {} has no area",
                sector
            )));
        }
        for (i, level) in levels.iter().enumerate() {
            if level.index != i {
                return Err(PyramidError::InvalidLevelSet(format!(
                    "level at position {} has index {}",
                    i, level.index
                )));
            }
            if !(level.tile_delta.lat > 0.0 && level.tile_delta.lon > 0.0) {
                return Err(PyramidError::InvalidLevelSet(format!(
                    "level {} has non-positive tile delta",
                    i
                )));
            }
        }
        for pair in levels.windows(2) {
            let (coarse, fine) = (&pair[0].tile_delta, &pair[1].tile_delta);
            if fine.lat >= coarse.lat || fine.lon >= coarse.lon {
                return Err(PyramidError::InvalidLevelSet(format!(
                    "tile delta of level {} is not finer than level {}",
                    pair[1].index, pair[0].index
                )));
            }
        }

        let mut set = Self {
            sector,
            tile_origin,
            projection,
            levels: levels.into_iter().map(Arc::new).collect(),
            url_builder: None,
            top_level: Arc::from(Vec::new()),
        };
        set.top_level = set.compute_top_level_tiles().into();
        Ok(set)
    }

    /// Attaches the builder used to derive resource identifiers.
    pub fn with_url_builder(mut self, builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = Some(builder);
        self
    }

    /// Bounding sector in addressing space.
    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    /// Bounding sector in true geographic coordinates.
    pub fn coverage(&self) -> Sector {
        match self.projection {
            Projection::Geographic => self.sector,
            Projection::Mercator => MercatorSector::from_projected(&self.sector).geographic(),
        }
    }

    pub fn tile_origin(&self) -> LatLon {
        self.tile_origin
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter().map(|l| l.as_ref())
    }

    pub fn first_level(&self) -> &Level {
        &self.levels[0]
    }

    pub fn last_level(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    /// The level before the last, or the only level of a one-level set.
    pub fn next_to_last_level(&self) -> &Level {
        let n = self.levels.len();
        &self.levels[n.saturating_sub(2)]
    }

    /// Looks up a level by index.
    pub fn level(&self, index: usize) -> Result<&Level, PyramidError> {
        self.level_arc(index).map(|l| l.as_ref())
    }

    fn level_arc(&self, index: usize) -> Result<&Arc<Level>, PyramidError> {
        self.levels.get(index).ok_or(PyramidError::InvalidLevel {
            index,
            count: self.levels.len(),
        })
    }

    pub fn is_final_level(&self, index: usize) -> bool {
        index + 1 == self.levels.len()
    }

    pub fn is_level_empty(&self, index: usize) -> bool {
        self.levels.get(index).map(|l| l.empty).unwrap_or(true)
    }

    /// Converts a geographic latitude into addressing space.
    fn addressing_lat(&self, lat: f64) -> f64 {
        match self.projection {
            Projection::Geographic => lat,
            Projection::Mercator => gudermannian_inverse(lat) * 90.0,
        }
    }

    /// Key of the tile containing a geographic position at the given level.
    pub fn tile_key_for(&self, position: LatLon, level: usize) -> Result<TileKey, PyramidError> {
        let projected = LatLon::new(self.addressing_lat(position.lat), position.lon);
        self.tile_key_for_projected(projected, level)
    }

    /// Key of the tile containing a position already in addressing space.
    pub fn tile_key_for_projected(
        &self,
        position: LatLon,
        level: usize,
    ) -> Result<TileKey, PyramidError> {
        let level = self.level_arc(level)?;
        let delta = level.tile_delta;

        let mut row = grid_index(position.lat, self.tile_origin.lat, delta.lat);
        let mut col = grid_index(position.lon, self.tile_origin.lon, delta.lon);

        // The set's upper edge is the one place where a boundary belongs to
        // the tile below it.
        if on_edge(position.lat, self.sector.max_lat)
            && on_edge(cell_min(row, self.tile_origin.lat, delta.lat), position.lat)
        {
            row -= 1;
        }
        if on_edge(position.lon, self.sector.max_lon)
            && on_edge(cell_min(col, self.tile_origin.lon, delta.lon), position.lon)
        {
            col -= 1;
        }

        Ok(TileKey::new(level.index, row, col, Arc::clone(&level.cache_name)))
    }

    /// Sector covered by the tile with the given key.
    pub fn sector_for(&self, key: &TileKey) -> Result<TileSector, PyramidError> {
        let level = self.level_arc(key.level)?;
        Ok(self.cell_sector(level, key.row, key.col))
    }

    fn cell_sector(&self, level: &Level, row: i32, col: i32) -> TileSector {
        let delta = level.tile_delta;
        let min_lat = cell_min(row, self.tile_origin.lat, delta.lat);
        let min_lon = cell_min(col, self.tile_origin.lon, delta.lon);
        let projected =
            Sector::from_degrees_unchecked(min_lat, min_lat + delta.lat, min_lon, min_lon + delta.lon);
        match self.projection {
            Projection::Geographic => TileSector::Geographic(projected),
            Projection::Mercator => TileSector::Mercator(MercatorSector::from_projected(&projected)),
        }
    }

    /// Materialises the tile for a key.
    pub fn tile_for(&self, key: &TileKey) -> Result<Tile, PyramidError> {
        let level = self.level_arc(key.level)?;
        let sector = self.cell_sector(level, key.row, key.col);
        Ok(Tile::new(key.clone(), sector, Arc::clone(level)))
    }

    /// Every level-0 tile intersecting the set's sector. Built once with the
    /// set.
    pub fn top_level_tiles(&self) -> &[Tile] {
        &self.top_level
    }

    fn compute_top_level_tiles(&self) -> Vec<Tile> {
        let level = &self.levels[0];
        let delta = level.tile_delta;
        let origin = self.tile_origin;

        let first_row = grid_index(self.sector.min_lat, origin.lat, delta.lat);
        let last_row = upper_grid_index(self.sector.max_lat, origin.lat, delta.lat);
        let first_col = grid_index(self.sector.min_lon, origin.lon, delta.lon);
        let last_col = upper_grid_index(self.sector.max_lon, origin.lon, delta.lon);

        let mut tiles = Vec::new();
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                let key = TileKey::new(0, row, col, Arc::clone(&level.cache_name));
                let sector = self.cell_sector(level, row, col);
                tiles.push(Tile::new(key, sector, Arc::clone(level)));
            }
        }
        tiles
    }

    /// The four children of a tile at the next level.
    ///
    /// Children are returned south-west, south-east, north-west, north-east.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::InvalidLevel`] when the tile is on the final
    /// level.
    pub fn sub_tiles(&self, tile: &Tile) -> Result<[Tile; 4], PyramidError> {
        let next = self.level_arc(tile.level_index() + 1)?;
        let parent = tile.tile_sector().projected();
        let lats = [
            parent.min_lat + 0.25 * parent.delta_lat(),
            parent.min_lat + 0.75 * parent.delta_lat(),
        ];
        let lons = [
            parent.min_lon + 0.25 * parent.delta_lon(),
            parent.min_lon + 0.75 * parent.delta_lon(),
        ];

        let child = |lat: f64, lon: f64| {
            let delta = next.tile_delta;
            let row = grid_index(lat, self.tile_origin.lat, delta.lat);
            let col = grid_index(lon, self.tile_origin.lon, delta.lon);
            let key = TileKey::new(next.index, row, col, Arc::clone(&next.cache_name));
            Tile::new(key, self.cell_sector(next, row, col), Arc::clone(next))
        };

        Ok([
            child(lats[0], lons[0]),
            child(lats[0], lons[1]),
            child(lats[1], lons[0]),
            child(lats[1], lons[1]),
        ])
    }

    /// Resource identifier for a tile, from the attached URL builder.
    pub fn resource_url(&self, tile: &Tile) -> Result<String, PyramidError> {
        match &self.url_builder {
            Some(builder) => builder.url_for(tile),
            None => Err(PyramidError::InvalidUrlTemplate(
                "no URL builder configured".to_string(),
            )),
        }
    }
}

#[inline]
fn cell_min(index: i32, origin: f64, delta: f64) -> f64 {
    origin + index as f64 * delta
}

#[inline]
fn on_edge(a: f64, b: f64) -> bool {
    (a - b).abs() <= SNAP_EPSILON * a.abs().max(b.abs()).max(1.0)
}

/// Lower-inclusive grid index with snapping to exact boundaries.
fn grid_index(value: f64, origin: f64, delta: f64) -> i32 {
    let quotient = (value - origin) / delta;
    let nearest = quotient.round();
    let index = if (quotient - nearest).abs() < SNAP_EPSILON {
        nearest
    } else {
        quotient.floor()
    };
    index as i32
}

/// Index of the last cell touched by an exclusive upper bound.
fn upper_grid_index(value: f64, origin: f64, delta: f64) -> i32 {
    let index = grid_index(value, origin, delta);
    if on_edge(cell_min(index, origin, delta), value) {
        index - 1
    } else {
        index
    }
}
