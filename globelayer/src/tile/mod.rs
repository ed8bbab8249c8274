//! Tile identity and per-frame tile values.
//!
//! A [`TileKey`] is the canonical, hashable identity of a pyramid patch. It is
//! the only tile state that outlives a frame: the resource cache, the absent
//! tracker and the fetch scheduler are all keyed by it. [`Tile`] values are
//! cheap, immutable and recreated by every traversal.

use std::fmt;
use std::sync::Arc;

use crate::geo::{LatLon, Sector, TileSector};
use crate::level::Level;

/// Canonical identity of a tile.
///
/// Equality, hashing and ordering cover all four fields. The derived ordering
/// (level, row, column, cache name) is the stable total order used to break
/// priority ties in the fetch queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: usize,
    pub row: i32,
    pub col: i32,
    pub cache_name: Arc<str>,
}

impl TileKey {
    pub fn new(level: usize, row: i32, col: i32, cache_name: impl Into<Arc<str>>) -> Self {
        Self {
            level,
            row,
            col,
            cache_name: cache_name.into(),
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}_{}",
            self.cache_name, self.level, self.row, self.col
        )
    }
}

/// One patch of one pyramid level, valid for a single frame.
#[derive(Debug, Clone)]
pub struct Tile {
    key: TileKey,
    sector: TileSector,
    level: Arc<Level>,
}

impl Tile {
    pub(crate) fn new(key: TileKey, sector: TileSector, level: Arc<Level>) -> Self {
        Self { key, sector, level }
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn level_index(&self) -> usize {
        self.key.level
    }

    pub fn row(&self) -> i32 {
        self.key.row
    }

    pub fn col(&self) -> i32 {
        self.key.col
    }

    /// Sector tagged by projection.
    pub fn tile_sector(&self) -> &TileSector {
        &self.sector
    }

    /// True geographic extent.
    pub fn sector(&self) -> Sector {
        self.sector.geographic()
    }

    pub fn centroid(&self) -> LatLon {
        self.sector.centroid()
    }

    /// Relative path of the tile's resource in the persistent store.
    ///
    /// Layout: `cache_name/level/row/row_col.suffix`.
    pub fn resource_path(&self) -> String {
        format!(
            "{}/{}/{}_{}{}",
            self.level.path(),
            self.key.row,
            self.key.row,
            self.key.col,
            self.level.format_suffix
        )
    }
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Tile {}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.sector())
    }
}
