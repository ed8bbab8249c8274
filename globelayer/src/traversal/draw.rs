//! Draw-list items handed to the renderer.

use std::fmt;
use std::sync::Arc;

use crate::cache::Texture;
use crate::geo::Sector;
use crate::tile::Tile;

/// Maps a tile's own `[0, 1]` texture coordinates into the texture being
/// drawn on it.
///
/// `u` runs west to east and `v` south to north, both in geographic space:
/// textures are geographic-linear once Mercator tiles have been remapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoordTransform {
    pub scale_u: f64,
    pub scale_v: f64,
    pub offset_u: f64,
    pub offset_v: f64,
}

impl TexCoordTransform {
    pub const IDENTITY: TexCoordTransform = TexCoordTransform {
        scale_u: 1.0,
        scale_v: 1.0,
        offset_u: 0.0,
        offset_v: 0.0,
    };

    /// Transform placing `inner` within the texture covering `outer`.
    pub fn between(inner: &Sector, outer: &Sector) -> Self {
        Self {
            scale_u: inner.delta_lon() / outer.delta_lon(),
            scale_v: inner.delta_lat() / outer.delta_lat(),
            offset_u: (inner.min_lon - outer.min_lon) / outer.delta_lon(),
            offset_v: (inner.min_lat - outer.min_lat) / outer.delta_lat(),
        }
    }

    pub fn apply(&self, u: f64, v: f64) -> (f64, f64) {
        (
            self.offset_u + u * self.scale_u,
            self.offset_v + v * self.scale_v,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for TexCoordTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One tile to draw this frame.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub tile: Tile,
    /// The tile's own texture, or its fallback ancestor's.
    pub texture: Arc<Texture>,
    /// The ancestor supplying `texture`, when the tile's own is not resident.
    pub fallback: Option<Tile>,
    pub tex_transform: TexCoordTransform,
}

impl DrawItem {
    pub fn own(tile: Tile, texture: Arc<Texture>) -> Self {
        Self {
            tile,
            texture,
            fallback: None,
            tex_transform: TexCoordTransform::IDENTITY,
        }
    }

    pub fn with_fallback(tile: Tile, ancestor: Tile, texture: Arc<Texture>) -> Self {
        let tex_transform = TexCoordTransform::between(&tile.sector(), &ancestor.sector());
        Self {
            tile,
            texture,
            fallback: Some(ancestor),
            tex_transform,
        }
    }

    /// Level of the texture actually drawn.
    pub fn effective_level(&self) -> usize {
        self.fallback
            .as_ref()
            .map(Tile::level_index)
            .unwrap_or_else(|| self.tile.level_index())
    }
}

impl fmt::Display for DrawItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fallback {
            Some(ancestor) => write!(f, "{} (from {})", self.tile.key(), ancestor.key()),
            None => write!(f, "{}", self.tile.key()),
        }
    }
}
