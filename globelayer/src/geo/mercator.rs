//! Mercator percent space and projection-aware sectors.
//!
//! A Mercator pyramid subdivides linearly in projected space but culls and
//! measures distances in true geographic space. Projected latitude is stored
//! as a "percent" in `[-1, 1]`, where `±1` maps to the Web Mercator latitude
//! limit of ±85.0511°.
//!
//! For tile addressing the percent is scaled to "projected degrees"
//! (`percent * 90`) so that row/column arithmetic is shared with geographic
//! pyramids.

use std::f64::consts::PI;

use super::sector::{LatLon, Sector};

/// Scale between Mercator percent and projected degrees.
pub const PROJECTED_DEGREES_PER_PERCENT: f64 = 90.0;

/// Latitude at Mercator percent `±1`.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Converts Mercator percent to latitude in degrees.
///
/// `gd(p) = atan(sinh(p * π))`
#[inline]
pub fn gudermannian(percent: f64) -> f64 {
    (percent * PI).sinh().atan().to_degrees()
}

/// Converts latitude in degrees to Mercator percent.
///
/// `gd⁻¹(φ) = ln(tan(π/4 + φ/2)) / π`, with the latitude clamped to the
/// Mercator limit so the poles map to `±1` instead of infinity.
#[inline]
pub fn gudermannian_inverse(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    (PI / 4.0 + lat / 2.0).tan().ln() / PI
}

/// A sector whose vertical extent is expressed in Mercator percent space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorSector {
    pub min_lat_percent: f64,
    pub max_lat_percent: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl MercatorSector {
    pub fn new(min_lat_percent: f64, max_lat_percent: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat_percent,
            max_lat_percent,
            min_lon,
            max_lon,
        }
    }

    /// Builds a Mercator sector from a rectangle in projected degrees.
    pub fn from_projected(projected: &Sector) -> Self {
        Self::new(
            projected.min_lat / PROJECTED_DEGREES_PER_PERCENT,
            projected.max_lat / PROJECTED_DEGREES_PER_PERCENT,
            projected.min_lon,
            projected.max_lon,
        )
    }

    /// The rectangle in projected degrees.
    pub fn projected(&self) -> Sector {
        Sector::from_degrees_unchecked(
            self.min_lat_percent * PROJECTED_DEGREES_PER_PERCENT,
            self.max_lat_percent * PROJECTED_DEGREES_PER_PERCENT,
            self.min_lon,
            self.max_lon,
        )
    }

    /// The true geographic extent.
    pub fn geographic(&self) -> Sector {
        Sector::from_degrees_unchecked(
            gudermannian(self.min_lat_percent),
            gudermannian(self.max_lat_percent),
            self.min_lon,
            self.max_lon,
        )
    }

    pub fn delta_lat_percent(&self) -> f64 {
        self.max_lat_percent - self.min_lat_percent
    }
}

/// The sector covered by a tile, tagged by projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileSector {
    Geographic(Sector),
    Mercator(MercatorSector),
}

impl TileSector {
    /// True geographic extent, used for culling and distance tests.
    pub fn geographic(&self) -> Sector {
        match self {
            TileSector::Geographic(sector) => *sector,
            TileSector::Mercator(mercator) => mercator.geographic(),
        }
    }

    /// Extent in addressing space (projected degrees for Mercator tiles).
    pub fn projected(&self) -> Sector {
        match self {
            TileSector::Geographic(sector) => *sector,
            TileSector::Mercator(mercator) => mercator.projected(),
        }
    }

    pub fn is_mercator(&self) -> bool {
        matches!(self, TileSector::Mercator(_))
    }

    pub fn centroid(&self) -> LatLon {
        self.geographic().centroid()
    }
}
