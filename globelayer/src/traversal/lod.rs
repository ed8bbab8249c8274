//! Level-of-detail refinement test.

use crate::geo::{Globe, Sector, Vec3};

/// Default split bias.
pub const DEFAULT_SPLIT_SCALE: f64 = 0.9;

/// Default divisor applied to a tile's arc length to estimate its cell size.
pub const DEFAULT_CELL_SIZE_DIVISOR: f64 = 20.0;

/// Decides whether a tile is too coarse for its distance from the eye.
///
/// A tile must split when `log10(cell) > log10(min_distance) - split_scale`,
/// i.e. when its cell size exceeds `min_distance / 10^split_scale`. Raising
/// `split_scale` refines sooner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodPolicy {
    pub split_scale: f64,
    pub cell_size_divisor: f64,
}

impl Default for LodPolicy {
    fn default() -> Self {
        Self {
            split_scale: DEFAULT_SPLIT_SCALE,
            cell_size_divisor: DEFAULT_CELL_SIZE_DIVISOR,
        }
    }
}

impl LodPolicy {
    pub fn new(split_scale: f64, cell_size_divisor: f64) -> Self {
        Self {
            split_scale,
            cell_size_divisor,
        }
    }

    /// Representative cell size of a sector, in metres.
    pub fn cell_size(&self, globe: &dyn Globe, sector: &Sector) -> f64 {
        std::f64::consts::PI * sector.delta_lat_radians() * globe.radius()
            / self.cell_size_divisor.max(f64::MIN_POSITIVE)
    }

    /// Nearest of the sector's corners and centre to the eye.
    pub fn min_distance(&self, globe: &dyn Globe, eye: &Vec3, sector: &Sector) -> f64 {
        globe
            .sector_corners(sector)
            .iter()
            .map(|point| point.distance_to(eye))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn need_to_split(&self, globe: &dyn Globe, eye: &Vec3, sector: &Sector) -> bool {
        let cell = self.cell_size(globe, sector);
        let distance = self.min_distance(globe, eye, sector);
        // Eye on the surface: always refine
        if distance <= 0.0 {
            return true;
        }
        cell.log10() > distance.log10() - self.split_scale
    }
}
