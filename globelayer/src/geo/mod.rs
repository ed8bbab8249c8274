//! Geographic primitives used by the tile pyramid.
//!
//! Provides the geographic [`Sector`], the projection-aware
//! [`MercatorSector`], the Gudermannian conversions between Mercator percent
//! space and latitude, and the [`Globe`] collaborator interface used for
//! distance and cell-size computations.
//!
//! This is deliberately not a geodesy library: the globe is treated as an
//! external collaborator, and [`SphericalGlobe`] is only as precise as the
//! level-of-detail heuristic needs.

mod globe;
mod mercator;
mod sector;

pub use globe::{Globe, SphericalGlobe, WGS84_EQUATORIAL_RADIUS};
pub use mercator::{gudermannian, gudermannian_inverse, MercatorSector, TileSector};
pub use sector::{LatLon, Sector};

use std::fmt;

/// A point in globe-centred cartesian space, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new point.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance between two points.
    #[inline]
    pub fn distance_to(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Length of the vector from the origin.
    #[inline]
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}
