//! Globe collaborator interface.

use super::sector::{LatLon, Sector};
use super::Vec3;

/// WGS84 equatorial radius in metres.
pub const WGS84_EQUATORIAL_RADIUS: f64 = 6_378_137.0;

/// Geometry services the traversal needs from the globe.
///
/// Implementations are provided by the host application's geodesy layer.
pub trait Globe: Send + Sync {
    /// Representative radius used for cell-size estimates, in metres.
    fn radius(&self) -> f64;

    /// Cartesian point on the surface at the given position.
    fn compute_point(&self, lat: f64, lon: f64, elevation: f64) -> Vec3;

    /// Surface points for the four corners of a sector followed by its centre.
    fn sector_corners(&self, sector: &Sector) -> [Vec3; 5] {
        sector
            .corners_and_center()
            .map(|LatLon { lat, lon }| self.compute_point(lat, lon, 0.0))
    }
}

/// A perfect sphere.
#[derive(Debug, Clone, Copy)]
pub struct SphericalGlobe {
    radius: f64,
}

impl SphericalGlobe {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }
}

impl Default for SphericalGlobe {
    fn default() -> Self {
        Self::new(WGS84_EQUATORIAL_RADIUS)
    }
}

impl Globe for SphericalGlobe {
    fn radius(&self) -> f64 {
        self.radius
    }

    fn compute_point(&self, lat: f64, lon: f64, elevation: f64) -> Vec3 {
        let r = self.radius + elevation;
        let (lat, lon) = (lat.to_radians(), lon.to_radians());
        let cos_lat = lat.cos();
        Vec3::new(r * cos_lat * lon.sin(), r * lat.sin(), r * cos_lat * lon.cos())
    }
}
