//! View collaborator interface.

use crate::geo::{Globe, LatLon, Sector, Vec3};

/// Per-frame view state supplied by the host's camera.
pub trait ViewState {
    /// True when any part of the sector may be inside the view volume.
    fn intersects_frustum(&self, sector: &Sector) -> bool;

    /// Bound on the part of the globe that can be visible, `None` when
    /// unbounded.
    fn visible_sector(&self) -> Option<Sector>;

    /// Eye position in globe cartesian coordinates.
    fn eye_point(&self) -> Vec3;

    /// Surface point under the viewport centre, used to prioritise fetches.
    fn reference_point(&self) -> Option<Vec3>;
}

/// Approximate length of one degree of arc on the WGS84 equator, metres.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// A camera reduced to an eye point and a ground footprint.
///
/// The footprint stands in for the frustum: a sector is in view when it
/// intersects the footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSnapshot {
    pub eye: Vec3,
    pub footprint: Sector,
    pub reference: Option<Vec3>,
}

impl ViewSnapshot {
    pub fn new(eye: Vec3, footprint: Sector, reference: Option<Vec3>) -> Self {
        Self {
            eye,
            footprint,
            reference,
        }
    }

    /// A camera looking straight down from `altitude` metres above
    /// `position`, with a square field of view of `fov_degrees`.
    pub fn nadir(globe: &dyn Globe, position: LatLon, altitude: f64, fov_degrees: f64) -> Self {
        let half_width_m = altitude.max(0.0) * (fov_degrees.to_radians() / 2.0).tan();
        let half_lat = (half_width_m / METRES_PER_DEGREE).min(90.0);
        let cos_lat = position.lat.to_radians().cos().max(0.01);
        let half_lon = (half_lat / cos_lat).min(180.0);

        let footprint = Sector::from_degrees_unchecked(
            (position.lat - half_lat).max(-90.0),
            (position.lat + half_lat).min(90.0),
            (position.lon - half_lon).max(-180.0),
            (position.lon + half_lon).min(180.0),
        );

        Self {
            eye: globe.compute_point(position.lat, position.lon, altitude),
            footprint,
            reference: Some(globe.compute_point(position.lat, position.lon, 0.0)),
        }
    }
}

impl ViewState for ViewSnapshot {
    fn intersects_frustum(&self, sector: &Sector) -> bool {
        self.footprint.intersects(sector)
    }

    fn visible_sector(&self) -> Option<Sector> {
        Some(self.footprint)
    }

    fn eye_point(&self) -> Vec3 {
        self.eye
    }

    fn reference_point(&self) -> Option<Vec3> {
        self.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::SphericalGlobe;

    #[test]
    fn test_nadir_footprint_is_centred() {
        let globe = SphericalGlobe::default();
        let view = ViewSnapshot::nadir(&globe, LatLon::new(10.0, 20.0), 100_000.0, 60.0);
        let centre = view.footprint.centroid();
        assert!((centre.lat - 10.0).abs() < 1e-9);
        assert!((centre.lon - 20.0).abs() < 1e-9);
        assert!(view.footprint.delta_lat() > 0.5 && view.footprint.delta_lat() < 2.0);
        assert!((view.eye.length() - globe.radius() - 100_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_high_altitude_footprint_is_clamped() {
        let globe = SphericalGlobe::default();
        let view = ViewSnapshot::nadir(&globe, LatLon::new(80.0, 170.0), 50_000_000.0, 90.0);
        assert!(view.footprint.max_lat <= 90.0);
        assert!(view.footprint.max_lon <= 180.0);
        assert!(view.footprint.min_lat >= -90.0);
    }

    #[test]
    fn test_frustum_uses_footprint() {
        let view = ViewSnapshot::new(
            Vec3::default(),
            Sector::new(0.0, 10.0, 0.0, 10.0).unwrap(),
            None,
        );
        assert!(view.intersects_frustum(&Sector::new(5.0, 15.0, 5.0, 15.0).unwrap()));
        assert!(!view.intersects_frustum(&Sector::new(20.0, 30.0, 0.0, 10.0).unwrap()));
    }
}
