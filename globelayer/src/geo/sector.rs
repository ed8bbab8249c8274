//! Geographic sectors (latitude/longitude rectangles).

use std::fmt;

use crate::error::PyramidError;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    /// Creates a position from degrees.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}°, {:.6}°", self.lat, self.lon)
    }
}

/// A rectangle bounded by two parallels and two meridians, in degrees.
///
/// Containment is closed on every edge. Tile addressing applies its own
/// lower-inclusive, upper-exclusive convention on top of this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sector {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Sector {
    /// The whole sphere.
    pub const FULL_SPHERE: Sector = Sector {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    /// Creates a sector, rejecting inverted or non-finite bounds.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self, PyramidError> {
        let finite = [min_lat, max_lat, min_lon, max_lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite || min_lat > max_lat || min_lon > max_lon {
            return Err(PyramidError::InvalidSector {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            });
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Creates a sector without validation. Callers guarantee ordering.
    pub(crate) const fn from_degrees_unchecked(
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    ) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    #[inline]
    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    #[inline]
    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    #[inline]
    pub fn delta_lat_radians(&self) -> f64 {
        self.delta_lat().to_radians()
    }

    /// True when the sector has no area.
    pub fn is_empty(&self) -> bool {
        self.delta_lat() <= 0.0 || self.delta_lon() <= 0.0
    }

    /// Geographic centre of the sector.
    pub fn centroid(&self) -> LatLon {
        LatLon::new(
            0.5 * (self.min_lat + self.max_lat),
            0.5 * (self.min_lon + self.max_lon),
        )
    }

    /// True when the position lies inside or on the edge of the sector.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// True when the two sectors share a region of non-zero area.
    ///
    /// Sectors that only touch along an edge do not intersect.
    pub fn intersects(&self, other: &Sector) -> bool {
        self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
            && self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
    }

    /// The overlapping region of two sectors, if any.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if !self.intersects(other) {
            return None;
        }
        Some(Sector::from_degrees_unchecked(
            self.min_lat.max(other.min_lat),
            self.max_lat.min(other.max_lat),
            self.min_lon.max(other.min_lon),
            self.max_lon.min(other.max_lon),
        ))
    }

    /// The four corners (SW, SE, NE, NW) followed by the centroid.
    pub fn corners_and_center(&self) -> [LatLon; 5] {
        [
            LatLon::new(self.min_lat, self.min_lon),
            LatLon::new(self.min_lat, self.max_lon),
            LatLon::new(self.max_lat, self.max_lon),
            LatLon::new(self.max_lat, self.min_lon),
            self.centroid(),
        ]
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}°..{:.4}°, {:.4}°..{:.4}°]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}
