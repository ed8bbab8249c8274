//! Contract-violation errors for the tile pyramid.
//!
//! These indicate a caller bug (bad configuration, out-of-range level index)
//! and are reported immediately. I/O failures are never expressed with this
//! type; they are absorbed by the fetch pipeline and recorded as absent
//! resources.

use thiserror::Error;

/// Errors raised when a pyramid is constructed or addressed incorrectly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PyramidError {
    /// Sector bounds are inverted or not finite.
    #[error("Invalid sector [{min_lat}..{max_lat}, {min_lon}..{max_lon}]")]
    InvalidSector {
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    },

    /// Level index outside the level set.
    #[error("Invalid level index {index} (level set has {count} levels)")]
    InvalidLevel { index: usize, count: usize },

    /// Level set violates a structural invariant.
    #[error("Invalid level set: {0}")]
    InvalidLevelSet(String),

    /// Resource URL template could not be expanded.
    #[error("Invalid URL template: {0}")]
    InvalidUrlTemplate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_display() {
        let err = PyramidError::InvalidLevel { index: 7, count: 3 };
        assert_eq!(
            err.to_string(),
            "Invalid level index 7 (level set has 3 levels)"
        );
    }

    #[test]
    fn test_invalid_level_set_display() {
        let err = PyramidError::InvalidLevelSet("no levels".to_string());
        assert!(err.to_string().contains("no levels"));
    }
}
