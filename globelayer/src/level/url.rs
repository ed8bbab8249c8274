//! Resource identifiers for tiles.
//!
//! The fetch pipeline only knows how to "fetch bytes for a resource
//! identifier"; the [`UrlBuilder`] attached to a level set produces that
//! identifier from a tile.

use crate::error::PyramidError;
use crate::tile::Tile;

/// Produces the resource identifier for a tile.
pub trait UrlBuilder: Send + Sync {
    fn url_for(&self, tile: &Tile) -> Result<String, PyramidError>;
}

const PLACEHOLDERS: &[&str] = &[
    "level", "z", "row", "col", "x", "y", "cache", "west", "south", "east", "north",
];

/// URL builder expanding `{placeholder}` tokens.
///
/// Supported placeholders:
///
/// | Token | Value |
/// |-------|-------|
/// | `{level}` | pyramid level index |
/// | `{z}` | level index plus the configured zoom offset |
/// | `{row}`, `{col}` | row/column relative to the tile origin |
/// | `{x}` | column counted from 180°W |
/// | `{y}` | row counted from the north edge, for north-up tile servers |
/// | `{cache}` | cache name of the level |
/// | `{west}`, `{south}`, `{east}`, `{north}` | geographic bounds in degrees |
///
/// # Example
///
/// ```
/// use globelayer::level::TemplateUrlBuilder;
///
/// let builder = TemplateUrlBuilder::new("https://tiles.example.com/{z}/{x}/{y}.png").unwrap();
/// assert_eq!(builder.template(), "https://tiles.example.com/{z}/{x}/{y}.png");
/// ```
#[derive(Debug, Clone)]
pub struct TemplateUrlBuilder {
    template: String,
    zoom_offset: i32,
}

impl TemplateUrlBuilder {
    /// Creates a builder, rejecting unknown or unterminated placeholders.
    pub fn new(template: impl Into<String>) -> Result<Self, PyramidError> {
        let template = template.into();
        let mut rest = template.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                PyramidError::InvalidUrlTemplate(format!("unterminated placeholder in {}", template))
            })?;
            let name = &after[..end];
            if !PLACEHOLDERS.contains(&name) {
                return Err(PyramidError::InvalidUrlTemplate(format!(
                    "unknown placeholder {{{}}}",
                    name
                )));
            }
            rest = &after[end + 1..];
        }
        Ok(Self {
            template,
            zoom_offset: 0,
        })
    }

    /// Offset added to the level index for `{z}`.
    pub fn with_zoom_offset(mut self, offset: i32) -> Self {
        self.zoom_offset = offset;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl UrlBuilder for TemplateUrlBuilder {
    fn url_for(&self, tile: &Tile) -> Result<String, PyramidError> {
        let projected = tile.tile_sector().projected();
        let geographic = tile.sector();
        let delta = tile.level().tile_delta;
        let x = ((projected.min_lon + 180.0) / delta.lon).round() as i64;
        let y = ((90.0 - projected.max_lat) / delta.lat).round() as i64;
        let z = tile.level_index() as i64 + self.zoom_offset as i64;

        let url = self
            .template
            .replace("{level}", &tile.level_index().to_string())
            .replace("{z}", &z.to_string())
            .replace("{row}", &tile.row().to_string())
            .replace("{col}", &tile.col().to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{cache}", &tile.key().cache_name)
            .replace("{west}", &geographic.min_lon.to_string())
            .replace("{south}", &geographic.min_lat.to_string())
            .replace("{east}", &geographic.max_lon.to_string())
            .replace("{north}", &geographic.max_lat.to_string());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{LatLon, Sector};
    use crate::level::{LevelSetConfig, Projection};
    use crate::tile::TileKey;

    #[test]
    fn test_rejects_unknown_placeholder() {
        let err = TemplateUrlBuilder::new("http://h/{bogus}.png").unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_rejects_unterminated_placeholder() {
        assert!(TemplateUrlBuilder::new("http://h/{level.png").is_err());
    }

    #[test]
    fn test_expands_row_and_col() {
        let set = LevelSetConfig::new("bmng", Sector::FULL_SPHERE, LatLon::new(36.0, 36.0), 3)
            .build()
            .unwrap();
        let tile = set.tile_for(&TileKey::new(1, 3, 7, "bmng")).unwrap();
        let builder = TemplateUrlBuilder::new("http://h/{cache}/{level}/{row}/{row}_{col}.jpg").unwrap();
        assert_eq!(builder.url_for(&tile).unwrap(), "http://h/bmng/1/3/3_7.jpg");
    }

    #[test]
    fn test_xyz_scheme_for_mercator() {
        // Level 0 is a single world tile, like zoom 0 of a slippy map
        let set = LevelSetConfig::new("osm", Sector::FULL_SPHERE, LatLon::new(180.0, 360.0), 4)
            .with_projection(Projection::Mercator)
            .build()
            .unwrap();
        let builder = TemplateUrlBuilder::new("https://t/{z}/{x}/{y}.png").unwrap();

        let top = &set.top_level_tiles()[0];
        assert_eq!(builder.url_for(top).unwrap(), "https://t/0/0/0.png");

        // North-west tile at level 1 is row 1 from the south
        let nw = set.tile_for(&TileKey::new(1, 1, 0, "osm")).unwrap();
        assert_eq!(builder.url_for(&nw).unwrap(), "https://t/1/0/0.png");
        let se = set.tile_for(&TileKey::new(1, 0, 1, "osm")).unwrap();
        assert_eq!(builder.url_for(&se).unwrap(), "https://t/1/1/1.png");
    }

    #[test]
    fn test_zoom_offset() {
        let set = LevelSetConfig::new("osm", Sector::FULL_SPHERE, LatLon::new(90.0, 90.0), 2)
            .build()
            .unwrap();
        let tile = set.tile_for(&TileKey::new(1, 0, 0, "osm")).unwrap();
        let builder = TemplateUrlBuilder::new("{z}").unwrap().with_zoom_offset(2);
        assert_eq!(builder.url_for(&tile).unwrap(), "3");
    }
}
