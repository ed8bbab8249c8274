//! Decoded texture payloads held by the resource cache.

use bytes::Bytes;
use image::RgbaImage;

/// Pixel or passthrough data of a resident texture.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureData {
    /// Tightly packed RGBA8 pixels, row-major, top row first.
    Rgba8(Vec<u8>),
    /// Bytes stored as fetched, for content the pipeline does not decode.
    Raw { content_type: String, bytes: Bytes },
}

/// A texture ready to hand to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub data: TextureData,
}

impl Texture {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: TextureData::Rgba8(image.into_raw()),
        }
    }

    pub fn raw(content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            width: 0,
            height: 0,
            data: TextureData::Raw {
                content_type: content_type.into(),
                bytes,
            },
        }
    }

    /// Memory footprint used for the cache budget.
    pub fn size_bytes(&self) -> usize {
        match &self.data {
            TextureData::Rgba8(pixels) => pixels.len(),
            TextureData::Raw { bytes, .. } => bytes.len(),
        }
    }

    /// RGBA pixels, if this texture was decoded.
    pub fn pixels(&self) -> Option<&[u8]> {
        match &self.data {
            TextureData::Rgba8(pixels) => Some(pixels),
            TextureData::Raw { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_of_rgba_texture() {
        let texture = Texture::from_rgba(RgbaImage::new(4, 2));
        assert_eq!(texture.size_bytes(), 4 * 2 * 4);
        assert_eq!((texture.width, texture.height), (4, 2));
        assert!(texture.pixels().is_some());
    }

    #[test]
    fn test_size_of_raw_texture() {
        let texture = Texture::raw("application/octet-stream", Bytes::from_static(b"abc"));
        assert_eq!(texture.size_bytes(), 3);
        assert!(texture.pixels().is_none());
    }
}
