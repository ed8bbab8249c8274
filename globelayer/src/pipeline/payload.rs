//! Decoded forms of a fetched resource.

use std::io::Cursor;

use bytes::Bytes;
use image::{ImageFormat, RgbaImage};

use super::content::ContentKind;
use super::remap::remap_mercator;
use crate::cache::Texture;
use crate::fetch::FetchError;
use crate::geo::TileSector;

/// Longest error-document body kept for logging.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// A resource after classification and decoding.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Content passed through untouched.
    RawBytes { content_type: String, bytes: Bytes },
    /// An image decoded to RGBA, still backed by its original encoding.
    DecodedImage {
        format: ImageFormat,
        original: Bytes,
        image: RgbaImage,
    },
    /// A Mercator image resampled to geographic rows. Has no original
    /// encoding, so it is persisted as PNG.
    RemappedImage { image: RgbaImage },
}

impl Payload {
    /// Builds the payload for a classified resource.
    ///
    /// Images on Mercator tiles are remapped. `from_store` skips the remap
    /// because stored images are already in geographic rows.
    pub fn from_content(
        kind: ContentKind,
        bytes: Bytes,
        sector: &TileSector,
        from_store: bool,
    ) -> Result<Payload, FetchError> {
        match kind {
            ContentKind::ErrorDocument(content_type) => Err(FetchError::ErrorContent {
                content_type,
                body: error_body(&bytes),
            }),
            ContentKind::UnsupportedImage(content_type) => {
                Err(FetchError::UnsupportedContent(content_type))
            }
            ContentKind::Binary(content_type) => Ok(Payload::RawBytes {
                content_type,
                bytes,
            }),
            ContentKind::Image(format) => {
                let image = decode(&bytes, format)?;
                match sector {
                    TileSector::Mercator(mercator) if !from_store => Ok(Payload::RemappedImage {
                        image: remap_mercator(&image, mercator),
                    }),
                    _ => Ok(Payload::DecodedImage {
                        format,
                        original: bytes,
                        image,
                    }),
                }
            }
        }
    }

    /// Bytes written to the local store.
    pub fn persist_bytes(&self) -> Result<Bytes, FetchError> {
        match self {
            Payload::RawBytes { bytes, .. } => Ok(bytes.clone()),
            Payload::DecodedImage { original, .. } => Ok(original.clone()),
            Payload::RemappedImage { image } => encode_png(image),
        }
    }

    /// Texture installed in the resource cache.
    pub fn into_texture(self) -> Texture {
        match self {
            Payload::RawBytes {
                content_type,
                bytes,
            } => Texture::raw(content_type, bytes),
            Payload::DecodedImage { image, .. } | Payload::RemappedImage { image } => {
                Texture::from_rgba(image)
            }
        }
    }
}

fn decode(bytes: &[u8], format: ImageFormat) -> Result<RgbaImage, FetchError> {
    image::load_from_memory_with_format(bytes, format)
        .map(|image| image.into_rgba8())
        .map_err(|e| FetchError::Decode(format!("{:?}: {}", format, e)))
}

fn encode_png(image: &RgbaImage) -> Result<Bytes, FetchError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| FetchError::Decode(format!("PNG encode: {}", e)))?;
    Ok(Bytes::from(buffer.into_inner()))
}

fn error_body(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geo::{MercatorSector, Sector};
    use image::Rgba;

    /// PNG bytes of a solid image.
    pub(crate) fn png_bytes(width: u32, height: u32, pixel: [u8; 4]) -> Bytes {
        let image = RgbaImage::from_pixel(width, height, Rgba(pixel));
        encode_png(&image).unwrap()
    }

    fn geographic() -> TileSector {
        TileSector::Geographic(Sector::FULL_SPHERE)
    }

    #[test]
    fn test_error_document_fails_with_body() {
        let result = Payload::from_content(
            ContentKind::ErrorDocument("text/html".to_string()),
            Bytes::from_static(b"<html>Quota exceeded</html>"),
            &geographic(),
            false,
        );
        match result {
            Err(FetchError::ErrorContent { content_type, body }) => {
                assert_eq!(content_type, "text/html");
                assert!(body.contains("Quota exceeded"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = error_body(&vec![b'x'; 10_000]);
        assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
    }

    #[test]
    fn test_decoded_image_persists_original() {
        let bytes = png_bytes(4, 4, [10, 20, 30, 255]);
        let payload = Payload::from_content(
            ContentKind::Image(ImageFormat::Png),
            bytes.clone(),
            &geographic(),
            false,
        )
        .unwrap();
        assert!(matches!(payload, Payload::DecodedImage { .. }));
        assert_eq!(payload.persist_bytes().unwrap(), bytes);

        let texture = payload.into_texture();
        assert_eq!((texture.width, texture.height), (4, 4));
        assert_eq!(&texture.pixels().unwrap()[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_mercator_image_is_remapped_and_persisted_as_png() {
        let sector = TileSector::Mercator(MercatorSector::new(0.0, 0.5, 0.0, 90.0));
        let payload = Payload::from_content(
            ContentKind::Image(ImageFormat::Png),
            png_bytes(4, 4, [1, 2, 3, 255]),
            &sector,
            false,
        )
        .unwrap();
        assert!(matches!(payload, Payload::RemappedImage { .. }));

        let persisted = payload.persist_bytes().unwrap();
        assert_eq!(image::guess_format(&persisted).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_stored_mercator_image_is_not_remapped_again() {
        let sector = TileSector::Mercator(MercatorSector::new(0.0, 0.5, 0.0, 90.0));
        let payload = Payload::from_content(
            ContentKind::Image(ImageFormat::Png),
            png_bytes(4, 4, [1, 2, 3, 255]),
            &sector,
            true,
        )
        .unwrap();
        assert!(matches!(payload, Payload::DecodedImage { .. }));
    }

    #[test]
    fn test_corrupt_image_is_decode_error() {
        let result = Payload::from_content(
            ContentKind::Image(ImageFormat::Png),
            Bytes::from_static(b"\x89PNG\r\n\x1a\nbroken"),
            &geographic(),
            false,
        );
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_raw_bytes_pass_through() {
        let payload = Payload::from_content(
            ContentKind::Binary("application/x-bil".to_string()),
            Bytes::from_static(b"\x00\x01\x02"),
            &geographic(),
            false,
        )
        .unwrap();
        assert_eq!(payload.persist_bytes().unwrap().as_ref(), b"\x00\x01\x02");
        let texture = payload.into_texture();
        assert_eq!(texture.size_bytes(), 3);
        assert!(texture.pixels().is_none());
    }

    #[test]
    fn test_unsupported_image_fails() {
        let result = Payload::from_content(
            ContentKind::UnsupportedImage("image/x-foo".to_string()),
            Bytes::new(),
            &geographic(),
            false,
        );
        assert!(matches!(result, Err(FetchError::UnsupportedContent(_))));
    }
}
