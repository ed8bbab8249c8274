//! Content classification of fetched resources.

use image::ImageFormat;

/// What a fetched resource turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// A text, HTML, XML or JSON document: the server reporting an error.
    ErrorDocument(String),
    /// An image the decoder understands.
    Image(ImageFormat),
    /// An `image/*` type the decoder does not understand.
    UnsupportedImage(String),
    /// Any other binary content, kept as fetched.
    Binary(String),
}

/// Content type recorded for untyped binary resources.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Suffix of passthrough content stored for a level whose suffix names an
/// image format.
pub const RAW_SUFFIX: &str = ".raw";

/// Classifies a resource by its content type, sniffing the bytes when the
/// server did not send one or sent a generic binary type.
pub fn classify(content_type: Option<&str>, bytes: &[u8]) -> ContentKind {
    let Some(content_type) = content_type.filter(|ct| !ct.is_empty()) else {
        return match image::guess_format(bytes) {
            Ok(format) => ContentKind::Image(format),
            Err(_) => ContentKind::Binary(OCTET_STREAM.to_string()),
        };
    };

    if is_error_document(content_type) {
        return ContentKind::ErrorDocument(content_type.to_string());
    }

    if content_type.starts_with("image/") {
        return match ImageFormat::from_mime_type(content_type) {
            Some(format) if format.reading_enabled() => ContentKind::Image(format),
            _ => ContentKind::UnsupportedImage(content_type.to_string()),
        };
    }

    if content_type.ends_with("octet-stream") {
        if let Ok(format) = image::guess_format(bytes) {
            return ContentKind::Image(format);
        }
    }

    ContentKind::Binary(content_type.to_string())
}

/// Classifies bytes read back from the local store, which carry no content
/// type. `suffix` is the level's format suffix.
///
/// Returns `None` when the bytes should be an image but are not recognisable,
/// which marks a corrupt store entry.
pub fn classify_stored(bytes: &[u8], suffix: &str) -> Option<ContentKind> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(ContentKind::Image(format));
    }
    if is_image_suffix(suffix) {
        return None;
    }
    Some(ContentKind::Binary(OCTET_STREAM.to_string()))
}

/// Store path for passthrough content, when it differs from `path`.
///
/// Passthrough bytes under an image suffix would read back as a corrupt
/// image, so they are kept beside it with [`RAW_SUFFIX`] instead.
pub fn raw_store_path(path: &str, suffix: &str) -> Option<String> {
    if !is_image_suffix(suffix) {
        return None;
    }
    let stem = path.strip_suffix(suffix).unwrap_or(path);
    Some(format!("{}{}", stem, RAW_SUFFIX))
}

fn is_image_suffix(suffix: &str) -> bool {
    ImageFormat::from_extension(suffix.trim_start_matches('.')).is_some()
}

fn is_error_document(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("html")
        || content_type.contains("xml")
        || content_type.contains("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_error_documents() {
        for ct in ["text/html", "text/plain", "application/xml", "application/json", "application/vnd.ogc.se_xml"] {
            assert!(
                matches!(classify(Some(ct), b"<html/>"), ContentKind::ErrorDocument(_)),
                "{ct} should be an error document"
            );
        }
    }

    #[test]
    fn test_known_images() {
        assert_eq!(
            classify(Some("image/png"), PNG_MAGIC),
            ContentKind::Image(ImageFormat::Png)
        );
        assert_eq!(
            classify(Some("image/jpeg"), b""),
            ContentKind::Image(ImageFormat::Jpeg)
        );
    }

    #[test]
    fn test_unknown_image_type() {
        assert!(matches!(
            classify(Some("image/x-unknown-format"), b""),
            ContentKind::UnsupportedImage(_)
        ));
    }

    #[test]
    fn test_other_binary_passes_through() {
        assert_eq!(
            classify(Some("application/zip"), b"PK"),
            ContentKind::Binary("application/zip".to_string())
        );
    }

    #[test]
    fn test_missing_content_type_is_sniffed() {
        assert_eq!(classify(None, PNG_MAGIC), ContentKind::Image(ImageFormat::Png));
        assert_eq!(
            classify(None, b"\x00\x01elevation"),
            ContentKind::Binary(OCTET_STREAM.to_string())
        );
    }

    #[test]
    fn test_octet_stream_images_are_sniffed() {
        assert_eq!(
            classify(Some(OCTET_STREAM), PNG_MAGIC),
            ContentKind::Image(ImageFormat::Png)
        );
        assert_eq!(
            classify(Some("binary/octet-stream"), PNG_MAGIC),
            ContentKind::Image(ImageFormat::Png)
        );
        assert_eq!(
            classify(Some(OCTET_STREAM), b"\x00\x10\x20"),
            ContentKind::Binary(OCTET_STREAM.to_string())
        );
    }

    #[test]
    fn test_raw_store_path() {
        assert_eq!(
            raw_store_path("test/2/3/3_4.png", ".png"),
            Some("test/2/3/3_4.raw".to_string())
        );
        assert_eq!(raw_store_path("dem/2/3/3_4.bil", ".bil"), None);
    }

    #[test]
    fn test_stored_classification() {
        assert_eq!(
            classify_stored(PNG_MAGIC, ".png"),
            Some(ContentKind::Image(ImageFormat::Png))
        );
        // Garbage under an image suffix is corrupt
        assert_eq!(classify_stored(b"garbage", ".png"), None);
        assert_eq!(
            classify_stored(b"\x00\x01", ".bil"),
            Some(ContentKind::Binary(OCTET_STREAM.to_string()))
        );
    }
}
