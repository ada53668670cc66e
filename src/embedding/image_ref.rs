use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use std::fmt;
use std::io::Cursor;
use std::path::Path;

/// An image the embedding service can fetch: a public URL or an inline data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Url(String),
    DataUri(String),
}

impl ImageRef {
    pub fn url(url: impl Into<String>) -> Self {
        ImageRef::Url(url.into())
    }

    /// Wrap an already base64-encoded payload, e.g. an upload body.
    pub fn from_base64(mime_type: &str, data: &str) -> Self {
        ImageRef::DataUri(format!("data:{};base64,{}", mime_type, data.trim()))
    }

    /// Load a local image, downscale it so neither side exceeds
    /// `max_dimension`, and inline it as a JPEG data URI.
    pub fn from_path(path: &Path, max_dimension: u32) -> Result<Self> {
        let img = image::open(path)
            .map_err(|e| anyhow!("Failed to open image {}: {}", path.display(), e))?;

        let (width, height) = img.dimensions();
        let img = if width > max_dimension || height > max_dimension {
            img.resize(
                max_dimension,
                max_dimension,
                image::imageops::FilterType::Triangle,
            )
        } else {
            img
        };

        // JPEG has no alpha channel
        let img = image::DynamicImage::ImageRgb8(img.to_rgb8());

        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, 85);
        img.write_with_encoder(encoder)
            .map_err(|e| anyhow!("Failed to encode image as JPEG: {}", e))?;

        Ok(Self::from_base64("image/jpeg", &BASE64.encode(buf.into_inner())))
    }

    /// Interpret a command-line argument: URLs and data URIs pass through,
    /// anything else is treated as a local file.
    pub fn parse(arg: &str, max_dimension: u32) -> Result<Self> {
        let lower = arg.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(ImageRef::Url(arg.to_string()))
        } else if lower.starts_with("data:") {
            Ok(ImageRef::DataUri(arg.to_string()))
        } else {
            Self::from_path(Path::new(arg), max_dimension)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Url(s) | ImageRef::DataUri(s) => s,
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Url(url) => f.write_str(url),
            // Payloads are large; log only the header and size
            ImageRef::DataUri(uri) => {
                let header = uri.split(',').next().unwrap_or("data:");
                write!(f, "{},<{} bytes>", header, uri.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use tempfile::tempdir;

    #[test]
    fn test_parse_passthrough() {
        let url = ImageRef::parse("https://cdn.test/jacket.png", 512).unwrap();
        assert_eq!(url, ImageRef::Url("https://cdn.test/jacket.png".into()));

        let data = ImageRef::parse("data:image/png;base64,AAAA", 512).unwrap();
        assert!(matches!(data, ImageRef::DataUri(_)));
        assert_eq!(data.as_str(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_from_base64() {
        let r = ImageRef::from_base64("image/jpeg", " /9j/4AAQ \n");
        assert_eq!(r.as_str(), "data:image/jpeg;base64,/9j/4AAQ");
        assert_eq!(r.to_string(), format!("data:image/jpeg;base64,<{} bytes>", r.as_str().len()));
    }

    #[test]
    fn test_from_path_downscales_and_encodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shirt.png");
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(300, 150, Rgba([200, 30, 30, 255]));
        img.save(&path).unwrap();

        let r = ImageRef::from_path(&path, 64).unwrap();
        let encoded = r.as_str().strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();

        assert_eq!(decoded.dimensions(), (64, 32));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(ImageRef::parse(dir.path().join("nope.jpg").to_str().unwrap(), 64).is_err());
    }
}
