//! Image intake for homework submissions.
//!
//! This module turns whatever the user handed over (raw bytes with a declared
//! media type, a base64 data URL as produced by a browser file reader, or a
//! file on disk) into validated [`ImageData`] through one awaitable
//! operation, [`read_image`].

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ImageError;

/// Default maximum accepted image size in bytes (20 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Matches `data:<media>[;param...],<payload>`.
static DATA_URL_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?s)^data:(?P<media>[^;,]*)(?P<params>(?:;[^;,]*)*),(?P<data>.*)$").ok()
});

/// Image formats recognized from file extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG image format.
    Png,
    /// JPEG image format.
    Jpeg,
    /// GIF image format.
    Gif,
    /// WebP image format.
    Webp,
    /// HEIC image format (iPhone camera default).
    Heic,
    /// HEIF image format.
    Heif,
}

impl ImageFormat {
    /// Attempts to detect image format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "heic" => Some(Self::Heic),
            "heif" => Some(Self::Heif),
            _ => None,
        }
    }

    /// Attempts to detect image format from a file path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Heic => "image/heic",
            Self::Heif => "image/heif",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::Gif => write!(f, "gif"),
            Self::Webp => write!(f, "webp"),
            Self::Heic => write!(f, "heic"),
            Self::Heif => write!(f, "heif"),
        }
    }
}

/// A decoded image together with its declared media type.
///
/// Always holds at least one byte. Clients see an [`ImageInfo`] instead;
/// the bytes are served separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    media_type: String,
    bytes: Vec<u8>,
}

impl ImageData {
    /// Creates validated image data.
    ///
    /// The media type is normalized to lowercase without parameters.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::Empty` for empty bytes and
    /// `ImageError::UnsupportedMediaType` unless the type is `image/<subtype>`.
    pub fn new(bytes: Vec<u8>, media_type: &str) -> Result<Self, ImageError> {
        let media_type = normalize_media_type(media_type);
        if !is_image_media_type(&media_type) {
            return Err(ImageError::UnsupportedMediaType { media_type });
        }
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }

        Ok(Self { media_type, bytes })
    }

    /// The declared media type, e.g. `image/png`.
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Size of the image in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Raw image bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 encoding of the bytes, as sent inline to the analysis service.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    /// Summary of this image for clients.
    #[must_use]
    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            media_type: self.media_type.clone(),
            size_bytes: self.size_bytes(),
        }
    }
}

/// What clients learn about a submitted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    media_type: String,
    size_bytes: usize,
}

impl ImageInfo {
    /// The declared media type, e.g. `image/png`.
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Size of the image in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

/// Where a submitted image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Raw bytes with the media type declared by the uploader.
    Bytes {
        /// The uploaded bytes.
        bytes: Vec<u8>,
        /// Declared media type.
        media_type: String,
    },
    /// A base64 `data:` URL.
    DataUrl(String),
    /// A file on the local filesystem; the format comes from its extension.
    File(PathBuf),
}

impl ImageSource {
    /// Convenience constructor for [`ImageSource::Bytes`].
    #[must_use]
    pub fn bytes(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self::Bytes {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    /// Short label for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bytes { .. } => "bytes",
            Self::DataUrl(_) => "data_url",
            Self::File(_) => "file",
        }
    }
}

/// Reads and decodes an image from any [`ImageSource`].
///
/// Enforces the size limit and the `image/*` media type requirement.
///
/// # Errors
///
/// Returns an [`ImageError`] when the source cannot be read or decoded, is
/// empty, is not an image, or exceeds `max_bytes`.
pub async fn read_image(source: ImageSource, max_bytes: u64) -> Result<ImageData, ImageError> {
    match source {
        ImageSource::Bytes { bytes, media_type } => {
            ensure_within_limit(bytes.len() as u64, max_bytes)?;
            ImageData::new(bytes, &media_type)
        }
        ImageSource::DataUrl(url) => {
            let (media_type, bytes) = parse_data_url(&url)?;
            ensure_within_limit(bytes.len() as u64, max_bytes)?;
            ImageData::new(bytes, &media_type)
        }
        ImageSource::File(path) => read_image_file(&path, max_bytes).await,
    }
}

async fn read_image_file(path: &Path, max_bytes: u64) -> Result<ImageData, ImageError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ImageError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ImageError::Io(e)
        }
    })?;
    ensure_within_limit(metadata.len(), max_bytes)?;

    let format = ImageFormat::from_path(path).ok_or_else(|| ImageError::UnknownFormat {
        path: path.to_path_buf(),
    })?;

    let bytes = tokio::fs::read(path).await?;
    ImageData::new(bytes, format.media_type())
}

const fn ensure_within_limit(size_bytes: u64, limit_bytes: u64) -> Result<(), ImageError> {
    if size_bytes > limit_bytes {
        return Err(ImageError::TooLarge {
            size_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

/// Splits a base64 data URL into its media type and decoded bytes.
fn parse_data_url(url: &str) -> Result<(String, Vec<u8>), ImageError> {
    let Some(pattern) = DATA_URL_PATTERN.as_ref() else {
        return Err(ImageError::MalformedDataUrl(
            "data URL pattern unavailable".to_string(),
        ));
    };

    let captures = pattern
        .captures(url.trim())
        .ok_or_else(|| ImageError::MalformedDataUrl("expected 'data:<type>;base64,<data>'".to_string()))?;

    let is_base64 = captures.name("params").is_some_and(|params| {
        params
            .as_str()
            .split(';')
            .any(|param| param.trim().eq_ignore_ascii_case("base64"))
    });
    if !is_base64 {
        return Err(ImageError::MalformedDataUrl(
            "only base64-encoded data URLs are supported".to_string(),
        ));
    }

    let media_type = captures
        .name("media")
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    // Browsers never wrap the payload, but pasted URLs sometimes do.
    let payload: String = captures
        .name("data")
        .map(|m| m.as_str())
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = BASE64_STANDARD.decode(payload)?;
    Ok((media_type, bytes))
}

fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}
