use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generated results are always PNG.
pub const GENERATED_MIME_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("failed reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image file is empty")]
    Empty,
    #[error("unsupported image type ({0}); expected PNG, JPEG or WEBP")]
    Unsupported(String),
    #[error("image data could not be decoded: {0}")]
    Corrupt(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMime {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageMime {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Webp => "image/webp",
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageMime::Png),
            ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            ImageFormat::WebP => Some(ImageMime::Webp),
            _ => None,
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageMime::Png => ImageFormat::Png,
            ImageMime::Jpeg => ImageFormat::Jpeg,
            ImageMime::Webp => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded product image, decoded once and then treated as immutable.
/// Re-uploading replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalImage {
    source: Option<PathBuf>,
    file_name: String,
    base64: String,
    mime: ImageMime,
    width: u32,
    height: u32,
}

impl OriginalImage {
    pub fn from_path(path: &Path) -> Result<Self, ImageDecodeError> {
        let bytes = fs::read(path).map_err(|source| ImageDecodeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mut image = Self::from_bytes(&bytes, &file_name)?;
        image.source = Some(path.to_path_buf());
        Ok(image)
    }

    /// The type is sniffed from the bytes, never trusted from the name.
    pub fn from_bytes(bytes: &[u8], file_name: &str) -> Result<Self, ImageDecodeError> {
        if bytes.is_empty() {
            return Err(ImageDecodeError::Empty);
        }
        let format = image::guess_format(bytes)
            .map_err(|_| ImageDecodeError::Unsupported(describe_unknown(file_name)))?;
        let mime = ImageMime::from_format(format)
            .ok_or_else(|| ImageDecodeError::Unsupported(format!("{format:?}")))?;
        let decoded = image::load_from_memory_with_format(bytes, mime.format())
            .map_err(|err| ImageDecodeError::Corrupt(err.to_string()))?;

        Ok(Self {
            source: None,
            file_name: file_name.to_string(),
            base64: BASE64.encode(bytes),
            mime,
            width: decoded.width(),
            height: decoded.height(),
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }

    pub fn decode_payload(&self) -> Result<Vec<u8>, ImageDecodeError> {
        Ok(BASE64.decode(&self.base64)?)
    }
}

/// Splits `data:<mime>;base64,<payload>` and decodes the payload.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), ImageDecodeError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ImageDecodeError::Unsupported("not a data URL".to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| ImageDecodeError::Unsupported("data URL without payload".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| ImageDecodeError::Unsupported("data URL is not base64".to_string()))?;
    Ok((mime.to_string(), BASE64.decode(data)?))
}

fn describe_unknown(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    pub src: String,
    pub is_editing: bool,
    pub mime_type: String,
}

impl GeneratedImage {
    /// Builds one grid entry per result reference, ids stamped with the
    /// batch creation time.
    pub fn batch(results: &[String]) -> Vec<Self> {
        let stamp = Utc::now().timestamp_millis();
        results
            .iter()
            .enumerate()
            .map(|(index, src)| Self {
                id: format!("gen-{index}-{stamp}"),
                src: src.clone(),
                is_editing: false,
                mime_type: GENERATED_MIME_TYPE.to_string(),
            })
            .collect()
    }
}
