//! Core types for image editing.

use crate::error::{EditError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Media type reported for files whose type cannot be determined.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Image formats the editor recognizes by extension or magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
    /// GIF format.
    Gif,
    /// HEIC (HEVC-coded HEIF).
    Heic,
    /// HEIF container.
    Heif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Heic => "heic",
            Self::Heif => "heif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Heic => "image/heic",
            Self::Heif => "image/heif",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            "heic" => Some(Self::Heic),
            "heif" => Some(Self::Heif),
            _ => None,
        }
    }

    /// Maps a MIME type back to a known format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            "image/gif" => Some(Self::Gif),
            "image/heic" => Some(Self::Heic),
            "image/heif" => Some(Self::Heif),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        // ISO BMFF: ....ftyp<brand>
        if &data[4..8] == b"ftyp" {
            return match &data[8..12] {
                b"heic" | b"heix" | b"hevc" | b"hevx" => Some(Self::Heic),
                b"mif1" | b"msf1" => Some(Self::Heif),
                _ => None,
            };
        }

        None
    }
}

/// Returns true if the media type names an image (`image/*`).
pub fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// A local, user-provided image file.
///
/// The declared media type comes from the file extension, the way a
/// browser fills in `File.type`, or from the magic bytes when
/// [`ImageFile::open`] meets an unknown extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    path: PathBuf,
    media_type: String,
}

impl ImageFile {
    /// Selects a file by extension alone, rejecting anything that is not an
    /// image type. See [`ImageFile::open`] for content sniffing.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let media_type = format_from_extension(&path)
            .map(|f| f.mime_type())
            .unwrap_or(OCTET_STREAM);
        Self::with_media_type(path, media_type)
    }

    /// Selects a file, sniffing its magic bytes when the extension is not a
    /// known image type. Files that are neither are rejected.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = match format_from_extension(&path) {
            Some(format) => Some(format),
            None => sniff_file(&path).await,
        };
        let media_type = format.map(|f| f.mime_type()).unwrap_or(OCTET_STREAM);
        Self::with_media_type(path, media_type)
    }

    /// Selects a file with an explicitly declared media type.
    pub fn with_media_type(path: impl Into<PathBuf>, media_type: impl Into<String>) -> Result<Self> {
        let media_type = media_type.into();
        if !is_image_media_type(&media_type) {
            return Err(EditError::UnsupportedMediaType(media_type));
        }
        Ok(Self {
            path: path.into(),
            media_type,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the declared media type.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Returns the file name for display.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

fn format_from_extension(path: &Path) -> Option<ImageFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ImageFormat::from_extension)
}

// Unreadable or short files simply do not sniff; reading errors surface later
// from the encoder.
async fn sniff_file(path: &Path) -> Option<ImageFormat> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await.ok()?;
    let mut head = [0u8; 12];
    file.read_exact(&mut head).await.ok()?;
    ImageFormat::from_magic_bytes(&head)
}

/// An image in its transportable form: base64 payload plus media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    /// Standard base64 of the image bytes, without a data URL prefix.
    pub data: String,
    /// Declared media type.
    pub mime_type: String,
}

impl EncodedImage {
    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Decodes the payload back into raw bytes.
    pub fn decode(&self) -> Result<ImageAsset> {
        let data = decode_base64_lenient(&self.data)
            .map_err(|e| EditError::transport(format!("invalid base64 image data: {e}")))?;
        Ok(ImageAsset::new(data, self.mime_type.clone()))
    }

    /// Approximate decoded size in bytes.
    pub fn decoded_len(&self) -> usize {
        self.data.len() / 4 * 3
    }
}

/// An immutable binary image plus its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "edited image should be saved or displayed"]
pub struct ImageAsset {
    data: Vec<u8>,
    media_type: String,
}

impl ImageAsset {
    /// Creates a new asset.
    pub fn new(data: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            data,
            media_type: media_type.into(),
        }
    }

    /// Raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Declared media type.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the actual format detected from magic bytes.
    pub fn detected_format(&self) -> Option<ImageFormat> {
        ImageFormat::from_magic_bytes(&self.data)
    }

    /// File extension matching the declared media type, `png` if unknown.
    pub fn extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.media_type)
            .unwrap_or_default()
            .extension()
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Converts into the transportable form.
    pub fn encode(&self) -> EncodedImage {
        EncodedImage {
            data: self.to_base64(),
            mime_type: self.media_type.clone(),
        }
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }

    /// Parses a `data:<media type>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| EditError::transport("not a data URL"))?;
        let (media_type, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| EditError::transport("data URL is not base64 encoded"))?;
        let data = decode_base64_lenient(payload)
            .map_err(|e| EditError::transport(format!("invalid base64 image data: {e}")))?;
        Ok(Self::new(data, media_type))
    }

    /// Saves the image to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

/// A single edit attempt: one source image and one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    /// The encoded source image.
    pub source: EncodedImage,
    /// The natural-language instruction.
    pub prompt: String,
}

impl EditRequest {
    /// Creates a new edit request.
    pub fn new(source: EncodedImage, prompt: impl Into<String>) -> Self {
        Self {
            source,
            prompt: prompt.into(),
        }
    }
}

/// Outcome of an edit: the edited image or the reason it failed.
pub type EditResult = Result<ImageAsset>;

/// Decodes base64 that may carry whitespace, a data URL prefix, or no padding.
pub(crate) fn decode_base64_lenient(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let b64 = match input.find(";base64,") {
        Some(pos) => &input[pos + 8..],
        None => input,
    };

    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD.decode(cleaned.trim_end_matches('='))
}
