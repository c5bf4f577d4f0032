//! Reads local image files into their transportable encoding.

use crate::error::{EditError, Result};
use crate::image::types::{EncodedImage, ImageAsset, ImageFile, ImageFormat, OCTET_STREAM};

/// Reads `file` and returns its base64 payload with the declared media type.
///
/// The read is the only suspension point. The declared media type is kept
/// as-is even when the bytes sniff as a different format.
pub async fn encode_file(file: &ImageFile) -> Result<EncodedImage> {
    let bytes = tokio::fs::read(file.path())
        .await
        .map_err(|e| EditError::Encoding {
            path: file.path().to_path_buf(),
            message: e.to_string(),
        })?;

    tracing::debug!(
        path = %file.path().display(),
        media_type = file.media_type(),
        size = bytes.len(),
        "encoded source image"
    );

    Ok(encode_bytes(bytes, file.media_type()))
}

/// Encodes in-memory bytes. An empty `media_type` is filled in by sniffing.
pub fn encode_bytes(bytes: Vec<u8>, media_type: &str) -> EncodedImage {
    let media_type = if media_type.is_empty() {
        ImageFormat::from_magic_bytes(&bytes)
            .map(|f| f.mime_type())
            .unwrap_or(OCTET_STREAM)
    } else {
        media_type
    };
    ImageAsset::new(bytes, media_type).encode()
}
