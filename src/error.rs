//! Error types for image editing.

use std::path::PathBuf;

/// Maximum length of a provider error body carried in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while encoding, submitting or saving an edit.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// The source image file could not be read.
    #[error("failed to read image {}: {message}", .path.display())]
    Encoding {
        /// Path of the file that failed to read.
        path: PathBuf,
        /// Underlying I/O message.
        message: String,
    },

    /// No API credential is available.
    #[error("{0} environment variable is not set. Please configure it to use the application.")]
    Configuration(String),

    /// The network call failed, returned a non-2xx status, or returned
    /// a response that could not be decoded.
    #[error("Failed to edit image: {message}")]
    Transport {
        /// HTTP status, when the server answered.
        status: Option<u16>,
        /// Message of the underlying cause.
        message: String,
    },

    /// The call succeeded but the response carried no inline image.
    #[error("Failed to edit image: No image data was found in the API response. The model may not have been able to fulfill the request.{}", .detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    NoImageReturned {
        /// Text or finish reason the model returned instead of an image.
        detail: Option<String>,
    },

    /// The selected file is not an image.
    #[error("Please select a valid image file (got {0}).")]
    UnsupportedMediaType(String),

    /// I/O error while saving the edited image.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any failure not matching the above.
    ///
    /// The Gemini adapter never returns it; it is the variant for other
    /// [`ImageEditor`](crate::ImageEditor) implementations whose failure fits
    /// no other class.
    #[error("An unknown error occurred while editing the image.")]
    Unknown,
}

/// Discriminant of [`EditError`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`EditError::Encoding`].
    Encoding,
    /// See [`EditError::Configuration`].
    Configuration,
    /// See [`EditError::Transport`].
    Transport,
    /// See [`EditError::NoImageReturned`].
    NoImageReturned,
    /// See [`EditError::UnsupportedMediaType`].
    UnsupportedMediaType,
    /// See [`EditError::Io`].
    Io,
    /// See [`EditError::Unknown`].
    Unknown,
}

impl EditError {
    /// Returns the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::NoImageReturned { .. } => ErrorKind::NoImageReturned,
            Self::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            Self::Io(_) => ErrorKind::Io,
            Self::Unknown => ErrorKind::Unknown,
        }
    }

    /// Builds a transport error without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for EditError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EditError {
    fn from(err: serde_json::Error) -> Self {
        Self::transport(format!("malformed response: {err}"))
    }
}

/// Result type alias for image editing operations.
pub type Result<T> = std::result::Result<T, EditError>;

/// Reduces a provider error body to a short human-readable message.
///
/// Google APIs wrap failures as `{"error": {"message": ...}}`; that message
/// is preferred when present. Anything else is trimmed and truncated.
pub(crate) fn sanitize_error_message(body: &str) -> String {
    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    let text = extracted.unwrap_or_else(|| body.trim().to_string());
    if text.is_empty() {
        return "empty response body".into();
    }
    if text.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = text.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        return format!("{truncated}...");
    }
    text
}
