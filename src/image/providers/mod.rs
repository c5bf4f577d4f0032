//! Remote image editing backends.

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::{
    GeminiEditor, GeminiEditorBuilder, GeminiModel, API_KEY_ENV_VARS, DEFAULT_BASE_URL,
};
