#![warn(missing_docs)]
//! GemEdit - edit an image with a natural-language prompt.
//!
//! Upload an image, describe the change, and get back the edited image
//! produced by a remote generative model (Gemini image models).
//!
//! # Quick Start
//!
//! ```no_run
//! use gemedit::{GeminiEditor, GenerateOutcome, Session};
//!
//! #[tokio::main]
//! async fn main() -> gemedit::Result<()> {
//!     let session = Session::new(GeminiEditor::builder().build()?);
//!     session.upload_path("photo.jpg").await?;
//!     session.edit_prompt("remove the background");
//!
//!     if let GenerateOutcome::Succeeded = session.generate().await {
//!         session.save_edited(None).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct adapter use
//!
//! ```no_run
//! use gemedit::{encode_file, EditRequest, GeminiEditor, ImageEditor, ImageFile};
//!
//! #[tokio::main]
//! async fn main() -> gemedit::Result<()> {
//!     let editor = GeminiEditor::builder().build()?;
//!     let source = encode_file(&ImageFile::open("photo.jpg").await?).await?;
//!     let edited = editor
//!         .submit_edit(&EditRequest::new(source, "make it a watercolor"))
//!         .await?;
//!     edited.save("watercolor.png").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini image editing adapter (default)
//! - `cli`: Command-line interface (default)

mod error;
pub mod image;
pub mod session;
pub mod view;

// Re-export error types at crate root
pub use error::{EditError, ErrorKind, Result};

pub use image::{
    encode_bytes, encode_file, EditRequest, EditResult, EncodedImage, ImageAsset, ImageEditor,
    ImageFile, ImageFormat,
};
pub use session::{GenerateOutcome, Phase, RejectReason, Session, SessionState};

#[cfg(feature = "gemini")]
pub use image::providers::{GeminiEditor, GeminiEditorBuilder, GeminiModel};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{EditError, Result};
    pub use crate::image::{EditRequest, ImageAsset, ImageEditor, ImageFile};
    pub use crate::session::{GenerateOutcome, Session};

    #[cfg(feature = "gemini")]
    pub use crate::image::providers::GeminiEditor;
}
