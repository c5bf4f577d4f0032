//! Interaction state for one editing session.
//!
//! A [`Session`] owns the [`SessionState`] and is the only thing that
//! mutates it. The state lock is never held across an await, so a
//! generation in flight leaves the session free for uploads, prompt edits
//! and rendering.

use crate::error::Result;
use crate::image::{encode_file, EditRequest, EncodedImage, ImageAsset, ImageEditor, ImageFile};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// File name stem used when saving the edited image without an explicit path.
pub const DEFAULT_DOWNLOAD_STEM: &str = "edited-image";

/// Where the session is in the upload → generate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No image uploaded.
    Empty,
    /// Image present, nothing generated yet.
    Ready,
    /// A request is in flight.
    Generating,
    /// An edited image is available.
    Succeeded,
    /// The last upload or generation failed.
    Failed,
}

/// The uploaded original in both its local and encoded forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// The file the user picked.
    pub file: ImageFile,
    /// Its transportable encoding.
    pub encoded: EncodedImage,
}

/// Everything the presentation layer needs to draw the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// The uploaded original, if any.
    pub original: Option<SourceImage>,
    /// Current prompt text, untrimmed.
    pub prompt: String,
    /// Result of the last successful generation.
    pub edited: Option<ImageAsset>,
    /// Message of the last failure.
    pub error: Option<String>,
    /// Whether a generation is in flight.
    pub generating: bool,
}

impl SessionState {
    /// Derives the current phase.
    pub fn phase(&self) -> Phase {
        if self.generating {
            Phase::Generating
        } else if self.error.is_some() {
            Phase::Failed
        } else if self.edited.is_some() {
            Phase::Succeeded
        } else if self.original.is_some() {
            Phase::Ready
        } else {
            Phase::Empty
        }
    }

    /// Why a generation would be refused right now, if it would.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        if self.generating {
            Some(RejectReason::InFlight)
        } else if self.original.is_none() {
            Some(RejectReason::NoImage)
        } else if self.prompt.trim().is_empty() {
            Some(RejectReason::EmptyPrompt)
        } else {
            None
        }
    }

    /// Whether the generate action is enabled.
    pub fn can_generate(&self) -> bool {
        self.reject_reason().is_none()
    }
}

/// Why [`Session::generate`] refused to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No image has been uploaded.
    NoImage,
    /// The prompt is empty or whitespace.
    EmptyPrompt,
    /// Another generation is still running.
    InFlight,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoImage => write!(f, "upload an image first"),
            Self::EmptyPrompt => write!(f, "enter a non-empty prompt first"),
            Self::InFlight => write!(f, "a generation is already in progress"),
        }
    }
}

/// What a call to [`Session::generate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Nothing happened; state is unchanged.
    Rejected(RejectReason),
    /// The edited image is now in the session.
    Succeeded,
    /// The session now holds this error message.
    Failed(String),
    /// A new original was uploaded while the request ran; its result was dropped.
    Superseded,
}

struct Inner {
    state: SessionState,
    // Bumped on every successful upload so a late result for an older
    // original can be recognized and dropped.
    upload_seq: u64,
}

/// Controller owning the session state and sequencing calls into an editor.
pub struct Session<E> {
    editor: E,
    inner: Mutex<Inner>,
}

impl<E: ImageEditor> Session<E> {
    /// Starts an empty session.
    pub fn new(editor: E) -> Self {
        Self {
            editor,
            inner: Mutex::new(Inner {
                state: SessionState::default(),
                upload_seq: 0,
            }),
        }
    }

    /// Returns the editor this session submits to.
    pub fn editor(&self) -> &E {
        &self.editor
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Reads and encodes `file` and makes it the new original.
    ///
    /// On success any previous result and error are cleared. A read failure
    /// keeps the previous original, drops any shown result and records the
    /// error message.
    pub async fn upload(&self, file: ImageFile) -> Result<()> {
        match encode_file(&file).await {
            Ok(encoded) => {
                let mut inner = self.lock();
                inner.upload_seq += 1;
                inner.state.original = Some(SourceImage { file, encoded });
                inner.state.edited = None;
                inner.state.error = None;
                tracing::info!(phase = ?inner.state.phase(), "image uploaded");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(error = %message, "upload failed");
                let mut inner = self.lock();
                inner.state.edited = None;
                inner.state.error = Some(message);
                Err(e)
            }
        }
    }

    /// Selects a file by path and uploads it.
    ///
    /// A file that is not an image is refused with
    /// [`EditError::UnsupportedMediaType`](crate::EditError::UnsupportedMediaType)
    /// and leaves the session untouched; showing the notice is up to the caller.
    pub async fn upload_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let file = ImageFile::open(path).await?;
        self.upload(file).await
    }

    /// Replaces the prompt text. Image and result are untouched.
    pub fn edit_prompt(&self, text: impl Into<String>) {
        self.lock().state.prompt = text.into();
    }

    /// Submits the current original and prompt to the editor.
    ///
    /// Refused without any state change when no image is uploaded, the
    /// prompt is blank, or a generation is already running.
    pub async fn generate(&self) -> GenerateOutcome {
        let (request, seq) = {
            let mut inner = self.lock();
            if let Some(reason) = inner.state.reject_reason() {
                tracing::debug!(%reason, "generate rejected");
                return GenerateOutcome::Rejected(reason);
            }
            let Some(original) = inner.state.original.as_ref() else {
                return GenerateOutcome::Rejected(RejectReason::NoImage);
            };
            let request = EditRequest::new(original.encoded.clone(), inner.state.prompt.clone());
            inner.state.generating = true;
            inner.state.edited = None;
            inner.state.error = None;
            (request, inner.upload_seq)
        };
        let mut in_flight = InFlight {
            inner: &self.inner,
            armed: true,
        };

        tracing::info!(editor = self.editor.name(), "generation started");
        let result = self.editor.submit_edit(&request).await;

        let mut inner = self.lock();
        inner.state.generating = false;
        in_flight.disarm();
        if inner.upload_seq != seq {
            tracing::info!("dropping result for a replaced original");
            return GenerateOutcome::Superseded;
        }
        match result {
            Ok(image) => {
                tracing::info!(
                    media_type = image.media_type(),
                    size = image.size(),
                    "generation succeeded"
                );
                inner.state.edited = Some(image);
                GenerateOutcome::Succeeded
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(error = %message, "generation failed");
                inner.state.error = Some(message.clone());
                GenerateOutcome::Failed(message)
            }
        }
    }

    /// Writes the edited image to `path`, or to `edited-image.<ext>` in the
    /// current directory. Returns `None` when there is nothing to save.
    pub async fn save_edited(&self, path: Option<&Path>) -> Result<Option<PathBuf>> {
        let Some(image) = self.edited() else {
            return Ok(None);
        };
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(default_download_name(&image)),
        };
        image.save(&target).await?;
        tracing::info!(path = %target.display(), "edited image saved");
        Ok(Some(target))
    }

    /// Returns a copy of the current state for rendering.
    pub fn snapshot(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.lock().state.phase()
    }

    /// Whether the generate action is enabled.
    pub fn can_generate(&self) -> bool {
        self.lock().state.can_generate()
    }

    /// Returns the edited image, if any.
    pub fn edited(&self) -> Option<ImageAsset> {
        self.lock().state.edited.clone()
    }

    /// Returns the last error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lock().state.error.clone()
    }
}

/// Default download name for an edited image, e.g. `edited-image.png`.
pub fn default_download_name(image: &ImageAsset) -> String {
    format!("{DEFAULT_DOWNLOAD_STEM}.{}", image.extension())
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight flag if a generation future is dropped before it settles.
///
/// Disarmed under the state lock on the normal path, so a later generation's
/// flag is never cleared by an earlier one.
struct InFlight<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.inner).state.generating = false;
        }
    }
}
