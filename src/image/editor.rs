//! Image editor trait.

use crate::error::Result;
use crate::image::types::{EditRequest, EditResult};
use async_trait::async_trait;

/// A remote model that edits an image according to a text instruction.
///
/// Implementations issue exactly one call per [`submit_edit`](Self::submit_edit)
/// and never retry.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Submits one edit and returns the edited image or a typed failure.
    async fn submit_edit(&self, request: &EditRequest) -> EditResult;

    /// Returns the name of this editor for display.
    fn name(&self) -> &str;

    /// Checks if the model is reachable and the credential is accepted.
    async fn health_check(&self) -> Result<()>;
}

#[async_trait]
impl<T: ImageEditor + ?Sized> ImageEditor for std::sync::Arc<T> {
    async fn submit_edit(&self, request: &EditRequest) -> EditResult {
        (**self).submit_edit(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn health_check(&self) -> Result<()> {
        (**self).health_check().await
    }
}
