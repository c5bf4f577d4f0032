//! Plain-text rendering of a session: the two image panels, the action
//! control and the error line.

use crate::image::ImageAsset;
use crate::session::{default_download_name, SessionState};
use std::fmt::Write;

/// Placeholder shown in the original panel before anything is uploaded.
pub const ORIGINAL_PLACEHOLDER: &str = "Upload an image to begin.";
/// Placeholder shown in the edited panel before a result exists.
pub const EDITED_PLACEHOLDER: &str = "Your edited image will appear here.";
/// Loading indicator text.
pub const LOADING_TEXT: &str = "Generating...";

/// Renders the whole session.
pub fn render(state: &SessionState) -> String {
    let mut out = String::new();

    let original = state.original.as_ref().map(|o| {
        format!(
            "{} ({}, ~{} bytes)",
            o.file.name(),
            o.file.media_type(),
            o.encoded.decoded_len()
        )
    });
    panel(&mut out, "Original", original.as_deref(), ORIGINAL_PLACEHOLDER);

    let edited = if state.generating {
        Some(LOADING_TEXT.to_string())
    } else {
        state.edited.as_ref().map(describe_edited)
    };
    panel(&mut out, "Edited", edited.as_deref(), EDITED_PLACEHOLDER);

    let prompt = if state.prompt.is_empty() {
        "(none)"
    } else {
        state.prompt.as_str()
    };
    let _ = writeln!(out, "Prompt: {prompt}");

    let action = if state.generating {
        LOADING_TEXT
    } else {
        "Generate"
    };
    let enabled = if state.can_generate() {
        "enabled"
    } else {
        "disabled"
    };
    let _ = writeln!(out, "[{action}] ({enabled})");

    if let Some(ref error) = state.error {
        let _ = writeln!(out, "Error: {error}");
    }
    out
}

fn describe_edited(image: &ImageAsset) -> String {
    format!(
        "{}, {} bytes (save as {})",
        image.media_type(),
        image.size(),
        default_download_name(image)
    )
}

fn panel(out: &mut String, title: &str, content: Option<&str>, placeholder: &str) {
    let _ = writeln!(out, "== {title} ==");
    let _ = writeln!(out, "  {}", content.unwrap_or(placeholder));
}
