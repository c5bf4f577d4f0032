//! Image types, file encoding and the remote editing seam.

mod editor;
mod encode;
pub mod providers;
mod types;

pub use editor::ImageEditor;
pub use encode::{encode_bytes, encode_file};
pub use types::{
    is_image_media_type, EditRequest, EditResult, EncodedImage, ImageAsset, ImageFile,
    ImageFormat, OCTET_STREAM,
};
