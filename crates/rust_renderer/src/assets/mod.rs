//! Asset loading: image decoding and scene import
//!
//! Both collaborators produce plain host-side data. GPU upload happens in the
//! Vulkan backend.

pub mod image_loader;
pub mod obj_importer;
pub mod scene;

pub use image_loader::{ImageData, ImageLoadOptions};
pub use obj_importer::ObjImporter;
pub use scene::{ImportedMaterial, ImportedMesh, ImportedScene, SceneImporter, SceneNode, TextureSlotKind};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image file could not be decoded
    #[error("Failed to decode image {path}: {reason}")]
    Decode {
        /// Image path
        path: String,
        /// Decoder diagnostic
        reason: String,
    },

    /// Scene importer rejected the file
    #[error("scene import failed: {0}")]
    Import(String),
}
