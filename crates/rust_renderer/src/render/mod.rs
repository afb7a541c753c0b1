//! # Rendering System
//!
//! Window, geometry, lighting and the Vulkan backend that drives the frame
//! lifecycle.
//!
//! ## Architecture
//!
//! - **Window**: GLFW window and surface creation
//! - **Primitives**: meshes, materials, models and the fly camera
//! - **Backend seams**: the upload and draw traits primitives record through
//! - **Vulkan Backend**: device bootstrap, swapchain, frames in flight and the
//!   shadow and main passes

pub mod window;

// Core primitives
pub mod primitives;

/// Upload and draw seams between primitives and the backend
pub mod backend;

/// Light description and per-frame uniform blocks
pub mod lighting;

/// Graphics backend implementations
pub mod backends;

pub use backend::{DrawRecorder, OverlayRecorder, PassKind, TextureRequest, UploadTarget};
pub use lighting::{DirectionalLight, FragmentUbo, VertexUbo};
pub use primitives::{ground_plane_transform, Camera, Material, Mesh, Model, PrimitiveMeshes, Vertex};
pub use window::{Window, WindowError};
