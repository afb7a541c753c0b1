//! Core primitive types for rendering
//!
//! Geometry, materials, models and the fly camera. None of these types touch
//! Vulkan directly; uploads and draws go through the seams in
//! [`crate::render::backend`].

pub mod camera;
pub mod material;
pub mod mesh;
pub mod model;
pub mod quad;

pub use camera::Camera;
pub use material::{Material, MaterialSlot, SlotMapping};
pub use mesh::{Mesh, Vertex};
pub use model::Model;
pub use quad::{ground_plane_transform, PrimitiveMeshes};
